//! Processing of inbound traffic and the blocking drive loop.

use super::{Connection, ConnectionState};
use crate::error::{BusError, RemoteError, TransportError};
use crate::handler::{HandlerId, PendingReply};
use crate::message::{Message, MessageKind};
use crate::reporter::CONNECTION_TARGET;
use crate::transport::{Received, Transport};
use crate::{CALLBACK_ERROR_NAME, UNKNOWN_METHOD_ERROR};

impl<T: Transport> Connection<T> {
    /// Processes pending traffic, blocking until at least one message has
    /// been handled.
    ///
    /// Each call processes everything that is already available. If a
    /// handler failed or an error reply arrived along the way, the first
    /// such error is returned; later ones in the same pass are reported and
    /// dropped. A disconnect counts as progress: the local `Disconnected`
    /// signal is dispatched and the connection becomes faulted.
    ///
    /// # Errors
    ///
    /// Returns the captured deferred error, or a [`TransportError`] when the
    /// stream fails or the connection is no longer usable.
    pub fn drive(&mut self) -> Result<(), BusError> {
        if let Some(error) = self.captured.take() {
            return Err(error);
        }
        self.ensure_usable()?;
        loop {
            let processed = self.process_available()?;
            if let Some(error) = self.captured.take() {
                return Err(error);
            }
            if processed > 0 {
                return Ok(());
            }
            if let Err(error) = self.transport.wait_readable(None) {
                return Err(self.fault(error).into());
            }
        }
    }

    /// Drives the connection until `done` returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the first error [`Connection::drive`] returns.
    pub fn drive_until<P>(&mut self, mut done: P) -> Result<(), BusError>
    where
        P: FnMut() -> bool,
    {
        while !done() {
            self.drive()?;
        }
        Ok(())
    }

    /// Dispatches every frame that is already available and returns how many
    /// inbound events were handled.
    fn process_available(&mut self) -> Result<usize, BusError> {
        let mut processed = 0;
        while self.state == ConnectionState::Ready {
            let received = match self.transport.receive() {
                Ok(received) => received,
                Err(error) => return Err(self.fault(error).into()),
            };
            match received {
                Received::Frame(frame) => {
                    processed += 1;
                    let message = match Message::from_bytes(&frame) {
                        Ok(message) => message,
                        Err(error) => {
                            return Err(self.fault(TransportError::Malformed(error)).into());
                        }
                    };
                    self.dispatch(message)?;
                }
                Received::Empty => break,
                Received::Closed => {
                    processed += 1;
                    self.peer_closed();
                }
            }
        }
        Ok(processed)
    }

    fn dispatch(&mut self, message: Message) -> Result<(), BusError> {
        self.reporter.message_received(&message);
        match message.kind() {
            MessageKind::MethodReturn | MessageKind::Error => {
                self.dispatch_reply(message);
                Ok(())
            }
            MessageKind::Signal => {
                self.dispatch_signal(&message);
                Ok(())
            }
            MessageKind::MethodCall => match self.registry.method_handler(&message) {
                Some(id) => {
                    self.invoke(id, message);
                    Ok(())
                }
                None => self.reject_method_call(&message),
            },
        }
    }

    fn dispatch_reply(&mut self, message: Message) {
        let Some(pending) = message
            .reply_serial()
            .and_then(|serial| self.registry.take_reply(serial))
        else {
            self.reporter.unmatched_reply(&message);
            return;
        };
        if message.kind() == MessageKind::Error {
            if let PendingReply::Handler(id) = pending {
                self.registry.release(id);
            }
            let error = remote_error(message);
            self.capture(error.into());
            return;
        }
        match pending {
            PendingReply::Handler(id) => self.invoke(id, message),
            PendingReply::Internal(operation) => {
                tracing::trace!(
                    target: CONNECTION_TARGET,
                    operation,
                    "internal call acknowledged"
                );
            }
        }
    }

    fn dispatch_signal(&mut self, message: &Message) {
        let handlers = self.registry.signal_handlers(message);
        if handlers.is_empty() {
            tracing::trace!(
                target: CONNECTION_TARGET,
                interface = message.interface().unwrap_or_default(),
                member = message.member().unwrap_or_default(),
                "no subscription for signal"
            );
        }
        for id in handlers {
            self.invoke(id, message.clone());
        }
    }

    fn invoke(&mut self, id: HandlerId, mut message: Message) {
        match self.registry.invoke(id, &mut message) {
            None => {}
            Some(Ok(())) => {
                if message.expects_reply()
                    && let Err(send_error) = self.send(Message::method_return(&message))
                {
                    self.reporter.suppressed_error(&send_error);
                }
            }
            Some(Err(error)) => {
                tracing::debug!(
                    target: CONNECTION_TARGET,
                    handler = %id,
                    error = %error,
                    "handler failed"
                );
                if message.expects_reply()
                    && let Err(send_error) =
                        self.reply_error(&message, CALLBACK_ERROR_NAME, &error.to_string())
                {
                    self.reporter.suppressed_error(&send_error);
                }
                self.capture(error.into());
            }
        }
    }

    fn reject_method_call(&mut self, call: &Message) -> Result<(), BusError> {
        if !call.expects_reply() {
            return Ok(());
        }
        let text = format!(
            "Unknown method {} on interface {}",
            call.member().unwrap_or_default(),
            call.interface().unwrap_or("(none)")
        );
        self.reply_error(call, UNKNOWN_METHOD_ERROR, &text)
    }

    fn reply_error(&mut self, call: &Message, name: &str, text: &str) -> Result<(), BusError> {
        let reply = Message::error_reply(call, name, text)?;
        self.send(reply)?;
        Ok(())
    }

    /// Stores `error` for the next `drive` unless one is already waiting.
    fn capture(&mut self, error: BusError) {
        if self.captured.is_some() {
            self.reporter.suppressed_error(&error);
        } else {
            self.captured = Some(error);
        }
    }

    fn peer_closed(&mut self) {
        let released = self.registry.release_pending_replies();
        self.reporter.disconnected(released);
        self.state = ConnectionState::Faulted;
        match Message::local_disconnected() {
            Ok(signal) => {
                self.reporter.message_received(&signal);
                self.dispatch_signal(&signal);
            }
            Err(error) => tracing::warn!(
                target: CONNECTION_TARGET,
                error = %error,
                "failed to synthesise the disconnect signal"
            ),
        }
    }
}

fn remote_error(mut message: Message) -> RemoteError {
    let name = message.error_name().unwrap_or_default().to_owned();
    let body = if message.signature().starts_with('s') {
        message.read_value::<String>("s").ok()
    } else {
        None
    };
    let text = body.unwrap_or_else(|| name.clone());
    RemoteError::new(name, text)
}
