//! Bus connection: request construction, asynchronous calls, signal
//! subscriptions, and the lifecycle of the underlying transport.

mod driver;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use runapp_config::{BusAddress, default_bus_address};

use crate::error::{BusError, ConnectError, MessageError, PreconditionError, TransportError};
use crate::handler::{ConnectionId, Handler, HandlerRegistry, MatchRule, MethodRoute, Route};
use crate::message::{Message, MessageKind, Value};
use crate::reporter::{BusReporter, CONNECTION_TARGET, StructuredBusReporter};
use crate::transport::{Transport, UnixTransport};
use crate::{BUS_INTERFACE, BUS_NAME, BUS_PATH};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Requests may be issued and the connection driven.
    Ready,
    /// The transport failed or the peer went away; only closing remains.
    Faulted,
    /// The connection was closed locally.
    Closed,
}

/// Client connection to a message bus.
///
/// The connection is single-threaded: handlers run on the thread that calls
/// [`Connection::drive`], one at a time, in arrival order. Errors raised
/// while dispatching are captured and the first one is returned from the
/// next `drive` call; later ones are reported and dropped.
pub struct Connection<T: Transport = UnixTransport> {
    id: ConnectionId,
    transport: T,
    state: ConnectionState,
    registry: HandlerRegistry,
    captured: Option<BusError>,
    next_serial: u32,
    unique_name: Option<String>,
    reporter: Box<dyn BusReporter>,
}

impl Connection<UnixTransport> {
    /// Connects to the bus at `address` and registers with it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] when the socket cannot be opened,
    /// authentication fails, or the bus refuses the registration call.
    pub fn connect(address: &BusAddress) -> Result<Self, ConnectError> {
        let transport = UnixTransport::connect(address)?;
        let mut connection = Self::with_transport(transport);
        connection.hello().map_err(|source| ConnectError::Hello {
            source: Box::new(source),
        })?;
        tracing::debug!(
            target: CONNECTION_TARGET,
            address = %address,
            unique_name = connection.unique_name().unwrap_or_default(),
            "connected to bus"
        );
        Ok(connection)
    }

    /// Connects to the current user's bus.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] when no usable address is found or
    /// [`Connection::connect`] fails.
    pub fn user_bus() -> Result<Self, ConnectError> {
        let address = default_bus_address()?;
        Self::connect(&address)
    }
}

impl<T: Transport> Connection<T> {
    /// Wraps an already established transport without registering on a bus.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self {
            id: ConnectionId::next(),
            transport,
            state: ConnectionState::Ready,
            registry: HandlerRegistry::default(),
            captured: None,
            next_serial: 1,
            unique_name: None,
            reporter: Box::new(StructuredBusReporter::new()),
        }
    }

    /// Replaces the reporter that observes traffic and diagnostics.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl BusReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Registers with the bus and records the unique name it assigns.
    ///
    /// # Errors
    ///
    /// Returns a [`BusError`] when the call fails or the reply is malformed.
    pub fn hello(&mut self) -> Result<&str, BusError> {
        let request = Message::method_call(Some(BUS_NAME), BUS_PATH, Some(BUS_INTERFACE), "Hello")?;
        let mut reply = self.call(request)?;
        let name: String = reply.read_value("s")?;
        Ok(self.unique_name.insert(name).as_str())
    }

    /// Returns this connection's identity.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the unique name the bus assigned, once registered.
    #[must_use]
    pub fn unique_name(&self) -> Option<&str> {
        self.unique_name.as_deref()
    }

    /// Returns the number of handlers currently attached.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` when a deferred error is waiting to be returned.
    #[must_use]
    pub const fn has_pending_error(&self) -> bool {
        self.captured.is_some()
    }

    /// Builds a method call ready for [`Message::append`].
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when a name or the path is invalid.
    pub fn create_request(
        &self,
        destination: Option<&str>,
        path: &str,
        interface: Option<&str>,
        member: &str,
    ) -> Result<Message, MessageError> {
        Message::method_call(destination, path, interface, member)
    }

    /// Wraps `callback` in a handler owned by this connection.
    #[must_use]
    pub fn create_handler<F>(&self, callback: F) -> Handler
    where
        F: FnMut(&mut Message) -> Result<(), crate::CallbackError> + 'static,
    {
        Handler::new(self.id, callback)
    }

    /// Sends `request` and attaches `handler` to its reply.
    ///
    /// The handler fires at most once, during a later [`Connection::drive`],
    /// with the method return. An error reply does not fire it; the error
    /// is returned from `drive` instead.
    ///
    /// # Errors
    ///
    /// Returns a [`PreconditionError`] for a foreign handler or a request
    /// that is not a method call, a [`MessageError`] when the request is
    /// incomplete, and a [`TransportError`] when sending fails.
    pub fn call_async(&mut self, request: Message, handler: Handler) -> Result<(), BusError> {
        handler.check_owner(self.id)?;
        if request.kind() != MessageKind::MethodCall {
            return Err(PreconditionError::NotAMethodCall {
                kind: request.kind(),
            }
            .into());
        }
        self.ensure_usable()?;
        let serial = self.send(request)?;
        let id = self.registry.attach(handler, Route::Reply(serial));
        tracing::debug!(
            target: CONNECTION_TARGET,
            serial,
            handler = %id,
            "attached reply handler"
        );
        Ok(())
    }

    /// Subscribes `handler` to signals matching the given filters.
    ///
    /// `sender` and `path` match anything when `None`. Unless the rule
    /// selects signals the connection synthesises locally, a match rule is
    /// registered with the bus so it routes the signals here.
    ///
    /// # Errors
    ///
    /// Returns a [`PreconditionError`] for a foreign handler, a
    /// [`MessageError`] for an invalid filter, and a [`TransportError`] when
    /// the match rule cannot be sent.
    pub fn subscribe_signal(
        &mut self,
        sender: Option<&str>,
        path: Option<&str>,
        interface: &str,
        member: &str,
        handler: Handler,
    ) -> Result<(), BusError> {
        handler.check_owner(self.id)?;
        let rule = MatchRule::signal(sender, path, interface, member).map_err(MessageError::from)?;
        self.ensure_usable()?;
        if !rule.is_local() {
            let mut add_match =
                Message::method_call(Some(BUS_NAME), BUS_PATH, Some(BUS_INTERFACE), "AddMatch")?;
            add_match.append("s", &[Value::from(rule.to_string())])?;
            let serial = self.send(add_match)?;
            self.registry.expect_internal_reply(serial, "AddMatch");
        }
        tracing::debug!(target: CONNECTION_TARGET, rule = %rule, "subscribed to signal");
        self.registry.attach(handler, Route::Signal(rule));
        Ok(())
    }

    /// Serves calls to `member` of `interface` on the object at `path` with
    /// `handler`.
    ///
    /// The handler runs for every matching inbound call. When it succeeds
    /// the caller receives an empty method return; when it fails the caller
    /// receives an error reply and the error is returned from the current
    /// `drive`. Calls naming no interface match on path and member. If
    /// several handlers export the same method, the first one serves it.
    ///
    /// # Errors
    ///
    /// Returns a [`PreconditionError`] for a foreign handler, a
    /// [`MessageError`] for an invalid path or name, and a
    /// [`TransportError`] when the connection is not usable.
    pub fn export_method(
        &mut self,
        path: &str,
        interface: &str,
        member: &str,
        handler: Handler,
    ) -> Result<(), BusError> {
        handler.check_owner(self.id)?;
        let route = MethodRoute::new(path, interface, member).map_err(MessageError::from)?;
        self.ensure_usable()?;
        tracing::debug!(target: CONNECTION_TARGET, method = %route, "exported method");
        self.registry.attach(handler, Route::Method(route));
        Ok(())
    }

    /// Sends `request` and drives the connection until its reply arrives.
    ///
    /// # Errors
    ///
    /// Returns the error reply as [`BusError::Remote`], and any error
    /// [`Connection::call_async`] or [`Connection::drive`] can return.
    pub fn call(&mut self, request: Message) -> Result<Message, BusError> {
        let slot: Rc<RefCell<Option<Message>>> = Rc::default();
        let sink = Rc::clone(&slot);
        let handler = self.create_handler(move |reply| {
            *sink.borrow_mut() = Some(reply.clone());
            Ok(())
        });
        self.call_async(request, handler)?;
        self.drive_until(|| slot.borrow().is_some())?;
        let reply = slot.borrow_mut().take();
        reply.ok_or_else(|| TransportError::Faulted.into())
    }

    /// Flushes queued output.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection is not usable or the
    /// stream fails.
    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.ensure_usable()?;
        self.transport.flush()
    }

    /// Flushes, releases every handler unfired, and shuts the transport
    /// down. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the flush failure; the connection is closed regardless.
    pub fn close(&mut self) -> Result<(), TransportError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let flushed = if self.state == ConnectionState::Ready {
            self.transport.flush()
        } else {
            Ok(())
        };
        self.transport.close();
        self.state = ConnectionState::Closed;
        let released = self.registry.clear();
        if let Some(error) = self.captured.take() {
            self.reporter.suppressed_error(&error);
        }
        tracing::debug!(
            target: CONNECTION_TARGET,
            released_handlers = released,
            "closed connection"
        );
        flushed
    }

    const fn ensure_usable(&self) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Faulted => Err(TransportError::Faulted),
            ConnectionState::Closed => Err(TransportError::Closed),
        }
    }

    fn allocate_serial(&mut self) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.checked_add(1).unwrap_or(1);
        serial
    }

    /// Serializes and writes one message, returning its serial.
    fn send(&mut self, mut message: Message) -> Result<u32, BusError> {
        let serial = self.allocate_serial();
        let frame = message.encode(serial)?;
        if let Err(error) = self.transport.send(&frame) {
            return Err(self.fault(error).into());
        }
        self.reporter.message_sent(&message);
        Ok(serial)
    }

    /// Marks the connection faulted after a transport failure.
    fn fault(&mut self, error: TransportError) -> TransportError {
        self.state = ConnectionState::Faulted;
        if let Some(pending) = self.captured.take() {
            self.reporter.suppressed_error(&pending);
        }
        tracing::warn!(target: CONNECTION_TARGET, error = %error, "connection faulted");
        error
    }
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("unique_name", &self.unique_name)
            .field("handlers", &self.registry.len())
            .field("pending_replies", &self.registry.pending_replies())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::debug!(
                target: CONNECTION_TARGET,
                error = %error,
                "flush during drop failed"
            );
        }
    }
}
