//! In-process transport driven by a scripted peer.
//!
//! The peer side stands in for the bus: it records every frame the
//! connection sends, can answer through a responder closure, and queues
//! inbound messages for the next receive.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use super::{Received, Transport};
use crate::error::{MessageError, TransportError};
use crate::message::Message;

type Responder = Box<dyn FnMut(&Message) -> Vec<Message>>;

#[derive(Default)]
struct Shared {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    responder: Option<Responder>,
    next_serial: u32,
    peer_closed: bool,
    client_closed: bool,
    fail_sends: bool,
}

/// Connection side of an in-memory channel.
pub struct MemoryTransport {
    shared: Rc<RefCell<Shared>>,
}

/// Scripted bus side of an in-memory channel.
#[derive(Clone)]
pub struct MemoryPeer {
    shared: Rc<RefCell<Shared>>,
}

/// Creates a connected transport and the peer that scripts it.
#[must_use]
pub fn memory_transport() -> (MemoryTransport, MemoryPeer) {
    let shared = Rc::new(RefCell::new(Shared {
        next_serial: 1,
        ..Shared::default()
    }));
    (
        MemoryTransport {
            shared: Rc::clone(&shared),
        },
        MemoryPeer { shared },
    )
}

impl MemoryPeer {
    /// Queues `message` for the connection, stamping it with the next peer
    /// serial, and returns that serial.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageError`] when the message cannot be sealed.
    pub fn deliver(&self, mut message: Message) -> Result<u32, MessageError> {
        let serial = {
            let mut shared = self.shared.borrow_mut();
            let serial = shared.next_serial;
            shared.next_serial += 1;
            serial
        };
        let frame = message.encode(serial)?;
        self.deliver_frame(frame);
        Ok(serial)
    }

    /// Queues raw bytes as if they were one inbound frame.
    pub fn deliver_frame(&self, frame: Vec<u8>) {
        self.shared.borrow_mut().inbound.push_back(frame);
    }

    /// Answers every message the connection sends with the messages
    /// `responder` returns.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&Message) -> Vec<Message> + 'static,
    {
        self.shared.borrow_mut().responder = Some(Box::new(responder));
    }

    /// Closes the peer side; the connection sees end of stream once the
    /// queued frames are drained.
    pub fn disconnect(&self) {
        self.shared.borrow_mut().peer_closed = true;
    }

    /// Makes every later send fail with a broken pipe.
    pub fn fail_sends(&self) {
        self.shared.borrow_mut().fail_sends = true;
    }

    /// Returns every message the connection has sent, decoded.
    #[must_use]
    pub fn sent(&self) -> Vec<Message> {
        self.shared
            .borrow()
            .sent
            .iter()
            .filter_map(|frame| Message::from_bytes(frame).ok())
            .collect()
    }

    /// Returns the sent messages whose member is `member`.
    #[must_use]
    pub fn sent_with_member(&self, member: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|message| message.member() == Some(member))
            .collect()
    }

    /// Returns `true` once the connection has closed its side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.borrow().client_closed
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let installed = {
            let mut shared = self.shared.borrow_mut();
            if shared.client_closed {
                return Err(TransportError::Closed);
            }
            if shared.fail_sends {
                return Err(TransportError::io(
                    "write to memory peer",
                    io::ErrorKind::BrokenPipe.into(),
                ));
            }
            shared.sent.push(frame.to_vec());
            shared.responder.take()
        };
        let Some(mut responder) = installed else {
            return Ok(());
        };
        let replies = match Message::from_bytes(frame) {
            Ok(message) => responder(&message),
            Err(_) => Vec::new(),
        };
        let peer = MemoryPeer {
            shared: Rc::clone(&self.shared),
        };
        for reply in replies {
            if let Err(error) = peer.deliver(reply) {
                tracing::warn!(error = %error, "memory peer dropped an unsendable reply");
            }
        }
        let mut shared = self.shared.borrow_mut();
        if shared.responder.is_none() {
            shared.responder = Some(responder);
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Received, TransportError> {
        let mut shared = self.shared.borrow_mut();
        if shared.client_closed {
            return Err(TransportError::Closed);
        }
        if let Some(frame) = shared.inbound.pop_front() {
            return Ok(Received::Frame(frame));
        }
        if shared.peer_closed {
            return Ok(Received::Closed);
        }
        Ok(Received::Empty)
    }

    fn wait_readable(&mut self, _timeout: Option<Duration>) -> Result<(), TransportError> {
        let shared = self.shared.borrow();
        if shared.inbound.is_empty() && !shared.peer_closed {
            // Nothing scripted can arrive while the caller is blocked.
            return Err(TransportError::io(
                "wait for memory peer",
                io::Error::new(io::ErrorKind::WouldBlock, "no scripted input is queued"),
            ));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        self.shared.borrow_mut().client_closed = true;
    }
}
