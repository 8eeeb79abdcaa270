//! BDD test world: a connection over a scripted peer plus the observations
//! step functions assert on.

use std::cell::RefCell;
use std::rc::Rc;

use crate::connection::Connection;
use crate::error::{BusError, CallbackError, MessageError};
use crate::message::{Message, Value};
use crate::transport::{MemoryPeer, MemoryTransport};
use crate::{DISCONNECTED_MEMBER, LOCAL_INTERFACE};

use super::peer::{connected, reply_with_path, start_unit_request};
use super::reporter::RecordingBusReporter;

const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    pub connection: Connection<MemoryTransport>,
    pub peer: MemoryPeer,
    pub reporter: Rc<RecordingBusReporter>,
    /// Labels appended by handlers as they fire.
    pub log: Rc<RefCell<Vec<String>>>,
    request: Option<Message>,
    append_error: Option<MessageError>,
    pub drive_result: Option<Result<(), BusError>>,
    pub call_result: Option<Result<(), BusError>>,
}

impl TestWorld {
    /// Builds a world around a fresh in-memory connection.
    #[must_use]
    pub fn new() -> Self {
        let (connection, peer, reporter) = connected();
        Self {
            connection,
            peer,
            reporter,
            log: Rc::default(),
            request: None,
            append_error: None,
            drive_result: None,
            call_result: None,
        }
    }

    /// Makes the peer answer every unit start with a job path.
    pub fn answer_with_job(&self, job: String) {
        self.peer.respond_with(move |call| {
            if call.member() == Some("StartTransientUnit") {
                vec![reply_with_path(call, &job)]
            } else {
                Vec::new()
            }
        });
    }

    /// Makes the peer answer every unit start with an error reply.
    pub fn answer_with_error(&self, name: &'static str, text: String) {
        self.peer.respond_with(move |call| {
            Message::error_reply(call, name, &text)
                .map(|reply| vec![reply])
                .unwrap_or_default()
        });
    }

    /// Issues a unit start whose handler logs `label`.
    pub fn start_unit(&mut self, label: &str) {
        let request = start_unit_request(&self.connection, "app.service");
        let handler = self.logging_handler(label);
        self.call_result = Some(self.connection.call_async(request, handler));
    }

    /// Issues a unit start whose handler fails with `text`.
    pub fn start_failing_unit(&mut self, text: &str) {
        let failure = text.to_owned();
        let request = start_unit_request(&self.connection, "app.service");
        let handler = self
            .connection
            .create_handler(move |_| Err(CallbackError::msg(failure.clone())));
        self.call_result = Some(self.connection.call_async(request, handler));
    }

    /// Subscribes a logging handler to systemd `JobRemoved` signals.
    pub fn subscribe_job_removed(&mut self, label: &str) {
        let handler = self.logging_handler(label);
        let result = self.connection.subscribe_signal(
            Some("org.freedesktop.systemd1"),
            None,
            MANAGER_INTERFACE,
            "JobRemoved",
            handler,
        );
        self.call_result = Some(result);
    }

    /// Subscribes a logging handler to the local disconnect signal.
    pub fn subscribe_disconnected(&mut self, label: &str) {
        let handler = self.logging_handler(label);
        let result = self.connection.subscribe_signal(
            Some(LOCAL_INTERFACE),
            None,
            LOCAL_INTERFACE,
            DISCONNECTED_MEMBER,
            handler,
        );
        self.call_result = Some(result);
    }

    /// Starts a request and appends `value` against `signature`.
    pub fn append_mismatched(&mut self, signature: &str, value: Value) {
        let mut request = start_unit_request(&self.connection, "app.service");
        self.append_error = request.append(signature, &[value]).err();
        self.request = Some(request);
    }

    /// Sends the request built by [`TestWorld::append_mismatched`].
    pub fn send_built_request(&mut self) {
        let Some(request) = self.request.take() else {
            return;
        };
        let handler = self.logging_handler("unused");
        self.call_result = Some(self.connection.call_async(request, handler));
    }

    /// Returns the error the last append reported.
    #[must_use]
    pub const fn append_error(&self) -> Option<&MessageError> {
        self.append_error.as_ref()
    }

    /// Drives the connection once and keeps the outcome.
    pub fn drive(&mut self) {
        self.drive_result = Some(self.connection.drive());
    }

    /// Returns the labels logged so far.
    #[must_use]
    pub fn logged(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn logging_handler(&self, label: &str) -> crate::handler::Handler {
        let log = Rc::clone(&self.log);
        let entry = label.to_owned();
        self.connection.create_handler(move |_| {
            log.borrow_mut().push(entry.clone());
            Ok(())
        })
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture constructing a fresh test world.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
