//! Scripted stand-ins for the user bus, systemd, and the notification
//! server.

use std::cell::RefCell;
use std::ffi::OsString;
use std::io;
use std::sync::Arc;

use runapp_bus::transport::{MemoryPeer, MemoryTransport, memory_transport};
use runapp_bus::{ConnectError, Connection, Message, ObjectPath, Value};
use runapp_config::Config;

use crate::BusConnector;
use crate::config::ConfigLoader;
use crate::errors::AppError;

/// Object path of the job the scripted manager creates.
pub const JOB_PATH: &str = "/org/freedesktop/systemd1/job/4242";
/// Address reported by a connector that refuses to connect.
const FAILED_CONNECT_ADDRESS: &str = "unix:path=/run/user/1000/bus";

const OTHER_JOB_PATH: &str = "/org/freedesktop/systemd1/job/17";
const MANAGER_NAME: &str = ":1.7";

/// How the scripted manager answers a unit start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Queue the job and report it removed with this result.
    Job(String),
    /// Answer with an error reply carrying this text.
    Reject(String),
    /// Queue the job and then drop the connection.
    Disconnect,
}

/// Answers calls on `peer` the way a session bus with systemd and a
/// notification server would.
pub fn script_systemd(peer: &MemoryPeer, outcome: StartOutcome, answer_notifications: bool) {
    let handle = peer.clone();
    peer.respond_with(move |call| match call.member() {
        Some("AddMatch") => vec![Message::method_return(call)],
        Some("StartTransientUnit") => answer_start(&handle, call, &outcome),
        Some("Notify") if answer_notifications => {
            let mut reply = Message::method_return(call);
            reply.append("u", &[Value::from(1_u32)]).expect("reply body");
            vec![reply]
        }
        _ => Vec::new(),
    });
}

fn answer_start(peer: &MemoryPeer, call: &Message, outcome: &StartOutcome) -> Vec<Message> {
    match outcome {
        StartOutcome::Job(result) => vec![
            job_reply(call),
            job_removed(OTHER_JOB_PATH, "failed"),
            job_removed(JOB_PATH, result),
        ],
        StartOutcome::Reject(text) => vec![
            Message::error_reply(call, "org.freedesktop.systemd1.UnitExists", text)
                .expect("error reply"),
        ],
        StartOutcome::Disconnect => {
            peer.disconnect();
            vec![job_reply(call)]
        }
    }
}

fn job_reply(call: &Message) -> Message {
    let mut reply = Message::method_return(call);
    reply
        .append(
            "o",
            &[Value::ObjectPath(ObjectPath::new(JOB_PATH).expect("job path"))],
        )
        .expect("reply body");
    reply
}

fn job_removed(job: &str, result: &str) -> Message {
    let mut signal = Message::signal(
        "/org/freedesktop/systemd1",
        "org.freedesktop.systemd1.Manager",
        "JobRemoved",
    )
    .expect("signal");
    signal.set_sender(MANAGER_NAME).expect("sender");
    signal
        .append(
            "uoss",
            &[
                Value::from(4242_u32),
                Value::ObjectPath(ObjectPath::new(job).expect("job path")),
                Value::from("app.service"),
                Value::from(result),
            ],
        )
        .expect("signal body");
    signal
}

/// Connector handing out in-memory connections to a scripted bus.
pub struct ScriptedBusConnector {
    outcome: StartOutcome,
    answer_notifications: bool,
    refuse: bool,
    peer: RefCell<Option<MemoryPeer>>,
}

impl ScriptedBusConnector {
    /// Builds a connector whose manager answers with `outcome`.
    pub const fn new(outcome: StartOutcome) -> Self {
        Self {
            outcome,
            answer_notifications: true,
            refuse: false,
            peer: RefCell::new(None),
        }
    }

    /// Changes how the manager answers unit starts.
    pub fn set_outcome(&mut self, outcome: StartOutcome) {
        self.outcome = outcome;
    }

    /// Leaves notification calls unanswered.
    pub const fn disable_notifications(&mut self) {
        self.answer_notifications = false;
    }

    /// Makes every connection attempt fail.
    pub const fn refuse_connections(&mut self) {
        self.refuse = true;
    }

    /// Returns the sent messages whose member is `member`.
    pub fn sent_with_member(&self, member: &str) -> Vec<Message> {
        self.peer
            .borrow()
            .as_ref()
            .map(|peer| peer.sent_with_member(member))
            .unwrap_or_default()
    }
}

impl BusConnector for ScriptedBusConnector {
    type Transport = MemoryTransport;

    fn connect(&self, _config: &Config) -> Result<Connection<MemoryTransport>, ConnectError> {
        if self.refuse {
            return Err(ConnectError::Socket {
                address: FAILED_CONNECT_ADDRESS.to_owned(),
                source: Arc::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
            });
        }
        let (transport, peer) = memory_transport();
        script_systemd(&peer, self.outcome.clone(), self.answer_notifications);
        *self.peer.borrow_mut() = Some(peer);
        Ok(Connection::with_transport(transport))
    }
}

/// Loader returning built-in defaults without touching files or the
/// environment.
#[derive(Debug, Default)]
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(Config::default())
    }
}
