//! Builders for a scripted bus peer and the messages it exchanges.

use std::rc::Rc;

use crate::connection::Connection;
use crate::message::{Message, ObjectPath, Value};
use crate::transport::{MemoryPeer, MemoryTransport, memory_transport};

use super::reporter::RecordingBusReporter;

/// Unique name the scripted peer uses when it emits signals.
const PEER_NAME: &str = ":1.1";

/// Builds a connection over an in-memory transport with a recording reporter.
pub fn connected() -> (
    Connection<MemoryTransport>,
    MemoryPeer,
    Rc<RecordingBusReporter>,
) {
    let (transport, peer) = memory_transport();
    let reporter = Rc::new(RecordingBusReporter::default());
    let connection = Connection::with_transport(transport).with_reporter(Rc::clone(&reporter));
    (connection, peer, reporter)
}

/// Builds a transient-unit start request with its two leading arguments.
pub fn start_unit_request<T: crate::transport::Transport>(
    connection: &Connection<T>,
    unit: &str,
) -> Message {
    let mut request = connection
        .create_request(
            Some("org.freedesktop.systemd1"),
            "/org/freedesktop/systemd1",
            Some("org.freedesktop.systemd1.Manager"),
            "StartTransientUnit",
        )
        .expect("valid request");
    request
        .append("ss", &[Value::from(unit), Value::from("fail")])
        .expect("arguments");
    request
}

/// Builds the successful reply to `call` carrying one object path.
pub fn reply_with_path(call: &Message, path: &str) -> Message {
    let mut reply = Message::method_return(call);
    reply
        .append(
            "o",
            &[Value::ObjectPath(ObjectPath::new(path).expect("object path"))],
        )
        .expect("reply body");
    reply
}

/// Builds a `JobRemoved` signal as systemd would emit it.
pub fn job_removed(id: u32, job: &str, unit: &str, result: &str) -> Message {
    let mut signal = Message::signal(
        "/org/freedesktop/systemd1",
        "org.freedesktop.systemd1.Manager",
        "JobRemoved",
    )
    .expect("signal");
    signal.set_sender(PEER_NAME).expect("sender");
    signal
        .append(
            "uoss",
            &[
                Value::from(id),
                Value::ObjectPath(ObjectPath::new(job).expect("job path")),
                Value::from(unit),
                Value::from(result),
            ],
        )
        .expect("signal body");
    signal
}
