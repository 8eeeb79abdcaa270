//! Single-threaded client engine for a D-Bus style message bus.
//!
//! The crate is organised bottom-up:
//!
//! - [`message`] holds the typed wire codec: signatures, values, and the
//!   [`Message`] type with its container-stack cursor.
//! - [`transport`] moves whole frames over a Unix socket, or over an
//!   in-memory channel for tests.
//! - [`handler`] owns callbacks attached for replies, signals and exported
//!   methods.
//! - [`Connection`] ties them together: it issues calls, routes inbound
//!   traffic to handlers, and captures the first deferred error so the next
//!   [`Connection::drive`] call can return it.
//!
//! ```no_run
//! use runapp_bus::{Connection, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut bus = Connection::user_bus()?;
//! let mut request = bus.create_request(
//!     Some("org.freedesktop.DBus"),
//!     "/org/freedesktop/DBus",
//!     Some("org.freedesktop.DBus"),
//!     "GetNameOwner",
//! )?;
//! request.append("s", &[Value::from("org.freedesktop.systemd1")])?;
//! let mut reply = bus.call(request)?;
//! let owner: String = reply.read_value("s")?;
//! # let _ = owner;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;
pub mod handler;
pub mod message;
mod reporter;
pub mod transport;

pub use connection::{Connection, ConnectionState};
pub use error::{
    BusError, CallbackError, ConnectError, DecodingError, EncodingError, MessageError,
    PreconditionError, RemoteError, StructuralError, TransportError,
};
pub use handler::{ConnectionId, Disposition, Handler, HandlerId, MatchRule};
pub use message::{
    Array, ContainerKind, Message, MessageKind, ObjectPath, Signature, Type, Value,
};
pub use reporter::{BusReporter, StructuredBusReporter};

/// Well-known name of the bus itself.
pub const BUS_NAME: &str = "org.freedesktop.DBus";
/// Object path of the bus itself.
pub const BUS_PATH: &str = "/org/freedesktop/DBus";
/// Interface of the bus itself.
pub const BUS_INTERFACE: &str = "org.freedesktop.DBus";
/// Interface and sender of signals the connection synthesises locally.
pub const LOCAL_INTERFACE: &str = "org.freedesktop.DBus.Local";
/// Object path of signals the connection synthesises locally.
pub const LOCAL_PATH: &str = "/org/freedesktop/DBus/Local";
/// Member of the local signal emitted when the peer goes away.
pub const DISCONNECTED_MEMBER: &str = "Disconnected";
/// Error name used when an inbound method call has no implementation.
pub const UNKNOWN_METHOD_ERROR: &str = "org.freedesktop.DBus.Error.UnknownMethod";
/// Error name used when a handler fails while answering a method call.
pub const CALLBACK_ERROR_NAME: &str = "runapp.Error";

#[cfg(test)]
mod tests;
