//! Error taxonomy for the bus engine.
//!
//! Errors split into two families. Synchronous failures (building a message,
//! sending it, violating a precondition) are returned from the call that
//! caused them. Deferred failures ([`RemoteError`] and [`CallbackError`])
//! arise while dispatching inbound traffic; the connection captures the
//! first one and returns it from the next [`drive`] call.
//!
//! [`drive`]: crate::Connection::drive

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::message::{ContainerKind, MessageKind, SignatureError};

/// Umbrella error returned by connection operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Opening or registering the connection failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),
    /// The byte stream to the bus failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A method call was answered with an error reply.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// A handler callback failed during dispatch.
    #[error(transparent)]
    Callback(#[from] CallbackError),
    /// A message could not be built or read.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// An operation was invoked with arguments it cannot accept.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

impl BusError {
    /// Returns `true` for errors that are captured during dispatch and
    /// surfaced later by `drive`.
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Callback(_))
    }

    /// Returns the remote error when the failure came from an error reply.
    #[must_use]
    pub const fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(remote) => Some(remote),
            _ => None,
        }
    }
}

impl From<SignatureError> for BusError {
    fn from(error: SignatureError) -> Self {
        Self::Message(MessageError::from(EncodingError::from(error)))
    }
}

/// Failures while opening a connection to the bus.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The bus address could not be determined.
    #[error("failed to determine the bus address: {0}")]
    Address(#[from] runapp_config::AddressParseError),
    /// The socket could not be opened.
    #[error("failed to connect to bus at {address}: {source}")]
    Socket {
        /// Address that was dialled.
        address: String,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The authentication exchange failed at the I/O level.
    #[error("bus authentication failed during {stage}: {source}")]
    Handshake {
        /// Step of the exchange that failed.
        stage: &'static str,
        /// Underlying socket error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The bus refused the offered credentials.
    #[error("bus rejected authentication: {response}")]
    Rejected {
        /// Response line sent by the bus.
        response: String,
    },
    /// The registration call to the bus failed.
    #[error("failed to register with the bus: {source}")]
    Hello {
        /// Error raised by the registration call.
        #[source]
        source: Box<BusError>,
    },
}

/// Failures of the byte stream underneath a connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A socket operation failed.
    #[error("failed to {operation}: {source}")]
    Io {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The peer sent bytes that are not a valid message.
    #[error("received malformed message: {0}")]
    Malformed(#[source] DecodingError),
    /// An earlier transport failure or disconnect left the connection unusable.
    #[error("connection is faulted and can no longer be used")]
    Faulted,
    /// The connection was closed locally.
    #[error("connection is closed")]
    Closed,
}

impl TransportError {
    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            operation,
            source: Arc::new(source),
        }
    }
}

/// An error reply received for a method call.
///
/// Displays as the error text the remote sent, mirroring how the failure
/// would read to a user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Error name, such as `org.freedesktop.DBus.Error.UnknownMethod`.
    pub name: String,
    /// Human-readable text carried in the reply body.
    pub message: String,
}

impl RemoteError {
    /// Builds a remote error from its name and text.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A handler callback failed while processing an inbound message.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback could not read or build a message.
    #[error(transparent)]
    Message(#[from] MessageError),
    /// The callback failed with a plain description.
    #[error("{0}")]
    Failed(String),
    /// The callback failed with an arbitrary error.
    #[error(transparent)]
    Other(Box<dyn StdError + Send + Sync>),
}

impl CallbackError {
    /// Builds a callback failure from a description.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wraps an arbitrary error raised inside a callback.
    #[must_use]
    pub fn other(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}

/// Failures while building or reading a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// Container open/close calls were unbalanced.
    #[error(transparent)]
    Structural(#[from] StructuralError),
    /// A value could not be appended.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// A value could not be read.
    #[error(transparent)]
    Decoding(#[from] DecodingError),
}

/// Unbalanced container operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// `close_container` was called with no container open.
    #[error("no container is open")]
    NoOpenContainer,
    /// The message was sealed with containers still open.
    #[error("{depth} container(s) are still open")]
    UnclosedContainers {
        /// Number of containers left open.
        depth: usize,
    },
    /// A struct, dict entry or variant was closed before all of its
    /// declared contents were written.
    #[error("{kind} closed before its contents '{expected}' were complete")]
    IncompleteContainer {
        /// Kind of the container being closed.
        kind: ContainerKind,
        /// Signature the container declared.
        expected: String,
    },
}

/// Failures while appending values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// A value does not have the type its signature slot names.
    #[error("value of type '{found}' does not match signature '{expected}'")]
    TypeMismatch {
        /// Signature of the slot.
        expected: String,
        /// Type of the supplied value.
        found: String,
    },
    /// The number of values differs from the number of signature types.
    #[error("signature '{signature}' describes {expected} value(s) but {found} were supplied")]
    ArityMismatch {
        /// Signature of the append.
        signature: String,
        /// Number of complete types in the signature.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// The enclosing container expects a different type next.
    #[error("the enclosing container expects '{expected}' but '{found}' was appended")]
    UnexpectedType {
        /// Type the container expects next.
        expected: String,
        /// Type that was appended.
        found: String,
    },
    /// The enclosing struct, dict entry or variant is already full.
    #[error("the enclosing {kind} is already complete")]
    ContainerFull {
        /// Kind of the full container.
        kind: ContainerKind,
    },
    /// The signature text is invalid.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// An object path is invalid.
    #[error("invalid object path '{0}'")]
    InvalidObjectPath(String),
    /// A bus, interface, member or error name is invalid.
    #[error("invalid {kind} '{value}'")]
    InvalidName {
        /// Which kind of name was checked.
        kind: &'static str,
        /// Offending text.
        value: String,
    },
    /// A string contains a NUL byte.
    #[error("strings must not contain NUL bytes")]
    EmbeddedNul,
    /// An array or the whole message exceeds its size limit.
    #[error("{what} of {size} bytes exceeds the size limit")]
    TooLarge {
        /// What overflowed.
        what: &'static str,
        /// Size that was reached.
        size: usize,
    },
    /// The message was already sealed for sending.
    #[error("message is sealed and can no longer be appended to")]
    Sealed,
    /// An earlier append failed and left the body unusable.
    #[error("message is unusable after an earlier append failed")]
    Poisoned,
    /// The message was received and is read-only.
    #[error("received messages cannot be appended to")]
    ReadOnly,
}

impl From<crate::message::ObjectPathError> for EncodingError {
    fn from(error: crate::message::ObjectPathError) -> Self {
        Self::InvalidObjectPath(error.0)
    }
}

/// Failures while reading values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodingError {
    /// No value is left in the current container or body.
    #[error("no more data to read '{expected}'")]
    EndOfData {
        /// Signature the caller asked for.
        expected: String,
    },
    /// The next value has a different type than requested.
    #[error("expected '{expected}' but found '{found}'")]
    TypeMismatch {
        /// Signature the caller asked for.
        expected: String,
        /// Type present in the message.
        found: String,
    },
    /// The signature passed to a fixed-arity read names a different
    /// number of values.
    #[error("signature '{signature}' describes {found} value(s), not {expected}")]
    ArityMismatch {
        /// Signature of the read.
        signature: String,
        /// Number of values the caller expects.
        expected: usize,
        /// Number of complete types in the signature.
        found: usize,
    },
    /// The data ends before the value does.
    #[error("message data is truncated")]
    Truncated,
    /// A string is not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// The data breaks the wire format.
    #[error("{0}")]
    Malformed(String),
    /// A signature inside the data is invalid.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// The message was built locally and has no read cursor.
    #[error("messages under construction cannot be read")]
    WriteOnly,
}

impl DecodingError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Operations invoked with arguments they cannot accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreconditionError {
    /// The handler was created by a different connection.
    #[error("handler belongs to connection {owner}, not connection {connection}")]
    ForeignHandler {
        /// Connection that created the handler.
        owner: u64,
        /// Connection the handler was passed to.
        connection: u64,
    },
    /// A request of the wrong kind was passed to `call_async`.
    #[error("expected a method call but got a {kind}")]
    NotAMethodCall {
        /// Kind of the message that was passed.
        kind: MessageKind,
    },
}
