//! Byte-stream transports underneath a connection.
//!
//! A transport moves whole frames. The connection asks it for whatever is
//! already available, and only blocks through [`Transport::wait_readable`]
//! when a pass found nothing to do.

mod auth;
#[cfg(any(test, feature = "test-support"))]
mod memory;
mod unix;

use std::time::Duration;

use crate::error::TransportError;

#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryPeer, MemoryTransport, memory_transport};
pub use unix::UnixTransport;

/// Outcome of a non-blocking receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// One complete frame.
    Frame(Vec<u8>),
    /// No complete frame is available yet.
    Empty,
    /// The peer closed the stream.
    Closed,
}

/// Frame-level duplex channel to the bus.
pub trait Transport {
    /// Writes one complete frame, blocking until it is fully queued.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the stream fails.
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Returns the next complete frame without blocking.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the stream fails or carries bytes
    /// that cannot start a frame.
    fn receive(&mut self) -> Result<Received, TransportError>;

    /// Blocks until input may be available or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when waiting fails.
    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<(), TransportError>;

    /// Pushes buffered output to the peer.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the stream fails.
    fn flush(&mut self) -> Result<(), TransportError>;

    /// Shuts the stream down. Later calls are no-ops.
    fn close(&mut self);
}
