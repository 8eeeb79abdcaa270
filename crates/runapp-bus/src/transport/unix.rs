//! Unix domain socket transport.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use runapp_config::BusAddress;
use socket2::{Domain, SockAddr, Socket, Type};

use super::{Received, Transport, auth};
use crate::error::{ConnectError, TransportError};
use crate::message::frame_length;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK: usize = 64 * 1024;

/// Transport over an authenticated, non-blocking Unix stream socket.
pub struct UnixTransport {
    stream: UnixStream,
    inbound: Vec<u8>,
    chunk: Box<[u8]>,
    peer_closed: bool,
    closed: bool,
}

impl UnixTransport {
    /// Dials `address`, authenticates as the effective user, and switches
    /// the socket to non-blocking mode.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectError`] when the socket cannot be opened or the
    /// bus refuses authentication.
    pub fn connect(address: &BusAddress) -> Result<Self, ConnectError> {
        let socket_error = |source: io::Error| ConnectError::Socket {
            address: address.to_string(),
            source: Arc::new(source),
        };
        let mut stream = open_stream(address).map_err(socket_error)?;
        stream
            .set_read_timeout(Some(CONNECTION_TIMEOUT))
            .map_err(socket_error)?;
        let uid = unsafe { libc::geteuid() };
        auth::authenticate(&mut stream, uid)?;
        stream.set_read_timeout(None).map_err(socket_error)?;
        Self::from_stream(stream).map_err(socket_error)
    }

    /// Wraps a stream whose peer is ready to exchange messages, such as one
    /// half of a socket pair.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the socket cannot be made non-blocking.
    pub fn from_stream(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            inbound: Vec::new(),
            chunk: vec![0_u8; READ_CHUNK].into_boxed_slice(),
            peer_closed: false,
            closed: false,
        })
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match frame_length(&self.inbound).map_err(TransportError::Malformed)? {
            Some(length) if self.inbound.len() >= length => {
                Ok(Some(self.inbound.drain(..length).collect()))
            }
            _ => Ok(None),
        }
    }

    fn has_complete_frame(&self) -> bool {
        matches!(frame_length(&self.inbound), Ok(Some(length)) if self.inbound.len() >= length)
    }

    const fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for UnixTransport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UnixTransport")
            .field("stream", &self.stream)
            .field("buffered", &self.inbound.len())
            .field("peer_closed", &self.peer_closed)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

fn open_stream(address: &BusAddress) -> io::Result<UnixStream> {
    match address {
        BusAddress::Unix { path } => {
            let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
            let target = SockAddr::unix(path.as_str())?;
            socket.connect_timeout(&target, CONNECTION_TIMEOUT)?;
            Ok(socket.into())
        }
        BusAddress::Abstract { name } => connect_abstract(name),
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let target = SocketAddr::from_abstract_name(name.as_bytes())?;
    UnixStream::connect_addr(&target)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(name: &str) -> io::Result<UnixStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("abstract socket '{name}' is only supported on Linux"),
    ))
}

fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Option<Duration>) -> io::Result<()> {
    let timeout_ms = timeout.map_or(-1, |duration| {
        i32::try_from(duration.as_millis()).unwrap_or(i32::MAX)
    });
    let mut pollfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        let rc = unsafe { libc::poll(&raw mut pollfd, 1, timeout_ms) };
        if rc >= 0 {
            return Ok(());
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

impl Transport for UnixTransport {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut remaining = frame;
        while !remaining.is_empty() {
            match self.stream.write(remaining) {
                Ok(0) => {
                    return Err(TransportError::io(
                        "write to bus socket",
                        io::ErrorKind::WriteZero.into(),
                    ));
                }
                Ok(written) => remaining = remaining.get(written..).unwrap_or_default(),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    poll_fd(self.stream.as_raw_fd(), libc::POLLOUT, None)
                        .map_err(|source| TransportError::io("wait for bus socket", source))?;
                }
                Err(error) => return Err(TransportError::io("write to bus socket", error)),
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Received, TransportError> {
        self.ensure_open()?;
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Received::Frame(frame));
            }
            if self.peer_closed {
                return Ok(Received::Closed);
            }
            match self.stream.read(&mut self.chunk) {
                Ok(0) => self.peer_closed = true,
                Ok(read) => self
                    .inbound
                    .extend_from_slice(self.chunk.get(..read).unwrap_or_default()),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Received::Empty);
                }
                Err(error) if error.kind() == io::ErrorKind::ConnectionReset => {
                    self.peer_closed = true;
                }
                Err(error) => return Err(TransportError::io("read from bus socket", error)),
            }
        }
    }

    fn wait_readable(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.peer_closed || self.has_complete_frame() {
            return Ok(());
        }
        poll_fd(self.stream.as_raw_fd(), libc::POLLIN, timeout)
            .map_err(|source| TransportError::io("wait for bus socket", source))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.stream
            .flush()
            .map_err(|source| TransportError::io("flush bus socket", source))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(error) = self.stream.shutdown(Shutdown::Both) {
            tracing::debug!(
                target: crate::reporter::CONNECTION_TARGET,
                error = %error,
                "shutting down bus socket failed"
            );
        }
    }
}
