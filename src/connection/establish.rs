//! TCP establishment: sequential blocking connects and caller-polled
//! non-blocking attempts.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};

use super::resolve::resolve_host;
use crate::{Error, Result};

/// Socket-level options applied while establishing a connection.
///
/// None of these affect TLS policy; they tune the raw transport only.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Timeout for each candidate connect attempt (default: none)
    pub connect_timeout: Option<Duration>,
    /// Whether to disable Nagle's algorithm (default: true)
    pub nodelay: bool,
    /// TCP keepalive idle interval (default: OS default)
    pub keepalive_idle: Option<Duration>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            nodelay: true,
            keepalive_idle: None,
        }
    }
}

/// A connected transport endpoint.
///
/// Owns exactly one socket. The hostname the endpoint was resolved from is
/// retained for TLS server-name indication; a connection is consumed by the
/// session that handshakes over it.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    host: String,
}

impl Connection {
    /// Resolve `host:port` and connect to the first live candidate.
    pub fn open(host: &str, port: u16, options: &ConnectOptions) -> Result<Self> {
        let candidates = resolve_host(host, port)?;
        Self::establish(host, &candidates, options)
    }

    /// Try each candidate in order with a blocking connect.
    ///
    /// A failed candidate's socket is closed before the next is tried;
    /// the first success wins. Candidates are deliberately not raced in
    /// parallel, trading connection latency for deterministic resource
    /// usage. If every candidate fails, no socket remains open and the
    /// last OS error is reported.
    pub fn establish(
        host: &str,
        candidates: &[SocketAddr],
        options: &ConnectOptions,
    ) -> Result<Self> {
        crate::metrics::counters::connect_attempted();

        let mut last_error: Option<io::Error> = None;
        for addr in candidates {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    apply_socket_options(&stream, options);
                    tracing::debug!(%addr, "connected");
                    return Ok(Self {
                        stream,
                        peer: *addr,
                        host: host.to_string(),
                    });
                }
                Err(err) => {
                    tracing::debug!(%addr, %err, "candidate failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        crate::metrics::counters::connect_failed();
        Err(Error::Connect(match last_error {
            Some(err) => format!("failed to connect to '{}': {}", host, err),
            None => format!("no candidate addresses for '{}'", host),
        }))
    }

    /// Adopt an already-connected stream, typically an accepted
    /// server-side socket, so a session can handshake over it.
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream,
            host: peer.ip().to_string(),
            peer,
        })
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Hostname the connection was opened against.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn into_stream(self) -> TcpStream {
        self.stream
    }
}

fn apply_socket_options(stream: &TcpStream, options: &ConnectOptions) {
    if options.nodelay {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::warn!(%err, "failed to set TCP_NODELAY");
        }
    }
    if let Some(idle) = options.keepalive_idle {
        let keepalive = TcpKeepalive::new().with_time(idle);
        if let Err(err) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
            tracing::warn!(%err, "failed to set TCP keepalive");
        }
    }
}

/// Outcome of advancing a pending connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    /// The connect completed; redeem with [`PendingConnect::into_connection`]
    Connected,
    /// The connect is still pending; poll the socket and step again
    InProgress,
}

/// A non-blocking connect attempt whose readiness the caller polls.
///
/// For embedding in an external event loop: the caller owns the poll loop
/// and calls [`step`](Self::step) once after observing writability on the
/// socket. The first `step` issues the connect; later steps query the stored
/// socket error status exactly once each.
#[derive(Debug)]
pub struct PendingConnect {
    socket: Socket,
    addr: SocketAddr,
    host: String,
    issued: bool,
    completed: bool,
}

impl PendingConnect {
    /// Create the non-blocking socket for a connect attempt to `addr`.
    pub fn new(host: &str, addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| Error::Connect(format!("failed to open socket: {}", e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| Error::Connect(format!("failed to set socket non-blocking: {}", e)))?;
        Ok(Self {
            socket,
            addr,
            host: host.to_string(),
            issued: false,
            completed: false,
        })
    }

    /// Advance the attempt one step.
    ///
    /// Returns [`ConnectStep::InProgress`] while the OS is still connecting;
    /// the caller must wait for writability before stepping again. Once
    /// `Connected` has been returned the attempt may not be stepped again.
    pub fn step(&mut self) -> Result<ConnectStep> {
        if self.completed {
            return Err(Error::InvalidState {
                expected: "pending connect".into(),
                actual: "connected".into(),
            });
        }

        let step = if !self.issued {
            self.issued = true;
            match self.socket.connect(&self.addr.into()) {
                Ok(()) => ConnectStep::Connected,
                Err(err) if connect_in_progress(&err) => ConnectStep::InProgress,
                Err(err) => {
                    return Err(Error::Connect(format!(
                        "failed to connect to {}: {}",
                        self.addr, err
                    )))
                }
            }
        } else {
            // The caller observed writability; the stored error status
            // resolves the attempt.
            match self.socket.take_error() {
                Ok(None) => ConnectStep::Connected,
                Ok(Some(err)) if err.raw_os_error() == Some(libc::EINPROGRESS) => {
                    ConnectStep::InProgress
                }
                Ok(Some(err)) => {
                    return Err(Error::Connect(format!(
                        "failed to connect to {}: {}",
                        self.addr, err
                    )))
                }
                Err(err) => {
                    return Err(Error::Connect(format!(
                        "failed to query socket error status: {}",
                        err
                    )))
                }
            }
        };

        if step == ConnectStep::Connected {
            self.completed = true;
            tracing::debug!(addr = %self.addr, "non-blocking connect completed");
        }
        Ok(step)
    }

    /// Convert the completed attempt into a [`Connection`].
    ///
    /// The socket is left in non-blocking mode; the session handshake and
    /// send loops tolerate that as long as the caller arranged readiness.
    pub fn into_connection(self) -> Result<Connection> {
        if !self.completed {
            return Err(Error::InvalidState {
                expected: "connected".into(),
                actual: "pending connect".into(),
            });
        }
        Ok(Connection {
            stream: self.socket.into(),
            peer: self.addr,
            host: self.host,
        })
    }
}

fn connect_in_progress(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EINPROGRESS)
}
