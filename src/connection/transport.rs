//! Record-level transport seam between the session loops and the TLS
//! engine.
//!
//! [`RecordTransport`] is what the handshake, send, and teardown loops
//! actually drive; [`TlsTransport`] is the production implementation over a
//! `rustls` connection and a TCP stream. The trait is public so embedders
//! and test harnesses can substitute simulated transports.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Outcome vocabulary for a single engine step.
///
/// `Again` and `Interrupted` are transient codes: the same call should be
/// repeated, they are not failures. Which of them a given loop retries is
/// decided by the session, not the transport.
#[derive(Debug)]
pub enum StepError {
    /// The engine wants the same call again once the transport is ready
    Again,
    /// The call was interrupted by a signal
    Interrupted,
    /// The peer requested renegotiation; the engine completes it
    /// transparently when the call is repeated
    Rehandshake,
    /// Non-recoverable failure with the engine's diagnostic text
    Fatal(String),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Again => write!(f, "transport not ready (would block)"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Rehandshake => write!(f, "renegotiation requested"),
            Self::Fatal(msg) => write!(f, "{}", msg),
        }
    }
}

/// Record-level operations the session lifecycle drives.
pub trait RecordTransport {
    /// Advance the TLS handshake by one step.
    fn handshake_step(&mut self) -> std::result::Result<(), StepError>;

    /// Write the start of `buf` as record data, returning the number of
    /// bytes accepted. `Ok(0)` means the peer performed an orderly close.
    fn send_record(&mut self, buf: &[u8]) -> std::result::Result<usize, StepError>;

    /// Send the half-close goodbye notification.
    fn goodbye(&mut self) -> std::result::Result<(), StepError>;

    /// Toggle the underlying socket's non-blocking mode.
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;

    /// Shut down both directions of the underlying socket.
    fn shutdown(&mut self) -> io::Result<()>;

    /// Close the underlying descriptor, reporting the OS result.
    fn close(&mut self) -> io::Result<()>;
}

/// Production transport: a `rustls` connection bound to a TCP stream.
pub struct TlsTransport {
    stream: Option<TcpStream>,
    tls: rustls::Connection,
    goodbye_queued: bool,
}

impl TlsTransport {
    pub(crate) fn new(stream: TcpStream, tls: rustls::Connection) -> Self {
        Self {
            stream: Some(stream),
            tls,
            goodbye_queued: false,
        }
    }

    /// Flush buffered TLS data to the socket.
    ///
    /// Returns `Ok(true)` when the peer has closed its read side; pending
    /// data that cannot be delivered to a gone peer is not an error here,
    /// the caller decides what a peer close means for its operation.
    fn flush_pending(&mut self) -> std::result::Result<bool, StepError> {
        let Self { stream, tls, .. } = self;
        let Some(stream) = stream.as_mut() else {
            return Err(StepError::Fatal("socket already closed".into()));
        };

        while tls.wants_write() {
            match tls.write_tls(stream) {
                Ok(0) => return Ok(true),
                Ok(_) => {}
                Err(err) => {
                    return match err.kind() {
                        io::ErrorKind::WouldBlock => Err(StepError::Again),
                        io::ErrorKind::Interrupted => Err(StepError::Interrupted),
                        io::ErrorKind::BrokenPipe => Ok(true),
                        _ => Err(StepError::Fatal(err.to_string())),
                    }
                }
            }
        }
        Ok(false)
    }
}

fn handshake_io(
    tls: &mut rustls::Connection,
    stream: &mut (impl Read + Write),
) -> io::Result<(usize, usize)> {
    match tls {
        rustls::Connection::Client(conn) => conn.complete_io(stream),
        rustls::Connection::Server(conn) => conn.complete_io(stream),
    }
}

fn plaintext_writer<'a>(tls: &'a mut rustls::Connection) -> rustls::Writer<'a> {
    match tls {
        rustls::Connection::Client(conn) => conn.writer(),
        rustls::Connection::Server(conn) => conn.writer(),
    }
}

impl RecordTransport for TlsTransport {
    fn handshake_step(&mut self) -> std::result::Result<(), StepError> {
        let Self { stream, tls, .. } = self;
        let Some(stream) = stream.as_mut() else {
            return Err(StepError::Fatal("socket already closed".into()));
        };

        if !tls.is_handshaking() {
            return Ok(());
        }
        match handshake_io(tls, stream) {
            Ok(_) => {
                if tls.is_handshaking() {
                    Err(StepError::Again)
                } else {
                    Ok(())
                }
            }
            Err(err) => Err(match err.kind() {
                io::ErrorKind::WouldBlock => StepError::Again,
                io::ErrorKind::Interrupted => StepError::Interrupted,
                _ => StepError::Fatal(err.to_string()),
            }),
        }
    }

    fn send_record(&mut self, buf: &[u8]) -> std::result::Result<usize, StepError> {
        // Drain leftovers from an interrupted attempt before accepting new
        // plaintext, so a repeated call never buffers bytes twice.
        if self.flush_pending()? {
            return Ok(0);
        }

        let accepted = plaintext_writer(&mut self.tls)
            .write(buf)
            .map_err(|err| StepError::Fatal(err.to_string()))?;

        match self.flush_pending() {
            Ok(true) => Ok(0),
            Ok(false) => Ok(accepted),
            // The engine owns the accepted bytes now; the next call
            // finishes the flush before taking more.
            Err(StepError::Again) | Err(StepError::Interrupted) => Ok(accepted),
            Err(err) => Err(err),
        }
    }

    fn goodbye(&mut self) -> std::result::Result<(), StepError> {
        if !self.goodbye_queued {
            self.tls.send_close_notify();
            self.goodbye_queued = true;
        }
        // A peer that already tore down its side counts as notified.
        self.flush_pending().map(|_| ())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        match self.stream.as_ref() {
            Some(stream) => stream.set_nonblocking(nonblocking),
            None => Err(already_closed()),
        }
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match self.stream.as_ref() {
            Some(stream) => stream.shutdown(Shutdown::Both),
            None => Err(already_closed()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.take() else {
            return Err(already_closed());
        };

        // close(2)'s result is part of the teardown contract; dropping the
        // stream would discard it.
        #[cfg(unix)]
        {
            use std::os::unix::io::IntoRawFd;
            let fd = stream.into_raw_fd();
            // Safety: into_raw_fd transfers ownership, so the descriptor is
            // closed exactly once, here.
            if unsafe { libc::close(fd) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
        #[cfg(not(unix))]
        {
            drop(stream);
            Ok(())
        }
    }
}

fn already_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket already closed")
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("stream", &self.stream)
            .field("tls", &"<rustls::Connection>")
            .field("goodbye_queued", &self.goodbye_queued)
            .finish()
    }
}
