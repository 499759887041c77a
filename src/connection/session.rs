//! Session lifecycle: handshake, reliable sends, ordered teardown.

use std::io;
use std::time::Instant;

use super::establish::Connection;
use super::state::SessionState;
use super::tls::{server_name, CredentialConfig, Credentials, TlsRole};
use super::transport::{RecordTransport, StepError, TlsTransport};
use crate::engine::EngineGuard;
use crate::metrics::labels;
use crate::signal::SigpipeGuard;
use crate::{Error, Result};

/// Options governing session retry behavior.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Upper bound on consecutive transient retries within a handshake or
    /// send call.
    ///
    /// Default: unbounded, matching the engine's non-blocking contract
    /// where transient codes reflect call-pattern timing rather than real
    /// stalls. Set a bound when a stalled peer mid-renegotiation must not
    /// hold the caller indefinitely.
    pub retry_budget: Option<u32>,
}

impl SessionOptions {
    fn exhausted(&self, retries: u32) -> bool {
        self.retry_budget.is_some_and(|budget| retries > budget)
    }
}

/// Outcome of a completed send call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every byte of the payload was handed to the engine
    Sent,
    /// The peer performed an orderly close mid-send; expected
    /// end-of-stream, not a fault
    PeerClosed,
}

/// Outcome of a session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Every teardown step succeeded
    Clean,
    /// The goodbye notification failed; the socket was still reclaimed
    Warned,
}

/// An established TLS session over a connected transport.
///
/// Sends on one session must be serialized by the caller; the `&mut self`
/// receivers enforce that per handle, and no internal locking is provided.
pub struct Session<T: RecordTransport = TlsTransport> {
    transport: T,
    state: SessionState,
    options: SessionOptions,
    _engine: EngineGuard,
}

impl Session<TlsTransport> {
    /// Negotiate a session over `connection` using `credentials`.
    ///
    /// On failure the raw socket is shut down and every resource allocated
    /// along the way is released before the error is returned.
    pub fn establish(connection: Connection, credentials: &Credentials) -> Result<Self> {
        Self::establish_with(connection, credentials, &SessionOptions::default())
    }

    /// [`establish`](Self::establish) with explicit session options.
    pub fn establish_with(
        connection: Connection,
        credentials: &Credentials,
        options: &SessionOptions,
    ) -> Result<Self> {
        let role = credentials.role();
        let tls: rustls::Connection = match credentials.config() {
            CredentialConfig::Client(config) => {
                let name = server_name(connection.host())?;
                rustls::ClientConnection::new(config.clone(), name)
                    .map_err(|e| Error::Handshake(format!("failed to create session: {}", e)))?
                    .into()
            }
            CredentialConfig::Server(config) => rustls::ServerConnection::new(config.clone())
                .map_err(|e| Error::Handshake(format!("failed to create session: {}", e)))?
                .into(),
        };

        let peer = connection.peer_addr();
        let transport = TlsTransport::new(connection.into_stream(), tls);

        let role_label = match role {
            TlsRole::Client => labels::ROLE_CLIENT,
            TlsRole::Server => labels::ROLE_SERVER,
        };
        let started = Instant::now();
        let result = Self::handshake_over(transport, options.clone());
        match &result {
            Ok(_) => {
                tracing::debug!(%peer, %role, "session established");
                crate::metrics::counters::handshake_completed(role_label);
                crate::metrics::histograms::handshake_duration(
                    role_label,
                    started.elapsed().as_millis() as u64,
                );
            }
            Err(err) => {
                tracing::warn!(%peer, %role, %err, "handshake failed");
                crate::metrics::counters::handshake_failed(role_label);
            }
        }
        result
    }
}

impl<T: RecordTransport> Session<T> {
    /// Drive the handshake to completion over an already-bound transport.
    ///
    /// Transient codes are retried immediately with no backoff; the loop
    /// performs no readiness polling of its own and is valid with blocking
    /// sockets or with non-blocking sockets whose readiness the caller has
    /// arranged.
    pub fn handshake_over(mut transport: T, options: SessionOptions) -> Result<Self> {
        let mut state = SessionState::Created;
        state.transition(SessionState::Handshaking)?;

        let guard = SigpipeGuard::new()?;
        let mut retries = 0u32;
        loop {
            match transport.handshake_step() {
                Ok(()) => break,
                Err(StepError::Again) | Err(StepError::Interrupted) => {
                    retries += 1;
                    if options.exhausted(retries) {
                        let _ = transport.shutdown();
                        drop(guard);
                        return Err(Error::Handshake(format!(
                            "retry budget of {} exhausted",
                            retries - 1
                        )));
                    }
                }
                Err(step) => {
                    // Best-effort shutdown of the raw socket before reporting.
                    if let Err(err) = transport.shutdown() {
                        tracing::warn!(%err, "failed to shut down socket after handshake failure");
                    }
                    drop(guard);
                    return Err(Error::Handshake(step.to_string()));
                }
            }
        }
        drop(guard);

        state.transition(SessionState::Established)?;
        Ok(Session {
            transport,
            state,
            options,
            _engine: EngineGuard::acquire(),
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Flush `payload` through the session, tolerating partial writes and
    /// transient engine conditions.
    ///
    /// A renegotiation request mid-send is retried; the engine completes
    /// the renegotiation transparently. An orderly peer close yields
    /// [`SendOutcome::PeerClosed`] and moves the session to `Closed`.
    pub fn send(&mut self, payload: &[u8]) -> Result<SendOutcome> {
        if self.state != SessionState::Established {
            return Err(Error::InvalidState {
                expected: "established".into(),
                actual: self.state.to_string(),
            });
        }

        let _guard = SigpipeGuard::new()?;
        let mut remaining = payload;
        let mut retries = 0u32;
        while !remaining.is_empty() {
            match self.transport.send_record(remaining) {
                Ok(0) => {
                    tracing::debug!("peer closed the session mid-send");
                    self.state.transition(SessionState::Closed)?;
                    crate::metrics::counters::send_completed(labels::OUTCOME_PEER_CLOSED);
                    return Ok(SendOutcome::PeerClosed);
                }
                Ok(n) => {
                    remaining = &remaining[n.min(remaining.len())..];
                    retries = 0;
                }
                Err(StepError::Interrupted) | Err(StepError::Rehandshake) => {
                    retries += 1;
                    if self.options.exhausted(retries) {
                        crate::metrics::counters::send_failed();
                        return Err(Error::Send(format!(
                            "retry budget of {} exhausted",
                            retries - 1
                        )));
                    }
                }
                Err(step) => {
                    crate::metrics::counters::send_failed();
                    return Err(Error::Send(step.to_string()));
                }
            }
        }

        crate::metrics::counters::send_completed(labels::OUTCOME_SENT);
        crate::metrics::counters::bytes_sent(payload.len() as u64);
        Ok(SendOutcome::Sent)
    }

    /// Format a message and send it. Usually invoked through
    /// [`sendf!`](crate::sendf) or [`sendf_escaped!`](crate::sendf_escaped).
    pub fn send_fmt(&mut self, args: std::fmt::Arguments<'_>) -> Result<SendOutcome> {
        let message = std::fmt::format(args);
        self.send(message.as_bytes())
    }

    /// Tear the session down: goodbye, socket shutdown, descriptor close.
    ///
    /// Ordered and best-effort; every step runs regardless of the previous
    /// step's outcome. A failed goodbye downgrades to
    /// [`CloseOutcome::Warned`] (peers often close their read side first);
    /// only a hard OS error from socket shutdown or descriptor close makes
    /// the overall call fail, and the descriptor is closed even then.
    pub fn close(mut self) -> Result<CloseOutcome> {
        self.state.transition(SessionState::ShuttingDown)?;

        // Non-blocking mode bounds the remaining steps.
        if let Err(err) = self.transport.set_nonblocking(true) {
            tracing::warn!(%err, "failed to switch socket non-blocking for teardown");
        }

        let mut warned = false;
        {
            let guard = match SigpipeGuard::new() {
                Ok(guard) => Some(guard),
                Err(err) => {
                    tracing::warn!(%err, "failed to suppress SIGPIPE for teardown");
                    None
                }
            };

            let mut retries = 0u32;
            loop {
                match self.transport.goodbye() {
                    Ok(()) => break,
                    Err(StepError::Again) | Err(StepError::Interrupted) => {
                        retries += 1;
                        if self.options.exhausted(retries) {
                            tracing::warn!("goodbye retry budget exhausted");
                            warned = true;
                            break;
                        }
                    }
                    Err(step) => {
                        // Often the peer closed its read side first; never
                        // let that block reclamation.
                        tracing::warn!(error = %step, "goodbye notification failed");
                        warned = true;
                        break;
                    }
                }
            }
            drop(guard);
        }

        let mut hard_error: Option<io::Error> = None;
        match self.transport.shutdown() {
            Ok(()) => {}
            // The peer already tore the connection down.
            Err(err) if err.kind() == io::ErrorKind::NotConnected => {}
            Err(err) => {
                tracing::warn!(%err, "failed to shut down socket");
                hard_error = Some(err);
            }
        }

        if let Err(err) = self.transport.close() {
            tracing::error!(%err, "failed to close socket");
            hard_error = Some(err);
        }

        self.state.transition(SessionState::Closed)?;

        // TLS state and the credential handle are released with self.
        match hard_error {
            Some(err) => {
                crate::metrics::counters::session_closed(labels::CLOSE_ERROR);
                Err(Error::Io(err))
            }
            None if warned => {
                crate::metrics::counters::session_closed(labels::CLOSE_WARNED);
                Ok(CloseOutcome::Warned)
            }
            None => {
                crate::metrics::counters::session_closed(labels::CLOSE_CLEAN);
                Ok(CloseOutcome::Clean)
            }
        }
    }
}

impl<T: RecordTransport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("options", &self.options)
            .finish()
    }
}
