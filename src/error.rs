//! Error types for vigil-wire

use thiserror::Error;

/// Errors surfaced by connection and session operations.
///
/// Pending connects, peer closes, and teardown warnings are not errors;
/// they are reported through [`ConnectStep`](crate::ConnectStep),
/// [`SendOutcome`](crate::SendOutcome), and
/// [`CloseOutcome`](crate::CloseOutcome) respectively.
#[derive(Debug, Error)]
pub enum Error {
    /// Endpoint resolution failed or produced no candidate addresses
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Every candidate address refused the connection
    #[error("connect error: {0}")]
    Connect(String),

    /// Credential material was missing, mismatched, or malformed
    #[error("credential error: {0}")]
    Credential(String),

    /// TLS negotiation failed
    #[error("handshake error: {0}")]
    Handshake(String),

    /// A send aborted on a non-transient engine failure
    #[error("send error: {0}")]
    Send(String),

    /// Operation attempted in a state that forbids it
    #[error("invalid state: expected {expected}, actual {actual}")]
    InvalidState {
        /// State the operation requires
        expected: String,
        /// State the session or connect attempt was actually in
        actual: String,
    },

    /// Operating system level I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
