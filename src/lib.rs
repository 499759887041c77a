//! Connection-lifecycle management for TLS control channels.
//!
//! This crate sequences the fallible, stateful resources behind a secure
//! control-plane connection: it resolves an endpoint, establishes a TCP
//! connection (blocking, or stepped from the caller's own event loop),
//! negotiates a TLS session over it, performs reliable framed sends that
//! tolerate transient engine conditions, and tears the session down in an
//! ordered, best-effort sequence. Broken-pipe delivery is suppressed around
//! every write and close that can hit a half-closed peer, with the prior
//! signal disposition restored on all paths.
//!
//! The TLS engine itself (cryptography, certificate validation) is consumed
//! as a capability via `rustls`; this crate owns connection and session
//! state and control flow only.
//!
//! # Example
//!
//! ```no_run
//! use vigil_wire::{sendf, Connection, ConnectOptions, Credentials, Session, TlsRole};
//!
//! # fn main() -> vigil_wire::Result<()> {
//! let credentials = Credentials::builder(TlsRole::Client)
//!     .ca_file("/etc/vigil/ca.pem")
//!     .build()?;
//!
//! let connection = Connection::open("manager.internal", 9390, &ConnectOptions::default())?;
//! let mut session = Session::establish(connection, &credentials)?;
//!
//! sendf!(session, "<get_version/>")?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod metrics;

pub mod connection;
pub mod markup;
pub mod signal;

pub use connection::{
    resolve_host, CloseOutcome, ConnectOptions, ConnectStep, Connection, Credentials,
    CredentialsBuilder, PendingConnect, RecordTransport, SendOutcome, Session, SessionOptions,
    SessionState, StepError, TlsRole, TlsTransport,
};
pub use error::{Error, Result};

/// Format a message and send it over a session.
///
/// Expands to [`Session::send_fmt`] with a standard format string.
#[macro_export]
macro_rules! sendf {
    ($session:expr, $($arg:tt)*) => {
        $session.send_fmt(::core::format_args!($($arg)*))
    };
}

/// Format a message and send it, escaping markup-special characters
/// (`&`, `<`, `>`, `"`, `'`) in every substituted argument.
///
/// The template text itself is passed through verbatim; only argument
/// values are escaped, so untrusted fields can be embedded into a
/// structured text payload.
#[macro_export]
macro_rules! sendf_escaped {
    ($session:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        $session.send_fmt(::core::format_args!($fmt $(, $crate::markup::Escaped(&$arg))*))
    };
}
