//! Connection management
//!
//! This module handles:
//! * Endpoint resolution
//! * TCP establishment (blocking, and caller-polled non-blocking)
//! * Credential bundles and TLS policy
//! * Session lifecycle and state machine enforcement

mod establish;
mod resolve;
mod session;
mod state;
mod tls;
mod transport;

pub use establish::{ConnectOptions, ConnectStep, Connection, PendingConnect};
pub use resolve::resolve_host;
pub use session::{CloseOutcome, SendOutcome, Session, SessionOptions};
pub use state::SessionState;
pub use tls::{Credentials, CredentialsBuilder, TlsRole};
pub use transport::{RecordTransport, StepError, TlsTransport};
