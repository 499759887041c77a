//! Endpoint resolution

use std::net::{SocketAddr, ToSocketAddrs};

use crate::{Error, Result};

/// Resolve a host and port into an ordered list of candidate addresses.
///
/// Delegates to the operating system resolver and preserves its ordering;
/// candidates may mix address families. Resolution is not retried here.
pub fn resolve_host(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Resolution(format!("failed to resolve '{}': {}", host, e)))?
        .collect();

    if candidates.is_empty() {
        return Err(Error::Resolution(format!(
            "no addresses found for '{}'",
            host
        )));
    }

    tracing::debug!(host, port, count = candidates.len(), "resolved endpoint");
    Ok(candidates)
}
