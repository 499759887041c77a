//! Metrics instrumentation for connection lifecycle events.
//!
//! Thin wrappers over the `metrics` facade so call sites stay terse and
//! metric names live in one place. A host that installs no recorder pays
//! almost nothing.

/// Label values used across lifecycle metrics.
pub mod labels {
    pub const ROLE_CLIENT: &str = "client";
    pub const ROLE_SERVER: &str = "server";

    pub const OUTCOME_SENT: &str = "sent";
    pub const OUTCOME_PEER_CLOSED: &str = "peer_closed";

    pub const CLOSE_CLEAN: &str = "clean";
    pub const CLOSE_WARNED: &str = "warned";
    pub const CLOSE_ERROR: &str = "error";
}

/// Counter metrics.
pub mod counters {
    pub fn connect_attempted() {
        metrics::counter!("vigil_connect_attempts_total").increment(1);
    }

    pub fn connect_failed() {
        metrics::counter!("vigil_connect_failures_total").increment(1);
    }

    pub fn handshake_completed(role: &'static str) {
        metrics::counter!("vigil_handshakes_total", "role" => role, "result" => "ok").increment(1);
    }

    pub fn handshake_failed(role: &'static str) {
        metrics::counter!("vigil_handshakes_total", "role" => role, "result" => "error")
            .increment(1);
    }

    pub fn send_completed(outcome: &'static str) {
        metrics::counter!("vigil_sends_total", "outcome" => outcome).increment(1);
    }

    pub fn send_failed() {
        metrics::counter!("vigil_sends_total", "outcome" => "error").increment(1);
    }

    pub fn bytes_sent(count: u64) {
        metrics::counter!("vigil_sent_bytes_total").increment(count);
    }

    pub fn session_closed(outcome: &'static str) {
        metrics::counter!("vigil_session_closes_total", "outcome" => outcome).increment(1);
    }
}

/// Histogram metrics.
pub mod histograms {
    pub fn handshake_duration(role: &'static str, millis: u64) {
        metrics::histogram!("vigil_handshake_duration_ms", "role" => role).record(millis as f64);
    }
}
