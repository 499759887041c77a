//! Process-wide TLS engine initialization.
//!
//! The engine is initialized once per process and reference-counted: every
//! credential bundle and session holds an [`EngineGuard`], and the count
//! pairs each acquisition with a release on drop rather than relying on an
//! implicit one-shot init.

use std::sync::{Mutex, PoisonError};

static ENGINE_REFS: Mutex<usize> = Mutex::new(0);

/// Handle on the process-wide TLS engine.
///
/// Acquiring the first guard installs the process default crypto provider;
/// a host application that already installed one wins.
#[derive(Debug)]
pub(crate) struct EngineGuard(());

impl EngineGuard {
    pub(crate) fn acquire() -> Self {
        let mut refs = ENGINE_REFS.lock().unwrap_or_else(PoisonError::into_inner);
        if *refs == 0 {
            let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
            tracing::debug!("TLS engine initialized");
        }
        *refs += 1;
        EngineGuard(())
    }
}

impl Clone for EngineGuard {
    fn clone(&self) -> Self {
        Self::acquire()
    }
}

impl Drop for EngineGuard {
    fn drop(&mut self) {
        let mut refs = ENGINE_REFS.lock().unwrap_or_else(PoisonError::into_inner);
        *refs = refs.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Other tests acquire guards concurrently, so only hold-based lower
    // bounds are stable to assert.
    #[test]
    fn acquire_and_release_pair() {
        let guard = EngineGuard::acquire();
        let clone = guard.clone();
        assert!(*ENGINE_REFS.lock().unwrap() >= 2);
        drop(guard);
        assert!(*ENGINE_REFS.lock().unwrap() >= 1);
        drop(clone);
    }
}
