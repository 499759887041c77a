//! Broken-pipe signal suppression.
//!
//! Writing to a socket whose peer closed its read side raises SIGPIPE, whose
//! default disposition terminates the process. Every write and close path in
//! this crate that can hit a half-closed peer runs under a [`SigpipeGuard`],
//! which ignores the signal for its scope and restores the exact prior
//! disposition on drop, on success and failure paths alike.

#[cfg(unix)]
pub use unix::SigpipeGuard;

#[cfg(unix)]
mod unix {
    use std::io;
    use std::marker::PhantomData;
    use std::mem;
    use std::ptr;

    /// Scoped suppression of SIGPIPE delivery.
    ///
    /// Signal disposition is process-wide state: guards must not be nested
    /// across threads. Callers performing guarded operations from multiple
    /// threads must serialize them externally.
    pub struct SigpipeGuard {
        prev: libc::sigaction,
        // Process-global state; the guard must stay on the acquiring thread.
        _not_send: PhantomData<*mut ()>,
    }

    impl SigpipeGuard {
        /// Ignore SIGPIPE, capturing the prior disposition.
        pub fn new() -> io::Result<Self> {
            // Safety: sigaction with valid pointers to zero-initialized
            // structs; SIG_IGN takes no handler state.
            unsafe {
                let mut action: libc::sigaction = mem::zeroed();
                action.sa_sigaction = libc::SIG_IGN;
                action.sa_flags = 0;
                libc::sigemptyset(&mut action.sa_mask);

                let mut prev: libc::sigaction = mem::zeroed();
                if libc::sigaction(libc::SIGPIPE, &action, &mut prev) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(SigpipeGuard {
                    prev,
                    _not_send: PhantomData,
                })
            }
        }
    }

    impl Drop for SigpipeGuard {
        fn drop(&mut self) {
            // Safety: restores the disposition captured in new(); a failure
            // here cannot be surfaced from drop and is exceedingly unlikely
            // for a valid signal number.
            let rc = unsafe { libc::sigaction(libc::SIGPIPE, &self.prev, ptr::null_mut()) };
            if rc != 0 {
                tracing::warn!("failed to restore SIGPIPE disposition");
            }
        }
    }

    impl std::fmt::Debug for SigpipeGuard {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("SigpipeGuard")
        }
    }
}

#[cfg(not(unix))]
pub use fallback::SigpipeGuard;

#[cfg(not(unix))]
mod fallback {
    use std::io;

    /// No-op guard: the target has no SIGPIPE to suppress.
    #[derive(Debug)]
    pub struct SigpipeGuard(());

    impl SigpipeGuard {
        /// Always succeeds.
        pub fn new() -> io::Result<Self> {
            Ok(SigpipeGuard(()))
        }
    }
}
