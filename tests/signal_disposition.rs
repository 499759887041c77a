//! SIGPIPE disposition restoration across guarded session operations.
//!
//! Signal disposition is process-wide, so this lives in its own test
//! binary with a single test: nothing else may touch SIGPIPE while the
//! assertions run.

#![cfg(unix)]

use std::io;
use std::mem;
use std::ptr;

use vigil_wire::{RecordTransport, Session, SessionOptions, StepError};

fn current_sigpipe_handler() -> libc::sighandler_t {
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        assert_eq!(libc::sigaction(libc::SIGPIPE, ptr::null(), &mut current), 0);
        current.sa_sigaction
    }
}

struct FlakyTransport {
    handshake_transients: usize,
    fail_sends: bool,
}

impl RecordTransport for FlakyTransport {
    fn handshake_step(&mut self) -> Result<(), StepError> {
        if self.handshake_transients > 0 {
            self.handshake_transients -= 1;
            return Err(StepError::Again);
        }
        Ok(())
    }

    fn send_record(&mut self, buf: &[u8]) -> Result<usize, StepError> {
        if self.fail_sends {
            return Err(StepError::Fatal("simulated failure".into()));
        }
        Ok(buf.len())
    }

    fn goodbye(&mut self) -> Result<(), StepError> {
        Err(StepError::Fatal("peer already gone".into()))
    }

    fn set_nonblocking(&mut self, _nonblocking: bool) -> io::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn disposition_is_restored_after_every_guarded_operation() {
    let before = current_sigpipe_handler();

    // Successful handshake with transient retries.
    let transport = FlakyTransport {
        handshake_transients: 2,
        fail_sends: false,
    };
    let mut session = Session::handshake_over(transport, SessionOptions::default()).unwrap();
    assert_eq!(current_sigpipe_handler(), before);

    // Successful send.
    session.send(b"payload").unwrap();
    assert_eq!(current_sigpipe_handler(), before);

    // Teardown with a failing goodbye.
    session.close().unwrap();
    assert_eq!(current_sigpipe_handler(), before);

    // Failed send path restores too.
    let transport = FlakyTransport {
        handshake_transients: 0,
        fail_sends: true,
    };
    let mut session = Session::handshake_over(transport, SessionOptions::default()).unwrap();
    assert!(session.send(b"payload").is_err());
    assert_eq!(current_sigpipe_handler(), before);
    session.close().unwrap();
    assert_eq!(current_sigpipe_handler(), before);

    // Failed handshake path restores too.
    struct FailingHandshake;
    impl RecordTransport for FailingHandshake {
        fn handshake_step(&mut self) -> Result<(), StepError> {
            Err(StepError::Fatal("no shared cipher".into()))
        }
        fn send_record(&mut self, _buf: &[u8]) -> Result<usize, StepError> {
            unreachable!("never established")
        }
        fn goodbye(&mut self) -> Result<(), StepError> {
            unreachable!("never established")
        }
        fn set_nonblocking(&mut self, _nonblocking: bool) -> io::Result<()> {
            Ok(())
        }
        fn shutdown(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    assert!(Session::handshake_over(FailingHandshake, SessionOptions::default()).is_err());
    assert_eq!(current_sigpipe_handler(), before);
}
