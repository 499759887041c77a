//! Session lifecycle tests over simulated transports.
//!
//! These drive the handshake, send, and teardown loops against scripted
//! [`RecordTransport`] implementations, so every retry and failure branch
//! is exercised without a network.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use vigil_wire::{
    sendf, sendf_escaped, CloseOutcome, Error, RecordTransport, SendOutcome, Session,
    SessionOptions, SessionState, StepError,
};

/// What a scripted transport observed.
#[derive(Default)]
struct TransportLog {
    handshake_steps: usize,
    goodbye_attempts: usize,
    shutdown_called: bool,
    close_called: bool,
    nonblocking: Option<bool>,
    sent: Vec<u8>,
}

#[derive(Clone, Copy)]
enum Transient {
    Again,
    Interrupted,
    Rehandshake,
}

impl Transient {
    fn step(self) -> StepError {
        match self {
            Transient::Again => StepError::Again,
            Transient::Interrupted => StepError::Interrupted,
            Transient::Rehandshake => StepError::Rehandshake,
        }
    }
}

struct SimTransport {
    log: Rc<RefCell<TransportLog>>,
    handshake_transients: usize,
    handshake_fails: bool,
    send_transients: usize,
    transient: Transient,
    chunk: usize,
    peer_close_at: Option<usize>,
    fail_sends: bool,
    goodbye_transients: usize,
    goodbye_fails: bool,
}

impl SimTransport {
    fn new(log: Rc<RefCell<TransportLog>>) -> Self {
        Self {
            log,
            handshake_transients: 0,
            handshake_fails: false,
            send_transients: 0,
            transient: Transient::Interrupted,
            chunk: usize::MAX,
            peer_close_at: None,
            fail_sends: false,
            goodbye_transients: 0,
            goodbye_fails: false,
        }
    }
}

impl RecordTransport for SimTransport {
    fn handshake_step(&mut self) -> Result<(), StepError> {
        self.log.borrow_mut().handshake_steps += 1;
        if self.handshake_fails {
            return Err(StepError::Fatal("simulated handshake failure".into()));
        }
        if self.handshake_transients > 0 {
            self.handshake_transients -= 1;
            return Err(StepError::Again);
        }
        Ok(())
    }

    fn send_record(&mut self, buf: &[u8]) -> Result<usize, StepError> {
        if self.fail_sends {
            return Err(StepError::Fatal("simulated send failure".into()));
        }
        if self.send_transients > 0 {
            self.send_transients -= 1;
            return Err(self.transient.step());
        }
        let mut log = self.log.borrow_mut();
        if let Some(at) = self.peer_close_at {
            if log.sent.len() >= at {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.chunk);
        log.sent.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn goodbye(&mut self) -> Result<(), StepError> {
        self.log.borrow_mut().goodbye_attempts += 1;
        if self.goodbye_transients > 0 {
            self.goodbye_transients -= 1;
            return Err(StepError::Again);
        }
        if self.goodbye_fails {
            return Err(StepError::Fatal("simulated goodbye failure".into()));
        }
        Ok(())
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.log.borrow_mut().nonblocking = Some(nonblocking);
        Ok(())
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.log.borrow_mut().shutdown_called = true;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.log.borrow_mut().close_called = true;
        Ok(())
    }
}

fn established(
    configure: impl FnOnce(&mut SimTransport),
) -> (Session<SimTransport>, Rc<RefCell<TransportLog>>) {
    established_with(configure, SessionOptions::default())
}

fn established_with(
    configure: impl FnOnce(&mut SimTransport),
    options: SessionOptions,
) -> (Session<SimTransport>, Rc<RefCell<TransportLog>>) {
    let log = Rc::new(RefCell::new(TransportLog::default()));
    let mut transport = SimTransport::new(log.clone());
    configure(&mut transport);
    let session = Session::handshake_over(transport, options).expect("handshake");
    (session, log)
}

#[test]
fn handshake_with_k_transients_performs_k_plus_one_steps() {
    let (session, log) = established(|t| t.handshake_transients = 3);
    assert_eq!(session.state(), SessionState::Established);
    assert_eq!(log.borrow().handshake_steps, 4);
}

#[test]
fn handshake_failure_shuts_down_the_socket() {
    let log = Rc::new(RefCell::new(TransportLog::default()));
    let mut transport = SimTransport::new(log.clone());
    transport.handshake_fails = true;

    let result = Session::handshake_over(transport, SessionOptions::default());
    match result {
        Err(Error::Handshake(msg)) => assert!(msg.contains("simulated handshake failure")),
        other => panic!("expected handshake error, got {:?}", other.map(|_| ())),
    }
    assert!(log.borrow().shutdown_called);
}

#[test]
fn handshake_retry_budget_bounds_the_loop() {
    let log = Rc::new(RefCell::new(TransportLog::default()));
    let mut transport = SimTransport::new(log.clone());
    transport.handshake_transients = 100;

    let options = SessionOptions {
        retry_budget: Some(3),
    };
    let result = Session::handshake_over(transport, options);
    match result {
        Err(Error::Handshake(msg)) => assert!(msg.contains("retry budget")),
        other => panic!("expected handshake error, got {:?}", other.map(|_| ())),
    }
    assert!(log.borrow().shutdown_called);
}

#[test]
fn one_byte_transport_reassembles_the_exact_payload() {
    let (mut session, log) = established(|t| t.chunk = 1);
    let payload = b"every byte, in order, exactly once";

    let outcome = session.send(payload).expect("send");
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(log.borrow().sent, payload);
}

#[test]
fn zero_on_first_send_is_peer_closed_not_an_error() {
    let (mut session, log) = established(|t| t.peer_close_at = Some(0));

    let outcome = session.send(b"unsendable").expect("send outcome");
    assert_eq!(outcome, SendOutcome::PeerClosed);
    assert_eq!(session.state(), SessionState::Closed);
    assert!(log.borrow().sent.is_empty());

    // A closed session rejects further sends.
    assert!(matches!(
        session.send(b"more"),
        Err(Error::InvalidState { .. })
    ));
}

#[test]
fn peer_close_mid_payload_aborts_the_remainder() {
    let (mut session, log) = established(|t| {
        t.chunk = 4;
        t.peer_close_at = Some(4);
    });

    let outcome = session.send(b"abcdefgh").expect("send outcome");
    assert_eq!(outcome, SendOutcome::PeerClosed);
    assert_eq!(log.borrow().sent, b"abcd");
}

#[test]
fn interrupted_sends_retry_without_duplication() {
    let (mut session, log) = established(|t| {
        t.send_transients = 2;
        t.transient = Transient::Interrupted;
    });

    let outcome = session.send(b"payload").expect("send");
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(log.borrow().sent, b"payload");
}

#[test]
fn rehandshake_requests_retry_transparently() {
    let (mut session, log) = established(|t| {
        t.send_transients = 1;
        t.transient = Transient::Rehandshake;
    });

    let outcome = session.send(b"payload").expect("send");
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(log.borrow().sent, b"payload");
}

#[test]
fn would_block_on_send_is_a_send_error() {
    // The send loop retries interrupted/rehandshake only; a would-block
    // means the caller broke the readiness contract.
    let (mut session, _log) = established(|t| {
        t.send_transients = 1;
        t.transient = Transient::Again;
    });

    assert!(matches!(session.send(b"payload"), Err(Error::Send(_))));
}

#[test]
fn fatal_send_failure_is_a_send_error() {
    let (mut session, _log) = established(|t| t.fail_sends = true);
    match session.send(b"payload") {
        Err(Error::Send(msg)) => assert!(msg.contains("simulated send failure")),
        other => panic!("expected send error, got {:?}", other),
    }
}

#[test]
fn send_retry_budget_bounds_the_loop() {
    let options = SessionOptions {
        retry_budget: Some(2),
    };
    let (mut session, _log) = established_with(
        |t| {
            t.send_transients = 100;
            t.transient = Transient::Rehandshake;
        },
        options,
    );

    match session.send(b"payload") {
        Err(Error::Send(msg)) => assert!(msg.contains("retry budget")),
        other => panic!("expected send error, got {:?}", other),
    }
}

#[test]
fn sendf_formats_before_sending() {
    let (mut session, log) = established(|_| {});
    let outcome = sendf!(session, "<get_report id=\"{}\"/>", 17).expect("send");
    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(log.borrow().sent, b"<get_report id=\"17\"/>");
}

#[test]
fn sendf_escaped_escapes_arguments_but_not_the_template() {
    let (mut session, log) = established(|_| {});
    let hostile = r#"<x>&"y"</x>"#;
    sendf_escaped!(session, "<name>{}</name>", hostile).expect("send");
    assert_eq!(
        log.borrow().sent,
        b"<name>&lt;x&gt;&amp;&quot;y&quot;&lt;/x&gt;</name>"
    );
}

#[test]
fn clean_teardown_runs_every_step_once() {
    let (session, log) = established(|_| {});
    let outcome = session.close().expect("close");
    assert_eq!(outcome, CloseOutcome::Clean);

    let log = log.borrow();
    assert_eq!(log.nonblocking, Some(true));
    assert_eq!(log.goodbye_attempts, 1);
    assert!(log.shutdown_called);
    assert!(log.close_called);
}

#[test]
fn goodbye_transients_are_retried() {
    let (session, log) = established(|t| t.goodbye_transients = 2);
    let outcome = session.close().expect("close");
    assert_eq!(outcome, CloseOutcome::Clean);
    assert_eq!(log.borrow().goodbye_attempts, 3);
}

#[test]
fn failed_goodbye_still_reclaims_the_socket() {
    let (session, log) = established(|t| t.goodbye_fails = true);
    let outcome = session.close().expect("close");
    assert_eq!(outcome, CloseOutcome::Warned);

    let log = log.borrow();
    assert!(log.shutdown_called);
    assert!(log.close_called);
}

#[test]
fn teardown_after_peer_close_still_succeeds() {
    let (mut session, log) = established(|t| t.peer_close_at = Some(0));
    assert_eq!(
        session.send(b"x").expect("send outcome"),
        SendOutcome::PeerClosed
    );

    let outcome = session.close().expect("close");
    assert!(matches!(
        outcome,
        CloseOutcome::Clean | CloseOutcome::Warned
    ));
    assert!(log.borrow().close_called);
}
