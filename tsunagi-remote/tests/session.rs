mod common;

use common::{connect_with_retry, free_port, loopback_config, scripted_client};
use std::net::{SocketAddr, TcpStream};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tsunagi_core::{DebuggeeFailure, Frame, FrameDebugger, ScriptDebugger};
use tsunagi_remote::{Completion, Session, SessionError, SessionState, TransportError};

fn listening_session() -> (Session, SocketAddr) {
    let session = Session::listen(&loopback_config()).unwrap();
    let addr = session.local_addr().unwrap();
    (session, addr)
}

fn frame() -> Frame {
    Frame::caller().with_module("session_test").with_local("x", &42)
}

#[test]
fn test_continue_resumes_and_closes_session() {
    let (mut session, addr) = listening_session();
    assert_eq!(session.state(), SessionState::Listening);

    let client = scripted_client(addr, "p x\ncontinue\n");
    let peer = session.accept().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.peer_addr(), Some(peer));

    let completion = session.run(&mut FrameDebugger::new(frame())).unwrap();
    assert_eq!(completion, Completion::Continue);
    assert_eq!(session.state(), SessionState::Closed);

    let output = client.join().unwrap();
    assert!(output.contains("in session_test"), "{}", output);
    assert!(output.contains(&format!(":{} >>> ", addr.port())), "{}", output);
    assert!(output.starts_with("> "), "{}", output);
    assert!(output.contains("RDB@"), "{}", output);
    assert!(output.contains("42\n"), "{}", output);

    // セッション終了後はもう待ち受けていない
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_quit_command() {
    let (mut session, addr) = listening_session();
    let client = scripted_client(addr, "quit\n");
    session.accept().unwrap();
    let completion = session.run(&mut FrameDebugger::new(frame())).unwrap();
    assert_eq!(completion, Completion::Quit);
    client.join().unwrap();
}

#[test]
fn test_peer_disconnect_is_implicit_quit() {
    let (mut session, addr) = listening_session();
    let client = std::thread::spawn(move || drop(connect_with_retry(addr)));
    session.accept().unwrap();
    client.join().unwrap();

    let completion = session.run(&mut FrameDebugger::new(frame())).unwrap();
    assert_eq!(completion, Completion::Quit);
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_only_one_peer_is_accepted() {
    let (mut session, addr) = listening_session();
    let client = scripted_client(addr, "c\n");
    session.accept().unwrap();

    // 受け付けた時点で待ち受けは終わっている
    assert!(TcpStream::connect(addr).is_err());

    assert_eq!(
        session.run(&mut FrameDebugger::new(frame())).unwrap(),
        Completion::Continue
    );
    client.join().unwrap();
}

#[test]
fn test_script_exit_status_is_returned() {
    let (mut session, addr) = listening_session();
    let client = scripted_client(addr, "where\nc\n");
    session.accept().unwrap();

    let mut debugger = ScriptDebugger::new("job", || Ok(3));
    assert_eq!(session.run(&mut debugger).unwrap(), Completion::Exited(3));

    let output = client.join().unwrap();
    assert!(output.contains("> job: not started"), "{}", output);
    assert!(output.contains("The program exited with status 3"), "{}", output);
}

#[test]
fn test_debuggee_error_is_reported_then_returned() {
    let (mut session, addr) = listening_session();
    let client = scripted_client(addr, "c\n");
    session.accept().unwrap();

    let mut debugger = ScriptDebugger::new("job", || Err(anyhow::anyhow!("disk full")));
    match session.run(&mut debugger) {
        Err(SessionError::Debuggee(err)) => assert_eq!(err.to_string(), "disk full"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Closed);

    let output = client.join().unwrap();
    assert!(output.contains("Uncaught error in job: disk full"), "{}", output);
}

#[test]
fn test_debuggee_panic_resumes_after_teardown() {
    let (mut session, addr) = listening_session();
    let client = scripted_client(addr, "c\n");
    session.accept().unwrap();

    let mut debugger = ScriptDebugger::new("job", || panic!("boom"));
    let payload = panic::catch_unwind(AssertUnwindSafe(|| session.run(&mut debugger))).unwrap_err();
    assert_eq!(DebuggeeFailure::panic_message(payload.as_ref()), "boom");
    assert_eq!(session.state(), SessionState::Closed);

    let output = client.join().unwrap();
    assert!(output.contains("Uncaught panic in job: boom"), "{}", output);
}

#[test]
fn test_preloaded_commands_run_before_input() {
    let session = Session::listen(&loopback_config()).unwrap();
    let addr = session.local_addr().unwrap();
    let mut session = session.with_commands(vec!["p x".to_string(), "c".to_string()]);

    let client = std::thread::spawn(move || {
        let mut stream = connect_with_retry(addr);
        common::read_until_closed(&mut stream)
    });
    session.accept().unwrap();
    assert_eq!(
        session.run(&mut FrameDebugger::new(frame())).unwrap(),
        Completion::Continue
    );

    let output = client.join().unwrap();
    assert!(output.contains(">>> p x\n42\n"), "{}", output);
    assert!(output.contains(">>> c\n"), "{}", output);
}

#[test]
fn test_accept_timeout_closes_session() {
    let config = loopback_config().with_accept_timeout(Some(Duration::from_millis(50)));
    let mut session = Session::listen(&config).unwrap();
    assert!(matches!(
        session.accept(),
        Err(SessionError::Transport(TransportError::AcceptTimeout))
    ));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.local_addr(), None);
}

#[test]
fn test_port_is_reusable_after_session_closes() {
    let port = free_port();
    let config = loopback_config().with_port(port);

    for _ in 0..2 {
        let mut session = Session::listen(&config).unwrap();
        let addr = session.local_addr().unwrap();
        assert_eq!(addr.port(), port);
        let client = scripted_client(addr, "c\n");
        session.accept().unwrap();
        assert_eq!(
            session.run(&mut FrameDebugger::new(frame())).unwrap(),
            Completion::Continue
        );
        client.join().unwrap();
    }
}

#[test]
fn test_port_in_use_is_reported() {
    let (_held, addr) = listening_session();
    let config = loopback_config().with_port(addr.port());
    assert!(matches!(
        Session::listen(&config),
        Err(SessionError::Transport(TransportError::AddressInUse(_)))
    ));
}
