//! 標準入出力の差し替えと復元
//!
//! fd 0/1/2 はプロセス全体で共有されるため、このファイルのテストは1つだけにして
//! 他のテストと同時に走らないようにしています。

mod common;

use common::{free_port, loopback_config, scripted_client};
use std::fs::File;
use std::os::fd::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tsunagi_core::{DebuggeeFailure, Debugger, Frame, FrameDebugger, ScriptDebugger};
use tsunagi_remote::{Completion, FdIdentity, Session, SessionError, StdioPatch, TransportError};

fn run_patched<D: Debugger>(
    commands: &'static str,
    debugger: &mut D,
) -> (thread::Result<Result<Completion, SessionError>>, String) {
    let config = loopback_config().with_patch_stdio(true);
    let mut session = Session::listen(&config).unwrap();
    let client = scripted_client(session.local_addr().unwrap(), commands);
    session.accept().unwrap();
    let result = panic::catch_unwind(AssertUnwindSafe(|| session.run(debugger)));
    (result, client.join().unwrap())
}

#[test]
fn stdio_is_restored_on_every_exit_path() {
    let before = FdIdentity::stdio();
    assert!(!StdioPatch::is_active());

    // continue
    let (result, _) = run_patched("c\n", &mut FrameDebugger::new(Frame::caller()));
    assert!(matches!(result, Ok(Ok(Completion::Continue))));
    assert_eq!(FdIdentity::stdio(), before);

    // quit
    let (result, _) = run_patched("q\n", &mut FrameDebugger::new(Frame::caller()));
    assert!(matches!(result, Ok(Ok(Completion::Quit))));
    assert_eq!(FdIdentity::stdio(), before);

    // 相手が何も送らずに閉じた
    let (result, _) = run_patched("", &mut FrameDebugger::new(Frame::caller()));
    assert!(matches!(result, Ok(Ok(Completion::Quit))));
    assert_eq!(FdIdentity::stdio(), before);

    // デバッグ対象のエラー
    let mut failing = ScriptDebugger::new("failing", || Err(anyhow::anyhow!("boom")));
    let (result, output) = run_patched("c\n", &mut failing);
    assert!(matches!(result, Ok(Err(SessionError::Debuggee(_)))));
    assert!(output.contains("Uncaught error in failing: boom"));
    assert_eq!(FdIdentity::stdio(), before);

    // デバッグ対象のパニック（パニックメッセージ自体もリモートに流れる）
    let mut panicking = ScriptDebugger::new("panicking", || panic!("kaboom"));
    let (result, output) = run_patched("c\n", &mut panicking);
    let payload = result.expect_err("the panic should escape the session");
    assert_eq!(DebuggeeFailure::panic_message(payload.as_ref()), "kaboom");
    assert!(output.contains("Uncaught panic in panicking: kaboom"));
    assert_eq!(FdIdentity::stdio(), before);
    assert!(!StdioPatch::is_active());

    // 二重のパッチは拒否され、最初のパッチは残る
    let devnull = File::open("/dev/null").unwrap();
    let devnull_identity = FdIdentity::of(devnull.as_raw_fd());
    let first = StdioPatch::acquire(&devnull).unwrap();
    let second_rejected = matches!(
        StdioPatch::acquire(&devnull),
        Err(TransportError::AlreadyPatched)
    );
    let still_patched = FdIdentity::stdio();
    first.restore().unwrap();
    assert!(second_rejected);
    assert!(devnull_identity.is_some());
    assert_eq!(still_patched, [devnull_identity; 3]);
    assert_eq!(FdIdentity::stdio(), before);

    // フックからのブレークは毎回新しいセッションになる
    let port = free_port();
    tsunagi_remote::install(loopback_config().with_port(port).with_patch_stdio(true));
    for round in 0..3 {
        let addr = format!("127.0.0.1:{}", port).parse().unwrap();
        let client = scripted_client(addr, "p round\nc\n");
        let completion = tsunagi_remote::breakpoint!(round).unwrap();
        assert_eq!(completion, Completion::Continue);
        let output = client.join().unwrap();
        assert!(output.contains(&format!(">>> {}\n", round)), "{}", output);
        assert_eq!(FdIdentity::stdio(), before);
    }
    assert!(tsunagi_remote::uninstall());
    assert!(!StdioPatch::is_active());
}
