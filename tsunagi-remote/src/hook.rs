//! プロセス全体のブレークハンドラ
//!
//! [`breakpoint`] と [`breakpoint!`](crate::breakpoint!) は、ここに登録されたハンドラを呼び出します。
//! 何も登録されていなければローカル端末でデバッガを開きます。
//! [`install`] はリモートセッションを開くハンドラを登録し、[`uninstall`] は
//! 登録前のハンドラに戻します。

use crate::config::RemoteConfig;
use crate::error::SessionError;
use crate::session::{self, Completion, Session};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tsunagi_core::{run_command_loop, Frame, FrameDebugger, LoopOptions};

/// ブレーク時に呼ばれるハンドラ
pub type BreakHandler = Arc<dyn Fn(Frame) -> Result<Completion, SessionError> + Send + Sync>;

struct HookSlot {
    current: Option<BreakHandler>,
    /// `install` 前のハンドラ（インストール中のみ `Some`）
    previous: Option<Option<BreakHandler>>,
}

static HOOK: Mutex<HookSlot> = Mutex::new(HookSlot {
    current: None,
    previous: None,
});

fn slot() -> MutexGuard<'static, HookSlot> {
    HOOK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// リモートデバッガをプロセス全体のブレークハンドラとして登録する
///
/// 以降のブレークごとに新しいセッションを開き、接続を待ちます。
pub fn install(config: RemoteConfig) {
    tracing::debug!(bind_to = %config.bind_to, port = config.port, "installing remote break handler");
    install_handler(remote_handler(config))
}

/// 任意のハンドラを登録する
///
/// 既にインストール中なら現在のハンドラだけを置き換え、
/// 最初のインストール前のハンドラを覚えたままにします。
pub fn install_handler(handler: BreakHandler) {
    let mut slot = slot();
    if slot.previous.is_none() {
        let before = slot.current.take();
        slot.previous = Some(before);
    }
    slot.current = Some(handler);
}

/// インストール前のハンドラに戻す
///
/// インストールされていなければ何もせず `false` を返します。
pub fn uninstall() -> bool {
    let mut slot = slot();
    match slot.previous.take() {
        Some(before) => {
            slot.current = before;
            tracing::debug!("break handler uninstalled");
            true
        }
        None => false,
    }
}

pub fn is_installed() -> bool {
    slot().previous.is_some()
}

/// リモートセッションを開くハンドラを作る
pub fn remote_handler(config: RemoteConfig) -> BreakHandler {
    Arc::new(move |frame| break_remote(&config, frame))
}

/// 呼び出し位置でブレークする
#[track_caller]
pub fn breakpoint() -> Result<Completion, SessionError> {
    dispatch(Frame::caller())
}

/// 登録されたハンドラにフレームを渡す
///
/// ハンドラの実行中はロックを保持しないので、ハンドラの中から
/// インストールやブレークを行っても構いません。
pub fn dispatch(frame: Frame) -> Result<Completion, SessionError> {
    let handler = slot().current.clone();
    match handler {
        Some(handler) => handler(frame),
        None => break_local(frame),
    }
}

/// フレームに対してリモートセッションを1回開く
pub fn break_remote(config: &RemoteConfig, frame: Frame) -> Result<Completion, SessionError> {
    let mut session = Session::listen(config)?;
    if let Some(addr) = session.local_addr() {
        eprintln!("RemoteDebugger session listening at {} ({})", addr, frame);
    }
    session.accept()?;
    session.run(&mut FrameDebugger::new(frame))
}

/// ローカル端末でデバッガを開く
fn break_local(frame: Frame) -> Result<Completion, SessionError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let mut debugger = FrameDebugger::new(frame);
    let outcome = run_command_loop(&mut debugger, &LoopOptions::default(), &mut input, &mut output);
    session::finish(outcome)
}
