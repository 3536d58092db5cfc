//! コードから直接リモートセッションを開く

use crate::config::RemoteConfig;
use crate::error::SessionError;
use crate::hook::break_remote;
use crate::session::Completion;
use tsunagi_core::Frame;

/// 呼び出し位置でリモートセッションを開き、接続を待つ
///
/// 設定は既定値と `TSUNAGI_RDB_*` 環境変数から作ります。
/// インストールされたハンドラの有無に関係なく、常にリモートで開きます。
#[track_caller]
pub fn set_trace() -> Result<Completion, SessionError> {
    set_trace_at(Frame::caller())
}

/// 与えたフレームでリモートセッションを開く
pub fn set_trace_at(frame: Frame) -> Result<Completion, SessionError> {
    let config = RemoteConfig::from_env()?;
    break_remote(&config, frame)
}

/// 呼び出し位置でブレークし、指定した変数の値をデバッガから見えるようにする
///
/// ```no_run
/// let attempts = 3;
/// tsunagi_remote::breakpoint!(attempts).unwrap();
/// ```
#[macro_export]
macro_rules! breakpoint {
    ($($var:expr),* $(,)?) => {
        $crate::dispatch(
            $crate::Frame::caller()
                .with_module(module_path!())
                $(.with_local(stringify!($var), &$var))*
        )
    };
}

/// 呼び出し位置でリモートセッションを開く（[`set_trace`] のマクロ版）
#[macro_export]
macro_rules! set_trace {
    ($($var:expr),* $(,)?) => {
        $crate::set_trace_at(
            $crate::Frame::caller()
                .with_module(module_path!())
                $(.with_local(stringify!($var), &$var))*
        )
    };
}
