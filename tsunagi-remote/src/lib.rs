//! Tsunagi リモートデバッガ
//!
//! デバッガのコマンドループを、1本のTCP接続の向こうにいるオペレータに
//! 提供します。ブレークのたびに次の手順で1つのセッションを開きます。
//!
//! 1. 設定されたアドレスで待ち受け、ちょうど1つの接続を受け付ける
//! 2. 必要なら標準入出力（fd 0/1/2）を接続に差し替える
//! 3. 接続上でコマンドループを実行する
//! 4. 標準入出力を戻し、接続を閉じる
//!
//! 接続する側は [`RemoteClient`]（`tsunagi rdb client`）か、`nc` などの
//! 任意の行指向クライアントです。

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod hook;
pub mod listener;
pub mod session;
pub mod stdio;
pub mod trace;

pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use connection::RemoteConnection;
pub use error::{ConfigError, SessionError, TransportError};
pub use hook::{
    break_remote, breakpoint, dispatch, install, install_handler, is_installed, remote_handler,
    uninstall, BreakHandler,
};
pub use listener::Listener;
pub use session::{serve, Completion, Session, SessionState};
pub use stdio::{FdIdentity, StdioPatch};
pub use trace::{set_trace, set_trace_at};

// マクロから使用するために再エクスポート
pub use tsunagi_core::Frame;
