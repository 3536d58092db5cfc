//! リモートデバッガのエラー型

use std::io;
use thiserror::Error;
use tsunagi_core::Signal;

use crate::session::SessionState;

/// ソケットと標準入出力の差し替えに関するエラー
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("address already in use: {0}")]
    AddressInUse(String),
    #[error("invalid address: {0}")]
    AddressInvalid(String),
    #[error("connection refused by {0}")]
    ConnectionRefused(String),
    #[error("timed out connecting to {0}")]
    ConnectionTimeout(String),
    #[error("no client connected within the accept timeout")]
    AcceptTimeout,
    #[error("listener already accepted its connection")]
    ListenerConsumed,
    #[error("standard streams are already redirected")]
    AlreadyPatched,
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<nix::Error> for TransportError {
    fn from(err: nix::Error) -> Self {
        Self::Io(io::Error::from(err))
    }
}

/// 環境変数から設定を読んだときのエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid port '{value}'")]
    InvalidPort { var: &'static str, value: String },
    #[error("{var}: expected a boolean, got '{value}'")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var}: expected seconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },
}

/// デバッグセッションのエラー
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// デバッグ対象がエラーを返した（セッションを閉じた後に返される）
    #[error("debuggee failed: {0:#}")]
    Debuggee(anyhow::Error),
    /// デバッグ対象の子プロセスがシグナルで終了した
    #[error("debuggee terminated by signal {0:?}")]
    DebuggeeSignaled(Signal),
}
