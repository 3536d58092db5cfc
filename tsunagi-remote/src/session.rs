//! リモートデバッグセッション
//!
//! 1回のブレークにつき1つのセッションを作り、次の順に進めます。
//!
//! ```text
//! Idle -> Listening -> Connected -> Active -> Closed
//! ```
//!
//! `run` はどのような終わり方をしても、出力のフラッシュ、標準入出力の復元、
//! 接続のクローズ、リスナーの破棄をこの順に行ってから結果を返します。

use crate::config::RemoteConfig;
use crate::connection::RemoteConnection;
use crate::error::SessionError;
use crate::listener::Listener;
use crate::stdio::StdioPatch;
use std::io::Write;
use std::net::SocketAddr;
use std::panic;
use tsunagi_core::{run_command_loop, DebuggeeFailure, Debugger, LoopOptions, Outcome};

/// セッションの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Connected,
    Active,
    Closed,
}

/// セッションが正常に終わったときの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// オペレータがquitした、または接続が切れた
    Quit,
    /// オペレータがcontinueした
    Continue,
    /// デバッグ対象が終了ステータスを返した
    Exited(i32),
}

/// 1回分のリモートデバッグセッション
#[derive(Debug)]
pub struct Session {
    config: RemoteConfig,
    state: SessionState,
    listener: Option<Listener>,
    connection: Option<RemoteConnection>,
    commands: Vec<String>,
}

impl Session {
    /// まだ待ち受けていないセッションを作る
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            listener: None,
            connection: None,
            commands: Vec::new(),
        }
    }

    /// セッションを作り、設定されたアドレスで待ち受けを始める
    pub fn listen(config: &RemoteConfig) -> Result<Self, SessionError> {
        let mut session = Self::new(config.clone());
        session.bind()?;
        Ok(session)
    }

    /// 接続後、入力を読む前に実行するコマンドを設定する
    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// バインドしたアドレス（後始末まで取得できる）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(Listener::local_addr)
    }

    /// 接続してきた相手のアドレス（接続後のみ）
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.as_ref().map(RemoteConnection::peer_addr)
    }

    /// Idle -> Listening
    pub fn bind(&mut self) -> Result<SocketAddr, SessionError> {
        self.expect_state(SessionState::Idle, "listen")?;

        let listener = match Listener::bind(&self.config.bind_to, self.config.port) {
            Ok(listener) => listener.with_accept_timeout(self.config.accept_timeout),
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        };
        let addr = listener.local_addr();
        tracing::info!(%addr, "remote debugger listening");

        self.listener = Some(listener);
        self.state = SessionState::Listening;
        Ok(addr)
    }

    /// Listening -> Connected
    ///
    /// 失敗した場合はセッションを閉じます（再試行はしません）。
    pub fn accept(&mut self) -> Result<SocketAddr, SessionError> {
        self.expect_state(SessionState::Listening, "accept")?;

        let accepted = match self.listener.as_mut() {
            Some(listener) => listener.accept(),
            None => Err(crate::TransportError::ListenerConsumed),
        };
        let connection = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                tracing::info!(error = %e, "no remote debugger client connected");
                self.listener = None;
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        };

        let peer = connection.peer_addr();
        tracing::info!(%peer, "remote debugger session opened");
        self.connection = Some(connection);
        self.state = SessionState::Connected;
        Ok(peer)
    }

    /// Connected -> Active -> Closed
    ///
    /// デバッガのコマンドループを接続上で実行します。
    /// デバッグ対象のパニックは後始末の後に再送出し、エラーとシグナル終了は
    /// `SessionError` として返します。
    pub fn run<D: Debugger + ?Sized>(&mut self, debugger: &mut D) -> Result<Completion, SessionError> {
        self.expect_state(SessionState::Connected, "run")?;
        let Some(connection) = self.connection.take() else {
            return Err(self.invalid_state("run"));
        };

        let streams = connection
            .reader()
            .and_then(|reader| Ok((reader, connection.writer()?)));
        let (mut reader, mut writer) = match streams {
            Ok(streams) => streams,
            Err(e) => {
                self.teardown(connection, None);
                return Err(crate::TransportError::from(e).into());
            }
        };

        let patch = if self.config.patch_stdio {
            match StdioPatch::acquire(&connection) {
                Ok(patch) => Some(patch),
                Err(e) => {
                    self.teardown(connection, None);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        self.state = SessionState::Active;
        let options = LoopOptions::default()
            .with_prompt(self.prompt())
            .with_commands(std::mem::take(&mut self.commands));
        let outcome = run_command_loop(debugger, &options, &mut reader, &mut writer);
        tracing::debug!(?outcome, "command loop finished");

        if let Err(e) = writer.flush() {
            tracing::debug!(error = %e, "final flush to client failed");
        }
        drop(writer);
        drop(reader);
        self.teardown(connection, patch);

        finish(outcome)
    }

    /// `RDB@<hostname>:<port> >>> `
    fn prompt(&self) -> String {
        let port = self
            .listener
            .as_ref()
            .map_or(self.config.port, |l| l.local_addr().port());
        format!("RDB@{}:{} >>> ", hostname(), port)
    }

    /// 標準入出力を戻し、接続を閉じ、リスナーを破棄する
    fn teardown(&mut self, connection: RemoteConnection, patch: Option<StdioPatch>) {
        if let Some(patch) = patch {
            if let Err(e) = patch.restore() {
                tracing::warn!(error = %e, "failed to restore standard streams");
            }
        }
        let peer = connection.peer_addr();
        connection.close();
        self.listener = None;
        self.state = SessionState::Closed;
        tracing::info!(%peer, "remote debugger session closed");
    }

    fn expect_state(&self, expected: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

/// 待ち受け、接続、実行までを1回で行う
pub fn serve<D: Debugger + ?Sized>(
    config: &RemoteConfig,
    commands: Vec<String>,
    debugger: &mut D,
) -> Result<Completion, SessionError> {
    let mut session = Session::listen(config)?.with_commands(commands);
    session.accept()?;
    session.run(debugger)
}

/// コマンドループの結果を呼び出し側に返す形へ変換する
pub(crate) fn finish(outcome: Outcome) -> Result<Completion, SessionError> {
    match outcome {
        Outcome::Quit => Ok(Completion::Quit),
        Outcome::Continue => Ok(Completion::Continue),
        Outcome::Exited(code) => Ok(Completion::Exited(code)),
        Outcome::Failed(DebuggeeFailure::Panic(payload)) => panic::resume_unwind(payload),
        Outcome::Failed(DebuggeeFailure::Error(err)) => Err(SessionError::Debuggee(err)),
        Outcome::Failed(DebuggeeFailure::Signaled(signal)) => {
            Err(SessionError::DebuggeeSignaled(signal))
        }
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
