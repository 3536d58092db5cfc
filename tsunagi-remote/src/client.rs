//! リモートデバッガに接続するクライアント

use crate::connection::RemoteConnection;
use crate::error::TransportError;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// 待ち受け中のリモートデバッガへの接続
///
/// ローカルの入力をそのまま送り、受け取ったバイト列をそのまま出力します。
/// 中身の解釈やフレーミングは一切しません。
#[derive(Debug)]
pub struct RemoteClient {
    connection: RemoteConnection,
}

impl RemoteClient {
    /// サーバーに接続する
    pub fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let target = format!("{}:{}", host, port);
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::AddressInvalid(target.clone()))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::AddressInvalid(target));
        }

        let mut last_error = None;
        for addr in &addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    let connection = RemoteConnection::new(stream)?;
                    tracing::info!(peer = %connection.peer_addr(), "connected to remote debugger");
                    return Ok(Self { connection });
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionRefused(target)
            }
            Some(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                TransportError::ConnectionTimeout(target)
            }
            Some(e) => TransportError::Io(e),
            None => TransportError::AddressInvalid(target),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.connection.peer_addr()
    }

    /// リモート側が接続を閉じるまで入出力を中継する
    ///
    /// `input` の終端に達すると送信側だけを閉じ、サーバーには入力の終わりとして伝わります。
    /// その後もサーバーが閉じるまで受信を続けます。
    pub fn run<R, W>(self, input: R, output: &mut W) -> Result<(), TransportError>
    where
        R: Read + Send + 'static,
        W: Write + ?Sized,
    {
        self.shuttle(move || Ok(input), output)
    }

    /// 行編集（履歴付き）で入力しながら中継する
    pub fn run_line_edit<W: Write + ?Sized>(self, output: &mut W) -> Result<(), TransportError> {
        self.shuttle(LineEditInput::new, output)
    }

    fn shuttle<R, F, W>(self, make_input: F, output: &mut W) -> Result<(), TransportError>
    where
        R: Read,
        F: FnOnce() -> io::Result<R> + Send + 'static,
        W: Write + ?Sized,
    {
        let mut to_server = self.connection.writer()?;
        let mut from_server = self.connection.reader()?;

        // 入力側のスレッドはローカル入力でブロックし続けることがあるため、joinしない
        thread::Builder::new()
            .name("rdb-client-input".to_string())
            .spawn(move || {
                let result = make_input().and_then(|mut input| io::copy(&mut input, &mut to_server));
                if let Err(e) = &result {
                    tracing::debug!(error = %e, "local input pump stopped");
                }
                let _ = to_server.shutdown(std::net::Shutdown::Write);
            })?;

        let mut buf = [0u8; 4096];
        loop {
            let n = match from_server.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    break
                }
                Err(e) => return Err(e.into()),
            };
            output.write_all(&buf[..n])?;
            output.flush()?;
        }

        tracing::info!(peer = %self.connection.peer_addr(), "remote debugger closed the connection");
        self.connection.close();
        Ok(())
    }
}

/// rustylineで1行ずつ読み、改行を付けて返す入力
struct LineEditInput {
    editor: DefaultEditor,
    pending: Vec<u8>,
    offset: usize,
}

impl LineEditInput {
    fn new() -> io::Result<Self> {
        let editor = DefaultEditor::new().map_err(io::Error::other)?;
        Ok(Self {
            editor,
            pending: Vec::new(),
            offset: 0,
        })
    }
}

impl Read for LineEditInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.pending.len() {
            match self.editor.readline("") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = self.editor.add_history_entry(line.as_str());
                    }
                    self.pending = format!("{}\n", line).into_bytes();
                    self.offset = 0;
                }
                Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => return Ok(0),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
