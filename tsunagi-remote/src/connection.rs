//! 確立済みの双方向接続

use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

/// リモートの相手と1対1でつながったストリーム
///
/// 読み込み側と書き込み側はそれぞれ複製したハンドルとして取り出せます。
/// 閉じるのは一度だけで、再接続はしません。
#[derive(Debug)]
pub struct RemoteConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl RemoteConnection {
    pub(crate) fn new(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        // プロンプトのような短い書き込みをすぐに届ける
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    /// 行単位で読むための読み込みハンドル
    pub fn reader(&self) -> io::Result<BufReader<TcpStream>> {
        Ok(BufReader::new(self.stream.try_clone()?))
    }

    /// 書き込みハンドル
    pub fn writer(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// 書き込み側だけを閉じる（相手には入力の終端として見える）
    pub fn shutdown_write(&self) -> io::Result<()> {
        ignore_not_connected(self.stream.shutdown(Shutdown::Write))
    }

    /// 接続を閉じる
    ///
    /// 複製したハンドルが残っていても、相手には接続の終了が伝わります。
    pub fn close(self) {
        if let Err(e) = ignore_not_connected(self.stream.shutdown(Shutdown::Both)) {
            tracing::debug!(peer = %self.peer, error = %e, "shutdown failed");
        }
        tracing::debug!(peer = %self.peer, "connection closed");
    }
}

impl AsRawFd for RemoteConnection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}
