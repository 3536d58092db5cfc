//! 一度だけ接続を受け付けるリスナー

use crate::connection::RemoteConnection;
use crate::error::TransportError;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::AsFd;
use std::time::{Duration, Instant};

/// 接続を1つだけ受け付けるサーバーソケット
///
/// `accept` が成功した時点で待ち受けソケットは閉じられ、それ以降の接続は拒否されます。
/// UnixではstdのリスナーがSO_REUSEADDRを設定するので、セッション終了直後に
/// 同じポートで再び待ち受けられます。
#[derive(Debug)]
pub struct Listener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    accept_timeout: Option<Duration>,
}

impl Listener {
    /// インターフェースとポートにバインドする（ポート0ならエフェメラルポート）
    pub fn bind(interface: &str, port: u16) -> Result<Self, TransportError> {
        let target = format!("{}:{}", interface, port);
        let addrs: Vec<SocketAddr> = (interface, port)
            .to_socket_addrs()
            .map_err(|_| TransportError::AddressInvalid(target.clone()))?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::AddressInvalid(target));
        }

        let listener = TcpListener::bind(&addrs[..]).map_err(|e| match e.kind() {
            io::ErrorKind::AddrInUse => TransportError::AddressInUse(target.clone()),
            io::ErrorKind::AddrNotAvailable => TransportError::AddressInvalid(target.clone()),
            _ => TransportError::Io(e),
        })?;
        let local_addr = listener.local_addr()?;
        tracing::debug!(%local_addr, "listener bound");

        Ok(Self {
            inner: Some(listener),
            local_addr,
            accept_timeout: None,
        })
    }

    /// 接続を待つ上限を設定する
    pub fn with_accept_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.accept_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 既に接続を受け付け、待ち受けソケットを手放したか
    pub fn is_consumed(&self) -> bool {
        self.inner.is_none()
    }

    /// 接続を1つ受け付ける
    ///
    /// タイムアウトした場合はリスナーを保持したまま `AcceptTimeout` を返します。
    pub fn accept(&mut self) -> Result<RemoteConnection, TransportError> {
        let listener = self.inner.take().ok_or(TransportError::ListenerConsumed)?;

        if let Some(timeout) = self.accept_timeout {
            match wait_readable(&listener, timeout) {
                Ok(true) => {}
                Ok(false) => {
                    self.inner = Some(listener);
                    return Err(TransportError::AcceptTimeout);
                }
                Err(e) => {
                    self.inner = Some(listener);
                    return Err(e.into());
                }
            }
        }

        let (stream, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.inner = Some(listener);
                    return Err(e.into());
                }
            }
        };
        tracing::debug!(%peer, local_addr = %self.local_addr, "connection accepted");

        // ここでlistenerがドロップされ、待ち受けが終わる
        Ok(RemoteConnection::new(stream)?)
    }
}

/// リスナーが読み込み可能（接続待ちあり）になるまで最大 `timeout` 待つ
fn wait_readable(listener: &TcpListener, timeout: Duration) -> nix::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }
        let chunk = remaining.as_millis().min(u128::from(u16::MAX)) as u16;

        let mut fds = [PollFd::new(listener.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(chunk)) {
            Ok(0) => continue,
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}
