//! 標準入出力（fd 0/1/2）の一時的な差し替え
//!
//! パッチ中はプロセス全体の fd 0/1/2 が接続先のソケットを指します。
//! 同じプロセスの他のスレッドや、パッチ中に起動した子プロセスの入出力も
//! リモートに流れる点に注意してください。

use crate::error::TransportError;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::sys::stat::fstat;
use nix::unistd::{close, dup2};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

/// 差し替える対象の fd（stdin, stdout, stderr の順）
const STDIO_FDS: [RawFd; 3] = [0, 1, 2];

/// 退避した複製を置く最小の fd 番号（0/1/2 と衝突させない）
const SAVED_FD_FLOOR: RawFd = 3;

static PATCHED: AtomicBool = AtomicBool::new(false);

/// fd が指すオープンファイルの識別子 `(st_dev, st_ino)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdIdentity {
    pub dev: u64,
    pub ino: u64,
}

impl FdIdentity {
    /// fd の識別子を取得する（閉じていれば `None`）
    pub fn of(fd: RawFd) -> Option<Self> {
        let stat = fstat(fd).ok()?;
        Some(Self {
            dev: stat.st_dev as u64,
            ino: stat.st_ino as u64,
        })
    }

    /// 標準入出力3つの識別子
    pub fn stdio() -> [Option<Self>; 3] {
        STDIO_FDS.map(Self::of)
    }
}

/// 標準入出力を差し替えている間だけ存在するトークン
///
/// `restore` を呼ぶか、ドロップされた時点で元の fd に戻します。
/// プロセス内で同時に存在できるのは1つだけです。
#[must_use = "dropping the patch restores the standard streams immediately"]
#[derive(Debug)]
pub struct StdioPatch {
    /// 退避した複製（パッチ前に閉じていた fd は `None`）
    saved: [Option<RawFd>; 3],
    released: bool,
}

impl StdioPatch {
    /// 接続のソケットで fd 0/1/2 を置き換える
    pub fn acquire<S: AsRawFd>(socket: &S) -> Result<Self, TransportError> {
        Self::acquire_fd(socket.as_raw_fd())
    }

    /// 任意の fd で fd 0/1/2 を置き換える
    ///
    /// 既にパッチ中なら `AlreadyPatched` を返し、最初のパッチはそのまま残ります。
    pub fn acquire_fd(fd: RawFd) -> Result<Self, TransportError> {
        if PATCHED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TransportError::AlreadyPatched);
        }

        flush_std_streams();

        let mut saved = [None; 3];
        for (slot, target) in saved.iter_mut().zip(STDIO_FDS) {
            match fcntl(target, FcntlArg::F_DUPFD_CLOEXEC(SAVED_FD_FLOOR)) {
                Ok(dup) => *slot = Some(dup),
                Err(Errno::EBADF) => *slot = None,
                Err(e) => {
                    close_saved(&saved);
                    PATCHED.store(false, Ordering::Release);
                    return Err(e.into());
                }
            }
        }

        for target in STDIO_FDS {
            if let Err(e) = dup2(fd, target) {
                // 途中まで差し替えた分を戻す
                if let Err(restore_err) = restore_fds(&saved) {
                    tracing::warn!(error = %restore_err, "failed to undo partial stdio patch");
                }
                PATCHED.store(false, Ordering::Release);
                return Err(e.into());
            }
        }

        tracing::debug!(socket = fd, ?saved, "standard streams redirected");
        Ok(Self {
            saved,
            released: false,
        })
    }

    /// プロセス内にパッチが存在するか
    pub fn is_active() -> bool {
        PATCHED.load(Ordering::Acquire)
    }

    /// 元の標準入出力に戻す
    pub fn restore(mut self) -> Result<(), TransportError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), TransportError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        flush_std_streams();
        let result = restore_fds(&self.saved);
        PATCHED.store(false, Ordering::Release);
        tracing::debug!("standard streams restored");
        result.map_err(TransportError::from)
    }
}

impl Drop for StdioPatch {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to restore standard streams");
        }
    }
}

/// Rust側でバッファされている出力をfdに書き出す
fn flush_std_streams() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// 退避した fd を書き戻して閉じる。パッチ前に閉じていた fd は閉じ直す
fn restore_fds(saved: &[Option<RawFd>; 3]) -> nix::Result<()> {
    let mut first_error = None;
    for (target, saved) in STDIO_FDS.into_iter().zip(saved) {
        match saved {
            Some(fd) => {
                if let Err(e) = dup2(*fd, target) {
                    first_error.get_or_insert(e);
                }
                let _ = close(*fd);
            }
            None => {
                let _ = close(target);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

fn close_saved(saved: &[Option<RawFd>; 3]) {
    for fd in saved.iter().flatten() {
        let _ = close(*fd);
    }
}
