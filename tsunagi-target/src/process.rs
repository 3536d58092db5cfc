//! 子プロセスの起動と実行制御

use crate::Result;
use nix::sys::ptrace;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// 停止イベントの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// ブレークポイントヒット（continue後のSIGTRAP）
    Breakpoint,
    /// ステップ実行完了（step後のSIGTRAP）
    Step,
    /// SIGTRAP以外のシグナルで停止した
    Signal(Signal),
    /// プロセスが正常終了した
    Exited(i32),
    /// プロセスがシグナルで強制終了した
    Terminated(Signal),
    /// その他の停止
    Other,
}

impl StopReason {
    /// プロセスがもう存在しない停止理由かどうか
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopReason::Exited(_) | StopReason::Terminated(_))
    }
}

/// デバッグ対象のプロセス
pub struct Process {
    pid: Pid,
    alive: bool,
}

impl Process {
    /// 実行可能ファイルを起動してデバッグ対象プロセスを開始する
    ///
    /// forkした子でPTRACE_TRACEMEを設定してからexecveします。
    /// 返されるプロセスは最初の命令を1ステップ実行した後の停止状態です。
    /// 子プロセスは親の標準入出力（fd 0/1/2）をそのまま継承します。
    pub fn spawn<P: AsRef<Path>>(program: P, args: &[String]) -> Result<Self> {
        use nix::unistd::{execve, fork, ForkResult};

        let program_path = program
            .as_ref()
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid program path"))?;
        let program_cstring = CString::new(program_path)?;

        let mut cstring_args = vec![program_cstring.clone()];
        for arg in args {
            cstring_args.push(CString::new(arg.as_str())?);
        }

        // fork後の子ではアロケーションを避けたいので、環境変数もここで用意する
        let env = env_block(std::env::vars_os())?;

        match unsafe { fork()? } {
            ForkResult::Parent { child } => {
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, _) => {}
                    status => {
                        return Err(anyhow::anyhow!(
                            "Failed to start {}: unexpected wait status after execve: {:?}",
                            program_path,
                            status
                        ));
                    }
                }

                // デバッガが先に死んだ場合に子を道連れにする
                ptrace::setoptions(child, ptrace::Options::PTRACE_O_EXITKILL)?;

                // メモリマッピングを初期化するために1ステップ実行
                ptrace::step(child, None)?;
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, _) => {
                        tracing::debug!(pid = child.as_raw(), program = program_path, "spawned traced process");
                        Ok(Self { pid: child, alive: true })
                    }
                    status => Err(anyhow::anyhow!(
                        "Unexpected wait status after step: {:?}",
                        status
                    )),
                }
            }
            ForkResult::Child => {
                if ptrace::traceme().is_ok() {
                    let _ = execve(&program_cstring, &cstring_args, &env);
                }
                // execveが戻ってきた場合は失敗
                unsafe { nix::libc::_exit(127) }
            }
        }
    }

    /// プロセスIDを取得する
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// プロセスがまだ存在するか
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// プロセスを実行継続して停止イベントを待機する
    ///
    /// `signal` が指定された場合は、そのシグナルを配送しながら再開します。
    pub fn continue_and_wait(&mut self, signal: Option<Signal>) -> Result<StopReason> {
        self.require_alive()?;
        ptrace::cont(self.pid, signal)?;
        self.wait(StopReason::Breakpoint)
    }

    /// 1命令だけ実行して停止する（ステップ実行）
    pub fn step(&mut self, signal: Option<Signal>) -> Result<StopReason> {
        self.require_alive()?;
        ptrace::step(self.pid, signal)?;
        self.wait(StopReason::Step)
    }

    /// プロセスを強制終了して回収する
    pub fn kill(&mut self) -> Result<()> {
        if !self.alive {
            return Ok(());
        }
        nix::sys::signal::kill(self.pid, Signal::SIGKILL)?;
        loop {
            match waitpid(self.pid, None)? {
                WaitStatus::Exited(..) | WaitStatus::Signaled(..) => break,
                _ => continue,
            }
        }
        self.alive = false;
        Ok(())
    }

    fn require_alive(&self) -> Result<()> {
        if self.alive {
            Ok(())
        } else {
            Err(anyhow::anyhow!("The program is not being run"))
        }
    }

    /// 停止イベントを待機してStopReasonに変換する
    ///
    /// SIGTRAPによる停止は、直前の操作に応じて `trap_reason` として報告します。
    fn wait(&mut self, trap_reason: StopReason) -> Result<StopReason> {
        let reason = match waitpid(self.pid, None)? {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => trap_reason,
            WaitStatus::Stopped(_, signal) => StopReason::Signal(signal),
            WaitStatus::Exited(_, code) => StopReason::Exited(code),
            WaitStatus::Signaled(_, signal, _) => StopReason::Terminated(signal),
            _ => StopReason::Other,
        };
        if reason.is_terminal() {
            self.alive = false;
        }
        Ok(reason)
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if self.alive {
            let _ = self.kill();
        }
    }
}

/// `execve` に渡す `KEY=VALUE` の並びを作る（UTF-8でない値もそのまま渡す）
fn env_block<I>(vars: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .map(|(key, val)| {
            let mut entry = Vec::with_capacity(key.len() + val.len() + 1);
            entry.extend_from_slice(key.as_bytes());
            entry.push(b'=');
            entry.extend_from_slice(val.as_bytes());
            CString::new(entry).map_err(anyhow::Error::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stop_reasons() {
        assert!(StopReason::Exited(0).is_terminal());
        assert!(StopReason::Terminated(Signal::SIGKILL).is_terminal());
        assert!(!StopReason::Breakpoint.is_terminal());
        assert!(!StopReason::Signal(Signal::SIGSEGV).is_terminal());
    }

    #[test]
    fn test_env_block_keeps_non_utf8_values() {
        use std::os::unix::ffi::OsStringExt;

        let vars = vec![
            (OsString::from("PLAIN"), OsString::from("value")),
            (OsString::from("RAW"), OsString::from_vec(vec![0x66, 0xff, 0x6f])),
        ];
        let env = env_block(vars).unwrap();
        assert_eq!(env[0].as_bytes(), b"PLAIN=value");
        assert_eq!(env[1].as_bytes(), b"RAW=f\xffo");
    }

    #[test]
    fn test_env_block_rejects_interior_nul() {
        let vars = vec![(OsString::from("BAD"), OsString::from("a\0b"))];
        assert!(env_block(vars).is_err());
    }

    #[test]
    #[ignore = "requires ptrace permission"]
    fn test_spawn_and_run_to_exit() {
        let mut process = Process::spawn("/bin/true", &[]).unwrap();
        assert!(process.is_alive());
        let reason = process.continue_and_wait(None).unwrap();
        assert_eq!(reason, StopReason::Exited(0));
        assert!(!process.is_alive());
    }
}
