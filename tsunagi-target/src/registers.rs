//! レジスタアクセス機能
//!
//! 現時点ではx86_64のみサポートします。

use crate::Result;
use nix::unistd::Pid;

/// 表示用に取り出した汎用レジスタの値
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    /// (レジスタ名, 値) の一覧
    pub values: Vec<(&'static str, u64)>,
}

/// レジスタ情報
pub struct Registers {
    pid: Pid,
}

impl Registers {
    /// レジスタアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    /// プログラムカウンタ（RIP）を取得する
    #[cfg(target_arch = "x86_64")]
    pub fn get_pc(&self) -> Result<u64> {
        let regs = nix::sys::ptrace::getregs(self.pid)?;
        Ok(regs.rip)
    }

    /// プログラムカウンタ（RIP）を設定する
    #[cfg(target_arch = "x86_64")]
    pub fn set_pc(&self, pc: u64) -> Result<()> {
        let mut regs = nix::sys::ptrace::getregs(self.pid)?;
        regs.rip = pc;
        nix::sys::ptrace::setregs(self.pid, regs)?;
        Ok(())
    }

    /// 主要な汎用レジスタを読み取る
    #[cfg(target_arch = "x86_64")]
    pub fn snapshot(&self) -> Result<RegisterSnapshot> {
        let regs = nix::sys::ptrace::getregs(self.pid)?;
        Ok(RegisterSnapshot {
            values: vec![
                ("rip", regs.rip),
                ("rsp", regs.rsp),
                ("rbp", regs.rbp),
                ("rax", regs.rax),
                ("rbx", regs.rbx),
                ("rcx", regs.rcx),
                ("rdx", regs.rdx),
                ("rsi", regs.rsi),
                ("rdi", regs.rdi),
                ("eflags", regs.eflags),
            ],
        })
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn get_pc(&self) -> Result<u64> {
        Err(unsupported())
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn set_pc(&self, _pc: u64) -> Result<()> {
        Err(unsupported())
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub fn snapshot(&self) -> Result<RegisterSnapshot> {
        Err(unsupported())
    }

    /// 対象プロセスのPID
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn unsupported() -> anyhow::Error {
    anyhow::anyhow!("Register access is only supported on x86_64")
}
