//! Tsunagi ターゲットプロセス制御
//!
//! このクレートは、デバッグ対象の子プロセスを制御するための低レベル機能を提供します。
//! ptraceによる起動と停止、レジスタアクセス、メモリアクセス、INT3ブレークポイントを扱います。

pub mod process;
pub mod memory;
pub mod registers;
pub mod breakpoint;

pub use process::{Process, StopReason};
pub use memory::{Memory, MemoryMapping};
pub use registers::{RegisterSnapshot, Registers};
pub use breakpoint::{SoftwareBreakpoint, INT3_OPCODE};

/// 停止シグナル型の再エクスポート
pub use nix::sys::signal::Signal;

/// ターゲット制御の結果型
pub type Result<T> = anyhow::Result<T>;
