//! Tsunagi デバッガのコア機能
//!
//! このクレートは、リモート層から包んで使うコマンドループと、その上で動く
//! デバッガ（ソース位置ブレーク、スクリプト実行、子プロセスのptrace制御）を提供します。
//! 入出力はすべて呼び出し側から渡されるストリームに対して行います。

pub mod breakpoint;
pub mod command;
pub mod command_loop;
pub mod errors;
pub mod frame;
pub mod outcome;
pub mod parse;
pub mod program;
pub mod script;

pub use breakpoint::{Breakpoint, BreakpointId, BreakpointManager};
pub use command::Command;
pub use command_loop::{run_command_loop, Debugger, Flow, LoopOptions};
pub use frame::{Frame, FrameDebugger};
pub use outcome::{DebuggeeFailure, Outcome};
pub use program::{resolve_program, ProgramDebugger};
pub use script::ScriptDebugger;

// 他のクレートから使用するために再エクスポート
pub use tsunagi_symbols::Symbol;
pub use tsunagi_target::{Signal, StopReason};

/// デバッガの結果型
pub type Result<T> = anyhow::Result<T>;
