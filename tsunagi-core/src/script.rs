//! インプロセスのスクリプトを実行するデバッガ
//!
//! スクリプトはクロージャとして渡され、`continue` を受け取った時点で呼び出されます。
//! パニックは `catch_unwind` で捕捉し、終了ステータスとともにループの結果として返します。

use crate::command_loop::{Debugger, Flow};
use crate::{errors, Command, DebuggeeFailure, Outcome, Result};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

type Script = Box<dyn FnOnce() -> anyhow::Result<i32>>;

/// スクリプト（終了ステータスを返すクロージャ）を対象とするデバッガ
pub struct ScriptDebugger {
    name: String,
    script: Option<Script>,
}

impl ScriptDebugger {
    pub fn new<F>(name: impl Into<String>, script: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<i32> + 'static,
    {
        Self {
            name: name.into(),
            script: Some(Box::new(script)),
        }
    }

    /// スクリプトを最後まで実行する
    fn run_to_completion(&mut self, output: &mut dyn Write) -> Result<Flow> {
        let script = self
            .script
            .take()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))?;

        tracing::debug!(script = %self.name, "running script to completion");
        output.flush()?;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(script)) {
            Ok(Ok(code)) => {
                writeln!(output, "The program exited with status {}", code)?;
                Outcome::Exited(code)
            }
            Ok(Err(err)) => {
                writeln!(output, "Uncaught error in {}: {:#}", self.name, err)?;
                Outcome::Failed(DebuggeeFailure::Error(err))
            }
            Err(payload) => {
                writeln!(
                    output,
                    "Uncaught panic in {}: {}",
                    self.name,
                    DebuggeeFailure::panic_message(payload.as_ref())
                )?;
                Outcome::Failed(DebuggeeFailure::Panic(payload))
            }
        };
        Ok(Flow::Exit(outcome))
    }
}

impl Debugger for ScriptDebugger {
    fn enter(&mut self, output: &mut dyn Write) -> Result<()> {
        writeln!(output, "> {}: stopped before the first statement", self.name)?;
        Ok(())
    }

    fn execute(&mut self, line: &str, output: &mut dyn Write) -> Result<Flow> {
        let Some(command) = Command::parse(line) else {
            writeln!(output, "*** Unknown command: {}", line)?;
            return Ok(Flow::Stay);
        };

        match command {
            Command::Continue => self.run_to_completion(output),
            Command::Quit => Ok(Flow::Exit(Outcome::Quit)),
            Command::Where => {
                writeln!(output, "> {}: not started", self.name)?;
                Ok(Flow::Stay)
            }
            Command::Help => {
                writeln!(output, "Available commands:")?;
                writeln!(output, "  continue (c)   - Run {} to completion", self.name)?;
                writeln!(output, "  where (w)      - Show the current position")?;
                writeln!(output, "  quit (q)       - Stop without running")?;
                Ok(Flow::Stay)
            }
            _ => Err(anyhow::anyhow!("{}: {}", errors::ERR_NOT_AVAILABLE, line)),
        }
    }
}
