//! ソース位置でのブレーク（インプロセス）

use crate::command_loop::{Debugger, Flow};
use crate::{errors, Command, Outcome, Result};
use std::backtrace::Backtrace;
use std::fmt;
use std::io::Write;
use std::panic::Location;

/// ブレークした位置と、呼び出し側が渡したローカル値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub module: Option<String>,
    /// (変数名, `{:#?}` で整形した値)
    pub locals: Vec<(String, String)>,
}

impl Frame {
    /// 呼び出し元の位置からフレームを作る
    #[track_caller]
    pub fn caller() -> Self {
        Self::from_location(Location::caller())
    }

    pub fn from_location(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            module: None,
            locals: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// ローカル値を追加する
    pub fn with_local(mut self, name: impl Into<String>, value: &dyn fmt::Debug) -> Self {
        self.locals.push((name.into(), format!("{:#?}", value)));
        self
    }

    /// 名前でローカル値を探す
    pub fn local(&self, name: &str) -> Option<&str> {
        self.locals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}:{})", self.file, self.line, self.column)?;
        if let Some(module) = &self.module {
            write!(f, " in {}", module)?;
        }
        Ok(())
    }
}

/// ソース位置で止まったスレッドを操作するデバッガ
///
/// `continue` で呼び出し元に実行を戻し、`quit` でデバッグを打ち切ります。
pub struct FrameDebugger {
    frame: Frame,
}

impl FrameDebugger {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    fn print_locals(&self, output: &mut dyn Write) -> Result<()> {
        if self.frame.locals.is_empty() {
            writeln!(output, "No locals captured at this breakpoint")?;
        }
        for (name, value) in &self.frame.locals {
            writeln!(output, "{} = {}", name, value)?;
        }
        Ok(())
    }
}

impl Debugger for FrameDebugger {
    fn enter(&mut self, output: &mut dyn Write) -> Result<()> {
        writeln!(output, "> {}", self.frame)?;
        Ok(())
    }

    fn execute(&mut self, line: &str, output: &mut dyn Write) -> Result<Flow> {
        let Some(command) = Command::parse(line) else {
            writeln!(output, "*** Unknown command: {}", line)?;
            return Ok(Flow::Stay);
        };

        match command {
            Command::Continue => return Ok(Flow::Exit(Outcome::Continue)),
            Command::Quit => return Ok(Flow::Exit(Outcome::Quit)),
            Command::Where => {
                writeln!(output, "> {}", self.frame)?;
                writeln!(output, "{}", Backtrace::force_capture())?;
            }
            Command::Print(name) => match self.frame.local(&name) {
                Some(value) => writeln!(output, "{}", value)?,
                None => writeln!(output, "*** NameError: name '{}' is not defined", name)?,
            },
            Command::Locals => self.print_locals(output)?,
            Command::Help => print_help(output)?,
            _ => return Err(anyhow::anyhow!("{}: {}", errors::ERR_NOT_AVAILABLE, line)),
        }
        Ok(Flow::Stay)
    }
}

fn print_help(output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Available commands:")?;
    writeln!(output, "  continue (c)   - Resume execution of the caller")?;
    writeln!(output, "  where (w, bt)  - Show the breakpoint location and a backtrace")?;
    writeln!(output, "  print (p) <n>  - Print a captured local value")?;
    writeln!(output, "  locals (l)     - Print all captured local values")?;
    writeln!(output, "  help (h, ?)    - Show this help message")?;
    writeln!(output, "  quit (q)       - Stop debugging")?;
    Ok(())
}
