//! 子プロセスをptraceで制御するデバッガ

use crate::command_loop::{Debugger, Flow};
use crate::parse::{parse_location, Location};
use crate::{errors, BreakpointManager, Command, DebuggeeFailure, Outcome, Result};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tsunagi_symbols::{ElfImage, Symbol, SymbolResolver};
use tsunagi_target::{Memory, Process, Registers, Signal, StopReason};

/// 起動済みの子プロセスとそのアクセサ
struct Inferior {
    process: Process,
    memory: Memory,
    registers: Registers,
    /// PIEの場合のロードベース（非PIEなら0）
    load_base: u64,
}

/// 実行可能ファイルを子プロセスとして起動し、ptraceで制御するデバッガ
///
/// プロセスは最初に実行が必要なコマンドを受け取るまで起動しません。
/// そのため、標準入出力をリダイレクトした後にコマンドループを始めれば、
/// 子プロセスはリダイレクト先をそのまま継承します。
pub struct ProgramDebugger {
    program: PathBuf,
    args: Vec<String>,
    resolver: Option<SymbolResolver>,
    inferior: Option<Inferior>,
    breakpoints: BreakpointManager,
    /// 次の再開時に配送するシグナル
    pending_signal: Option<Signal>,
    /// 一度でも起動したか（終了後の再起動はしない）
    started: bool,
}

impl ProgramDebugger {
    /// デバッガを作成する
    ///
    /// シンボルテーブルが読めない場合でも、アドレス指定のデバッグはできるように続行します。
    pub fn new<P: AsRef<Path>>(program: P, args: Vec<String>) -> Self {
        let program = program.as_ref().to_path_buf();
        let resolver = match ElfImage::load(&program) {
            Ok(image) => Some(SymbolResolver::new(&image)),
            Err(e) => {
                tracing::warn!(program = %program.display(), error = %e, "symbols unavailable");
                None
            }
        };

        Self {
            program,
            args,
            resolver,
            inferior: None,
            breakpoints: BreakpointManager::new(),
            pending_signal: None,
            started: false,
        }
    }

    /// デバッグ対象のパス
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// 子プロセスが起動中か
    pub fn is_running(&self) -> bool {
        self.inferior.is_some()
    }

    /// 必要ならプロセスを起動する
    fn ensure_started(&mut self, output: &mut dyn Write) -> Result<&mut Inferior> {
        if self.inferior.is_none() {
            if self.started {
                return Err(anyhow::anyhow!(errors::ERR_NOT_RUNNING));
            }
            self.started = true;
            output.flush()?;

            let process = Process::spawn(&self.program, &self.args)?;
            let pid = process.pid();
            let memory = Memory::new(pid);
            let load_base = match &self.resolver {
                Some(resolver) if resolver.is_pie() => memory.get_base_address()? as u64,
                _ => 0,
            };
            writeln!(output, "Started {} (pid {})", self.program.display(), pid)?;
            tracing::info!(pid, program = %self.program.display(), "debuggee started");

            self.inferior = Some(Inferior {
                process,
                memory,
                registers: Registers::new(pid),
                load_base,
            });
        }
        self.inferior
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))
    }

    fn running(&self) -> Result<&Inferior> {
        self.inferior
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))
    }

    /// 実行時アドレスを含むシンボルを探す
    fn symbol_at(&self, pc: u64) -> Option<&Symbol> {
        let base = self.inferior.as_ref().map_or(0, |i| i.load_base);
        self.resolver.as_ref()?.reverse_resolve(pc.checked_sub(base)?)
    }

    fn describe(&self, pc: u64) -> String {
        match self.symbol_at(pc) {
            Some(sym) => {
                let base = self.inferior.as_ref().map_or(0, |i| i.load_base);
                let offset = pc - base - sym.address;
                format!("0x{:x} in {}+{}", pc, sym.display_name(), offset)
            }
            None => format!("0x{:x}", pc),
        }
    }

    fn handle_break(&mut self, loc: &str, output: &mut dyn Write) -> Result<()> {
        let location = parse_location(loc)?;
        let inferior = self.ensure_started(output)?;
        let load_base = inferior.load_base;

        let address = match &location {
            Location::Address(addr) => *addr,
            Location::Symbol(name) => {
                let offset = self
                    .resolver
                    .as_ref()
                    .and_then(|r| r.resolve(name))
                    .ok_or_else(|| anyhow::anyhow!("{}: {}", errors::ERR_SYMBOL_NOT_FOUND, name))?;
                load_base + offset
            }
        };

        let inferior = self
            .inferior
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))?;
        let memory = &inferior.memory;
        let id = self.breakpoints.add_and_enable(address, loc.trim(), memory)?;
        writeln!(output, "Breakpoint {} at {}", id, self.describe(address))?;
        Ok(())
    }

    fn handle_delete(&mut self, id: usize, output: &mut dyn Write) -> Result<()> {
        let inferior = self
            .inferior
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))?;
        let memory = &inferior.memory;
        let bp = self.breakpoints.remove_and_disable(id, memory)?;
        writeln!(output, "Deleted breakpoint {} at 0x{:x}", bp.id, bp.address)?;
        Ok(())
    }

    fn print_breakpoints(&self, output: &mut dyn Write) -> Result<()> {
        if self.breakpoints.count() == 0 {
            writeln!(output, "No breakpoints")?;
            return Ok(());
        }
        writeln!(output, "Num  Address            Hits  Where")?;
        for bp in self.breakpoints.all() {
            writeln!(output, "{:<4} 0x{:016x} {:<5} {}", bp.id, bp.address, bp.hits, bp.location)?;
        }
        Ok(())
    }

    /// 再開する。ブレークポイント上にいる場合は元の命令を1ステップ実行してから進む
    fn resume(&mut self, single_step: bool, output: &mut dyn Write) -> Result<Flow> {
        self.ensure_started(output)?;
        output.flush()?;

        let signal = self.pending_signal.take();
        let Self {
            inferior,
            breakpoints,
            ..
        } = self;
        let inferior = inferior
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!(errors::ERR_NOT_RUNNING))?;

        let pc = inferior.registers.get_pc()?;
        let reason = if breakpoints.find_by_address(pc).is_some() {
            let Inferior { process, memory, .. } = inferior;
            let stepped = breakpoints.with_disabled_at(pc, memory, || process.step(signal))?;
            if single_step || stepped != StopReason::Step {
                stepped
            } else {
                process.continue_and_wait(None)?
            }
        } else if single_step {
            inferior.process.step(signal)?
        } else {
            inferior.process.continue_and_wait(signal)?
        };

        self.report_stop(reason, output)
    }

    /// 停止理由を表示し、ループを続けるかどうかを返す
    fn report_stop(&mut self, reason: StopReason, output: &mut dyn Write) -> Result<Flow> {
        match reason {
            StopReason::Breakpoint => {
                let inferior = self.running()?;
                let pc = inferior.registers.get_pc()?;
                // INT3実行後のPCは1バイト先を指している
                let hit_address = pc.wrapping_sub(1);
                if let Some(id) = self.breakpoints.find_by_address(hit_address).map(|bp| bp.id) {
                    inferior.registers.set_pc(hit_address)?;
                    self.breakpoints.record_hit(id);
                    writeln!(output, "Breakpoint {}, {}", id, self.describe(hit_address))?;
                } else {
                    writeln!(output, "Program stopped (SIGTRAP) at {}", self.describe(pc))?;
                }
                Ok(Flow::Stay)
            }
            StopReason::Step => {
                let pc = self.running()?.registers.get_pc()?;
                writeln!(output, "{}", self.describe(pc))?;
                Ok(Flow::Stay)
            }
            StopReason::Signal(signal) => {
                self.pending_signal = Some(signal);
                let pc = self.running()?.registers.get_pc()?;
                writeln!(output, "Program received signal {:?} at {}", signal, self.describe(pc))?;
                Ok(Flow::Stay)
            }
            StopReason::Exited(code) => {
                self.inferior = None;
                writeln!(output, "The program exited with status {}", code)?;
                Ok(Flow::Exit(Outcome::Exited(code)))
            }
            StopReason::Terminated(signal) => {
                self.inferior = None;
                writeln!(output, "The program was terminated by signal {:?}", signal)?;
                Ok(Flow::Exit(Outcome::Failed(DebuggeeFailure::Signaled(signal))))
            }
            StopReason::Other => {
                writeln!(output, "Program stopped (unknown reason)")?;
                Ok(Flow::Stay)
            }
        }
    }

    fn handle_where(&mut self, output: &mut dyn Write) -> Result<()> {
        let inferior = self.ensure_started(output)?;
        let pc = inferior.registers.get_pc()?;
        writeln!(output, "> {}", self.describe(pc))?;
        Ok(())
    }

    fn handle_registers(&mut self, output: &mut dyn Write) -> Result<()> {
        let inferior = self.ensure_started(output)?;
        for (name, value) in inferior.registers.snapshot()?.values {
            writeln!(output, "{:<7} 0x{:016x}", name, value)?;
        }
        Ok(())
    }

    fn handle_find(&self, pattern: &str, output: &mut dyn Write) -> Result<()> {
        let symbols = self
            .resolver
            .as_ref()
            .map(|r| r.find_symbols(pattern))
            .unwrap_or_default();
        print_symbol_list(output, &format!("Symbols matching '{}'", pattern), &symbols, 10)
    }

    fn handle_quit(&mut self, output: &mut dyn Write) -> Result<Flow> {
        if let Some(mut inferior) = self.inferior.take() {
            inferior.process.kill()?;
            writeln!(output, "Killed {} (pid {})", self.program.display(), inferior.process.pid())?;
        }
        Ok(Flow::Exit(Outcome::Quit))
    }
}

impl Debugger for ProgramDebugger {
    fn enter(&mut self, output: &mut dyn Write) -> Result<()> {
        writeln!(output, "> {} {}", self.program.display(), self.args.join(" "))?;
        if self.resolver.is_none() {
            writeln!(output, "(no symbols loaded; use addresses for breakpoints)")?;
        }
        Ok(())
    }

    fn execute(&mut self, line: &str, output: &mut dyn Write) -> Result<Flow> {
        let Some(command) = Command::parse(line) else {
            writeln!(output, "*** Unknown command: {}", line)?;
            writeln!(output, "Type 'help' for available commands.")?;
            return Ok(Flow::Stay);
        };

        match command {
            Command::Help => print_help(output)?,
            Command::Quit => return self.handle_quit(output),
            Command::Break(loc) => self.handle_break(&loc, output)?,
            Command::Delete(id) => self.handle_delete(id, output)?,
            Command::Breakpoints => self.print_breakpoints(output)?,
            Command::Continue => return self.resume(false, output),
            Command::Step => return self.resume(true, output),
            Command::Where => self.handle_where(output)?,
            Command::Registers => self.handle_registers(output)?,
            Command::Find(pattern) => self.handle_find(&pattern, output)?,
            Command::Print(_) | Command::Locals => {
                return Err(anyhow::anyhow!("{}: {}", errors::ERR_NOT_AVAILABLE, line))
            }
        }
        Ok(Flow::Stay)
    }
}

/// シンボルリストを表示する
fn print_symbol_list(
    output: &mut dyn Write,
    title: &str,
    symbols: &[&Symbol],
    limit: usize,
) -> Result<()> {
    if symbols.is_empty() {
        writeln!(output, "No {} found", title)?;
        return Ok(());
    }

    writeln!(output, "{} ({} found):", title, symbols.len())?;
    for (i, sym) in symbols.iter().take(limit).enumerate() {
        writeln!(output, "  {}. {} @ 0x{:x}", i + 1, sym.display_name(), sym.address)?;
    }
    if symbols.len() > limit {
        writeln!(output, "  ... and {} more", symbols.len() - limit)?;
    }
    Ok(())
}

fn print_help(output: &mut dyn Write) -> Result<()> {
    writeln!(output, "Available commands:")?;
    writeln!(output)?;
    writeln!(output, "  help (h, ?)        - Show this help message")?;
    writeln!(output, "  quit (q, exit)     - Kill the program and stop debugging")?;
    writeln!(output)?;
    writeln!(output, "Execution:")?;
    writeln!(output, "  continue (c)       - Continue execution")?;
    writeln!(output, "  step (s, si)       - Execute one instruction")?;
    writeln!(output)?;
    writeln!(output, "Breakpoints:")?;
    writeln!(output, "  break (b) <loc>    - Set breakpoint at symbol or address")?;
    writeln!(output, "  delete (d) <num>   - Delete a breakpoint")?;
    writeln!(output, "  breakpoints        - List breakpoints")?;
    writeln!(output)?;
    writeln!(output, "Inspection:")?;
    writeln!(output, "  where (w, bt)      - Show the current instruction")?;
    writeln!(output, "  registers (regs)   - Show general purpose registers")?;
    writeln!(output, "  find <pattern>     - Find symbols matching pattern")?;
    Ok(())
}

/// デバッグ対象のプログラムを探す
///
/// `search_path` が真の場合は、名前を `PATH` の各ディレクトリから探します。
/// そうでなければ、与えられたパスのファイルをそのまま使います。
pub fn resolve_program(name: &str, search_path: bool) -> Result<PathBuf> {
    if !search_path || name.contains('/') {
        let path = PathBuf::from(name);
        if path.is_file() {
            return Ok(path);
        }
        return Err(anyhow::anyhow!("No such file: {}", name));
    }

    let path_var = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| anyhow::anyhow!("'{}' was not found in PATH", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_loop::{run_command_loop, LoopOptions};
    use std::io::Cursor;

    fn drive(debugger: &mut ProgramDebugger, input: &str) -> (Outcome, String) {
        let mut input = Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        let outcome = run_command_loop(debugger, &LoopOptions::default(), &mut input, &mut output);
        (outcome, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_resolve_program_in_path() {
        let sh = resolve_program("sh", true).unwrap();
        assert!(sh.is_file());
        assert!(resolve_program("definitely-not-a-real-program-xyz", true).is_err());
    }

    #[test]
    fn test_resolve_program_by_path() {
        assert!(resolve_program("/bin/sh", false).is_ok());
        assert!(resolve_program("sh-missing", false).is_err());
    }

    #[test]
    fn test_commands_before_start_do_not_spawn() {
        let mut debugger = ProgramDebugger::new("/bin/true", Vec::new());
        let (outcome, output) = drive(&mut debugger, "help\nbreakpoints\nbogus\np x\nquit\n");
        assert!(matches!(outcome, Outcome::Quit));
        assert!(!debugger.is_running());
        assert!(output.contains("Available commands:"));
        assert!(output.contains("No breakpoints"));
        assert!(output.contains("*** Unknown command: bogus"));
        assert!(output.contains("*** Command not available here: p x"));
    }

    #[test]
    fn test_find_without_symbols() {
        let mut debugger = ProgramDebugger::new("/nonexistent/program", Vec::new());
        let (_, output) = drive(&mut debugger, "find main\n");
        assert!(output.contains("(no symbols loaded"));
        assert!(output.contains("No Symbols matching 'main' found"));
    }

    #[test]
    fn test_delete_before_start_is_an_error() {
        let mut debugger = ProgramDebugger::new("/bin/true", Vec::new());
        let mut output = Vec::new();
        let err = debugger.execute("delete 1", &mut output).unwrap_err();
        assert_eq!(err.to_string(), errors::ERR_NOT_RUNNING);
        assert!(!debugger.is_running());
    }

    #[test]
    #[ignore = "requires ptrace permission"]
    fn test_break_and_delete_at_current_pc() {
        let mut debugger = ProgramDebugger::new("/bin/true", Vec::new());
        let mut output = Vec::new();
        debugger.execute("where", &mut output).unwrap();
        let pc = debugger.inferior.as_ref().unwrap().registers.get_pc().unwrap();

        debugger
            .execute(&format!("break 0x{:x}", pc), &mut output)
            .unwrap();
        assert_eq!(debugger.breakpoints.count(), 1);
        debugger.execute("delete 1", &mut output).unwrap();
        assert_eq!(debugger.breakpoints.count(), 0);

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Breakpoint 1 at 0x"));
        assert!(output.contains(&format!("Deleted breakpoint 1 at 0x{:x}", pc)));

        let flow = debugger.execute("continue", &mut Vec::new()).unwrap();
        assert!(matches!(flow, Flow::Exit(Outcome::Exited(0))));
    }

    #[test]
    #[ignore = "requires ptrace permission"]
    fn test_continue_runs_program_to_exit() {
        let mut debugger = ProgramDebugger::new("/bin/true", Vec::new());
        let (outcome, output) = drive(&mut debugger, "continue\n");
        assert!(matches!(outcome, Outcome::Exited(0)));
        assert!(output.contains("The program exited with status 0"));
        assert!(!debugger.is_running());
    }

    #[test]
    #[ignore = "requires ptrace permission"]
    fn test_killed_program_is_a_failure() {
        let mut debugger = ProgramDebugger::new(
            "/bin/sh",
            vec!["-c".to_string(), "kill -9 $$".to_string()],
        );
        let (outcome, _) = drive(&mut debugger, "c\n");
        assert!(matches!(
            outcome,
            Outcome::Failed(DebuggeeFailure::Signaled(Signal::SIGKILL))
        ));
    }
}
