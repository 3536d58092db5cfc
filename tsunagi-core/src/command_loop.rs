//! 行単位のコマンドループ
//!
//! デバッガ本体は [`Debugger`] トレイトの背後に隠し、ループ側は入力ストリームから
//! 1行ずつ読んで実行し、出力ストリームに書き戻すことだけを担当します。
//! 入出力がローカル端末でもソケットでも同じように動きます。

use crate::{Outcome, Result};
use std::io::{BufRead, Write};

/// コマンド1つを実行した後の制御
#[derive(Debug)]
pub enum Flow {
    /// 次のコマンドを待つ
    Stay,
    /// ループを終了する
    Exit(Outcome),
}

/// コマンドループから駆動されるデバッガ
pub trait Debugger {
    /// ループ開始時に呼ばれる（現在位置の表示など）
    fn enter(&mut self, _output: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    /// 1行分のコマンドを実行する
    fn execute(&mut self, line: &str, output: &mut dyn Write) -> Result<Flow>;
}

impl<D: Debugger + ?Sized> Debugger for Box<D> {
    fn enter(&mut self, output: &mut dyn Write) -> Result<()> {
        (**self).enter(output)
    }

    fn execute(&mut self, line: &str, output: &mut dyn Write) -> Result<Flow> {
        (**self).execute(line, output)
    }
}

/// コマンドループの設定
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// 各コマンドの前に表示するプロンプト
    pub prompt: String,
    /// 入力を読む前に実行するコマンド
    pub commands: Vec<String>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            prompt: "(tsunagi) ".to_string(),
            commands: Vec::new(),
        }
    }
}

impl LoopOptions {
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_commands(mut self, commands: Vec<String>) -> Self {
        self.commands = commands;
        self
    }
}

/// コマンドループを実行する
///
/// 入力の終端、または入出力エラーは暗黙のquitとして扱い、`Outcome::Quit` を返します。
/// 空行は直前のコマンドを繰り返します。
pub fn run_command_loop<D: Debugger + ?Sized>(
    debugger: &mut D,
    options: &LoopOptions,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Outcome {
    if let Err(e) = debugger.enter(output) {
        let _ = writeln!(output, "*** {:#}", e);
    }

    for command in &options.commands {
        let _ = writeln!(output, "{}{}", options.prompt, command);
        if let Some(outcome) = dispatch(debugger, command, output) {
            return outcome;
        }
    }

    let mut last_command = String::new();
    let mut line = String::new();
    loop {
        if output
            .write_all(options.prompt.as_bytes())
            .and_then(|_| output.flush())
            .is_err()
        {
            tracing::debug!("command stream closed while writing prompt");
            return Outcome::Quit;
        }

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => {
                tracing::debug!("command stream reached end of input");
                return Outcome::Quit;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "command stream read failed");
                return Outcome::Quit;
            }
        }

        let command = line.trim_end_matches(['\r', '\n']).trim();
        let command = if command.is_empty() {
            if last_command.is_empty() {
                continue;
            }
            last_command.clone()
        } else {
            last_command = command.to_string();
            last_command.clone()
        };

        if let Some(outcome) = dispatch(debugger, &command, output) {
            return outcome;
        }
    }
}

/// コマンドを1つ実行し、ループを抜ける場合は結果を返す
fn dispatch<D: Debugger + ?Sized>(
    debugger: &mut D,
    command: &str,
    output: &mut dyn Write,
) -> Option<Outcome> {
    tracing::debug!(command, "executing debugger command");
    let result = debugger.execute(command, output);
    let _ = output.flush();
    match result {
        Ok(Flow::Stay) => None,
        Ok(Flow::Exit(outcome)) => Some(outcome),
        Err(e) => {
            let _ = writeln!(output, "*** {:#}", e);
            None
        }
    }
}
