//! デバッガコマンド

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(String),
    /// ブレークポイントを削除
    Delete(usize),
    /// ブレークポイント一覧
    Breakpoints,
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// 現在位置の表示
    Where,
    /// レジスタ表示
    Registers,
    /// シンボル検索
    Find(String),
    /// 値の表示
    Print(String),
    /// ローカル変数表示
    Locals,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    pub fn parse(input: &str) -> Option<Self> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let (&head, rest) = parts.split_first()?;

        match head {
            "break" | "b" if !rest.is_empty() => Some(Command::Break(rest.join(" "))),
            "delete" | "d" => match rest {
                [id] => id.parse().ok().map(Command::Delete),
                _ => None,
            },
            "breakpoints" => Some(Command::Breakpoints),
            "info" => match rest.first().copied() {
                Some("breakpoints") | Some("break") | Some("b") => Some(Command::Breakpoints),
                Some("registers") | Some("reg") | Some("r") => Some(Command::Registers),
                _ => None,
            },
            "continue" | "cont" | "c" => Some(Command::Continue),
            "step" | "s" | "stepi" | "si" => Some(Command::Step),
            "where" | "w" | "backtrace" | "bt" => Some(Command::Where),
            "registers" | "regs" => Some(Command::Registers),
            "find" if !rest.is_empty() => Some(Command::Find(rest.join(" "))),
            "print" | "p" if !rest.is_empty() => Some(Command::Print(rest.join(" "))),
            "locals" | "l" => Some(Command::Locals),
            "help" | "h" | "?" => Some(Command::Help),
            "quit" | "q" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}
