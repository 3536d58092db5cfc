//! エラーメッセージ定数

/// プログラムがまだ起動していない、またはすでに終了している場合のエラーメッセージ
pub const ERR_NOT_RUNNING: &str = "The program is not being run";

/// シンボルが見つからない場合のエラーメッセージ
pub const ERR_SYMBOL_NOT_FOUND: &str = "Symbol not found";

/// ブレークポイントが見つからない場合のエラーメッセージ
pub const ERR_BREAKPOINT_NOT_FOUND: &str = "Breakpoint not found";

/// このデバッガで使えないコマンドを受け取った場合のエラーメッセージ
pub const ERR_NOT_AVAILABLE: &str = "Command not available here";
