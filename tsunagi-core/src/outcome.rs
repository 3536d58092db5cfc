//! コマンドループの終了結果

use std::any::Any;
use std::fmt;
use tsunagi_target::Signal;

/// パニックのペイロード（`catch_unwind` が返すもの）
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// コマンドループがどのように終わったか
#[derive(Debug)]
pub enum Outcome {
    /// オペレータがquitした、または入力ストリームが閉じた
    Quit,
    /// オペレータがcontinueし、呼び出し元に実行を戻す
    Continue,
    /// デバッグ対象が最後まで実行され、終了ステータスを返した
    Exited(i32),
    /// デバッグ対象が処理されない失敗で終わった
    Failed(DebuggeeFailure),
}

/// デバッグ対象の処理されない失敗
pub enum DebuggeeFailure {
    /// インプロセスのデバッグ対象がパニックした
    Panic(PanicPayload),
    /// インプロセスのデバッグ対象がエラーを返した
    Error(anyhow::Error),
    /// 子プロセスがシグナルで終了した
    Signaled(Signal),
}

impl DebuggeeFailure {
    /// パニックのペイロードからメッセージを取り出す
    pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
        if let Some(msg) = payload.downcast_ref::<&'static str>() {
            msg
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.as_str()
        } else {
            "Box<dyn Any>"
        }
    }
}

impl fmt::Display for DebuggeeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebuggeeFailure::Panic(payload) => {
                write!(f, "panicked: {}", Self::panic_message(payload.as_ref()))
            }
            DebuggeeFailure::Error(err) => write!(f, "error: {:#}", err),
            DebuggeeFailure::Signaled(signal) => write!(f, "terminated by signal {:?}", signal),
        }
    }
}

impl fmt::Debug for DebuggeeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebuggeeFailure::Panic(payload) => f
                .debug_tuple("Panic")
                .field(&Self::panic_message(payload.as_ref()))
                .finish(),
            DebuggeeFailure::Error(err) => f.debug_tuple("Error").field(err).finish(),
            DebuggeeFailure::Signaled(signal) => f.debug_tuple("Signaled").field(signal).finish(),
        }
    }
}
