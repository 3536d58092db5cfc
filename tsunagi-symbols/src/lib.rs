//! Tsunagi シンボル解析
//!
//! ELFファイルのシンボルテーブルを読み込み、シンボル名とアドレスの相互変換を行います。

pub mod loader;
pub mod symbols;

pub use loader::ElfImage;
pub use symbols::{Symbol, SymbolResolver};

/// シンボル解析の結果型
pub type Result<T> = anyhow::Result<T>;
