//! パース関連のユーティリティ関数

use anyhow::Result;

/// ブレークポイント位置の指定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// 絶対アドレス
    Address(u64),
    /// シンボル名
    Symbol(String),
}

/// アドレス文字列をu64にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use tsunagi_core::parse::parse_address;
///
/// assert_eq!(parse_address("0x1234").unwrap(), 0x1234);
/// assert_eq!(parse_address("1234").unwrap(), 1234);
/// ```
pub fn parse_address(s: &str) -> Result<u64> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid hexadecimal address '{}': {}", s, e))
    } else {
        s.parse::<u64>()
            .map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
    }
}

/// `break` の引数を解釈する
///
/// `0x` で始まるか数字だけならアドレス、それ以外はシンボル名として扱います。
pub fn parse_location(s: &str) -> Result<Location> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow::anyhow!("Missing breakpoint location"));
    }
    if s.starts_with("0x") || s.starts_with("0X") || s.chars().all(|c| c.is_ascii_digit()) {
        parse_address(s).map(Location::Address)
    } else {
        Ok(Location::Symbol(s.to_string()))
    }
}
