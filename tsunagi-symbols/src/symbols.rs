//! シンボル解決機能

use crate::ElfImage;
use std::collections::HashMap;

/// シンボル情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// マングルされたシンボル名
    pub name: String,
    /// デマングルされたシンボル名
    pub demangled_name: String,
    pub address: u64,
    pub size: u64,
}

impl Symbol {
    /// シンボルを作成し、デマングルされた名前を設定する
    pub fn new(name: String, address: u64, size: u64) -> Self {
        let demangled_name = demangle_symbol(&name);
        Self {
            name,
            demangled_name,
            address,
            size,
        }
    }

    /// 表示用の名前
    pub fn display_name(&self) -> &str {
        &self.demangled_name
    }
}

/// Rustのシンボルをデマングルする（失敗したらそのまま返す）
fn demangle_symbol(name: &str) -> String {
    match rustc_demangle::try_demangle(name) {
        Ok(demangled) => format!("{:#}", demangled),
        Err(_) => name.to_string(),
    }
}

/// シンボル解決
pub struct SymbolResolver {
    /// マングル名とデマングル名の両方 -> シンボル
    by_name: HashMap<String, Symbol>,
    /// アドレスでソート済み
    by_address: Vec<Symbol>,
    is_pie: bool,
}

impl SymbolResolver {
    /// ELFイメージからシンボル解決を作成する
    pub fn new(image: &ElfImage) -> Self {
        Self::from_symbols(image.symbols().to_vec(), image.is_pie())
    }

    /// シンボル一覧から直接作成する
    pub fn from_symbols(symbols: Vec<Symbol>, is_pie: bool) -> Self {
        let mut by_name = HashMap::new();
        for sym in &symbols {
            by_name.entry(sym.name.clone()).or_insert_with(|| sym.clone());
            by_name
                .entry(sym.demangled_name.clone())
                .or_insert_with(|| sym.clone());
        }

        let mut by_address = symbols;
        by_address.sort_by_key(|s| s.address);

        Self {
            by_name,
            by_address,
            is_pie,
        }
    }

    /// PIEかどうか
    pub fn is_pie(&self) -> bool {
        self.is_pie
    }

    /// シンボル名（マングル名またはデマングル名）からアドレスを解決する
    pub fn resolve(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).map(|s| s.address)
    }

    /// アドレスを含むシンボルを解決する
    pub fn reverse_resolve(&self, addr: u64) -> Option<&Symbol> {
        let idx = match self.by_address.binary_search_by_key(&addr, |s| s.address) {
            Ok(idx) => return self.by_address.get(idx),
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let sym = &self.by_address[idx];
        // サイズ情報がない場合は直前のシンボルを採用する
        if sym.size == 0 || addr < sym.address + sym.size {
            Some(sym)
        } else {
            None
        }
    }

    /// パターンを含むシンボルをアドレス順に返す
    pub fn find_symbols(&self, pattern: &str) -> Vec<&Symbol> {
        self.by_address
            .iter()
            .filter(|s| s.name.contains(pattern) || s.demangled_name.contains(pattern))
            .collect()
    }

    /// すべてのシンボル
    pub fn all_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.by_address.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SymbolResolver {
        SymbolResolver::from_symbols(
            vec![
                Symbol::new("main".to_string(), 0x2000, 0x40),
                Symbol::new("_ZN4demo3run17h0123456789abcdefE".to_string(), 0x1000, 0x100),
                Symbol::new("_start".to_string(), 0x3000, 0),
            ],
            true,
        )
    }

    #[test]
    fn test_resolve_by_mangled_and_demangled_name() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("main"), Some(0x2000));
        assert_eq!(resolver.resolve("demo::run"), Some(0x1000));
        assert_eq!(resolver.resolve("_ZN4demo3run17h0123456789abcdefE"), Some(0x1000));
        assert_eq!(resolver.resolve("missing"), None);
        assert!(resolver.is_pie());
    }

    #[test]
    fn test_reverse_resolve() {
        let resolver = resolver();
        assert_eq!(resolver.reverse_resolve(0x1000).unwrap().display_name(), "demo::run");
        assert_eq!(resolver.reverse_resolve(0x1080).unwrap().display_name(), "demo::run");
        // sizeの外側
        assert!(resolver.reverse_resolve(0x1800).is_none());
        assert!(resolver.reverse_resolve(0x10).is_none());
        // サイズ0のシンボルは直後のアドレスも含む
        assert_eq!(resolver.reverse_resolve(0x3010).unwrap().name, "_start");
    }

    #[test]
    fn test_find_symbols_sorted() {
        let resolver = resolver();
        let found = resolver.find_symbols("n");
        let names: Vec<&str> = found.iter().map(|s| s.display_name()).collect();
        assert_eq!(names, vec!["demo::run", "main"]);
        assert_eq!(resolver.find_symbols("run").len(), 1);
    }
}
