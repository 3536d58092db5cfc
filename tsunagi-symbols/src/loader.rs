//! ELFの読み込み機能

use crate::{Result, Symbol};
use object::{Object, ObjectKind, ObjectSymbol, SymbolKind};
use std::fs;
use std::path::{Path, PathBuf};

/// 読み込み済みのELFイメージ
///
/// ファイルの中身は保持せず、必要な情報だけを取り出して所有します。
#[derive(Debug, Clone)]
pub struct ElfImage {
    path: PathBuf,
    is_pie: bool,
    symbols: Vec<Symbol>,
}

impl ElfImage {
    /// ELFファイルからシンボルテーブルを読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file_data = fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read file {:?}: {}", path, e))?;
        let object_file = object::File::parse(&*file_data)
            .map_err(|e| anyhow::anyhow!("Failed to parse ELF file {:?}: {}", path, e))?;

        // ET_DYN = PIE実行ファイル、ET_EXEC = 非PIE実行ファイル
        let is_pie = matches!(object_file.kind(), ObjectKind::Dynamic);

        let symbols: Vec<Symbol> = object_file
            .symbols()
            .chain(object_file.dynamic_symbols())
            .filter(|sym| sym.kind() == SymbolKind::Text && sym.address() != 0)
            .filter_map(|sym| {
                let name = sym.name().ok()?;
                (!name.is_empty()).then(|| Symbol::new(name.to_string(), sym.address(), sym.size()))
            })
            .collect();

        tracing::debug!(path = %path.display(), count = symbols.len(), is_pie, "loaded symbol table");

        Ok(Self {
            path: path.to_path_buf(),
            is_pie,
            symbols,
        })
    }

    /// 読み込んだファイルのパス
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PIE（Position Independent Executable）かどうか
    ///
    /// PIEの場合、シンボルアドレスはオフセットであり、実行時ベースアドレスを加算する必要があります。
    pub fn is_pie(&self) -> bool {
        self.is_pie
    }

    /// 関数シンボルの一覧
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}
