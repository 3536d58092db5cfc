//! ブレークポイント管理

use crate::{errors, Result};
use std::collections::BTreeMap;
use tsunagi_target::{Memory, SoftwareBreakpoint};

/// ブレークポイントID
pub type BreakpointId = usize;

/// ブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub address: u64,
    /// ユーザーが指定した位置（シンボル名など）
    pub location: String,
    pub hits: usize,
}

/// ブレークポイントマネージャ
///
/// 論理的なブレークポイント情報とソフトウェアブレークポイント（INT3）を
/// 一緒に管理します。IDは1から振られ、再利用されません。
pub struct BreakpointManager {
    breakpoints: BTreeMap<BreakpointId, (Breakpoint, SoftwareBreakpoint)>,
    next_id: BreakpointId,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self {
            breakpoints: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// ブレークポイントを追加し、有効化する
    pub fn add_and_enable(
        &mut self,
        address: u64,
        location: impl Into<String>,
        memory: &Memory,
    ) -> Result<BreakpointId> {
        if let Some(existing) = self.find_by_address(address) {
            return Ok(existing.id);
        }

        let mut sw_bp = SoftwareBreakpoint::new(address);
        sw_bp.enable(memory)?;

        let id = self.next_id;
        self.next_id += 1;
        let bp = Breakpoint {
            id,
            address,
            location: location.into(),
            hits: 0,
        };
        self.breakpoints.insert(id, (bp, sw_bp));
        Ok(id)
    }

    /// ブレークポイントを削除し、無効化する
    pub fn remove_and_disable(&mut self, id: BreakpointId, memory: &Memory) -> Result<Breakpoint> {
        let (bp, mut sw_bp) = self
            .breakpoints
            .remove(&id)
            .ok_or_else(|| anyhow::anyhow!("{}: {}", errors::ERR_BREAKPOINT_NOT_FOUND, id))?;
        sw_bp.disable(memory)?;
        Ok(bp)
    }

    /// アドレスからブレークポイントを探す
    pub fn find_by_address(&self, address: u64) -> Option<&Breakpoint> {
        self.breakpoints
            .values()
            .map(|(bp, _)| bp)
            .find(|bp| bp.address == address)
    }

    /// ヒット回数を記録する
    pub fn record_hit(&mut self, id: BreakpointId) -> Option<&Breakpoint> {
        let (bp, _) = self.breakpoints.get_mut(&id)?;
        bp.hits += 1;
        Some(bp)
    }

    /// 指定アドレスのINT3を一時的に外した状態で `f` を実行する
    ///
    /// ブレークポイント上から再開する際、元の命令を1ステップ実行するために使います。
    pub fn with_disabled_at<T>(
        &mut self,
        address: u64,
        memory: &Memory,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let Some((_, sw_bp)) = self
            .breakpoints
            .values_mut()
            .find(|(bp, _)| bp.address == address)
        else {
            return f();
        };

        sw_bp.disable(memory)?;
        let result = f();
        // プロセスが終了していたら書き戻せないので、そのエラーは無視する
        if let Err(e) = sw_bp.enable(memory) {
            tracing::debug!(address, error = %e, "could not re-arm breakpoint");
        }
        result
    }

    /// 全てのブレークポイントをID順に取得する
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values().map(|(bp, _)| bp)
    }

    pub fn count(&self) -> usize {
        self.breakpoints.len()
    }
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self::new()
    }
}
