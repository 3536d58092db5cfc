//! ブレークポイント機能

use crate::{Memory, Result};

/// INT3命令のオペコード
pub const INT3_OPCODE: u8 = 0xCC;

/// ソフトウェアブレークポイント（INT3命令）
#[derive(Debug)]
pub struct SoftwareBreakpoint {
    address: u64,
    original_byte: u8,
    enabled: bool,
}

impl SoftwareBreakpoint {
    /// ブレークポイントを作成する
    pub fn new(address: u64) -> Self {
        Self {
            address,
            original_byte: 0,
            enabled: false,
        }
    }

    /// ブレークポイントのアドレスを取得する
    pub fn address(&self) -> u64 {
        self.address
    }

    /// ブレークポイントが有効かどうか
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 元のバイトを取得する
    pub fn original_byte(&self) -> u8 {
        self.original_byte
    }

    /// 指定されたアドレスの命令を0xCC（INT3）で置き換える
    pub fn enable(&mut self, memory: &Memory) -> Result<()> {
        if self.enabled {
            return Ok(());
        }

        self.original_byte = memory.read_u8(self.address as usize)?;
        memory.write_u8(self.address as usize, INT3_OPCODE)?;

        self.enabled = true;
        Ok(())
    }

    /// INT3命令を元のバイトで置き換える
    pub fn disable(&mut self, memory: &Memory) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        memory.write_u8(self.address as usize, self.original_byte)?;

        self.enabled = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_saves_original_byte() {
        let buffer = vec![0x48u8, 0x89, 0xe5];
        let memory = Memory::new(std::process::id() as i32);
        let mut bp = SoftwareBreakpoint::new(buffer.as_ptr() as u64 + 1);
        assert!(!bp.is_enabled());

        bp.enable(&memory).unwrap();
        assert!(bp.is_enabled());
        assert_eq!(bp.original_byte(), 0x89);
        assert_eq!(memory.read(buffer.as_ptr() as usize, 3).unwrap(), vec![0x48, INT3_OPCODE, 0xe5]);

        // 二重に有効化しても元のバイトは上書きされない
        bp.enable(&memory).unwrap();
        assert_eq!(bp.original_byte(), 0x89);

        bp.disable(&memory).unwrap();
        assert!(!bp.is_enabled());
        assert_eq!(memory.read(bp.address() as usize - 1, 3).unwrap(), vec![0x48, 0x89, 0xe5]);
    }
}
