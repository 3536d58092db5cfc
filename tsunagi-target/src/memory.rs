//! メモリアクセス機能

use crate::Result;
use nix::unistd::Pid;
use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Seek, SeekFrom, Write as _};

/// EIO (errno 5)
const EIO: i32 = 5;

/// メモリマッピング情報（/proc/pid/maps の1行）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMapping {
    pub start: usize,
    pub end: usize,
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    /// マッピングのファイルオフセット
    pub offset: usize,
    /// マッピング元のパス（匿名マッピングならNone）
    pub pathname: Option<String>,
}

impl MemoryMapping {
    /// /proc/pid/maps の1行をパースする
    ///
    /// フォーマット: "address perms offset dev inode pathname"
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let range = parts.next()?;
        let perms = parts.next()?;
        let offset = parts.next()?;
        // dev, inode
        let _ = parts.next();
        let _ = parts.next();
        let pathname = parts.next().map(str::to_string);

        let (start, end) = range.split_once('-')?;
        let perms = perms.as_bytes();

        Some(Self {
            start: usize::from_str_radix(start, 16).ok()?,
            end: usize::from_str_radix(end, 16).ok()?,
            readable: perms.first() == Some(&b'r'),
            writable: perms.get(1) == Some(&b'w'),
            executable: perms.get(2) == Some(&b'x'),
            offset: usize::from_str_radix(offset, 16).ok()?,
            pathname,
        })
    }

    /// アドレスがこのマッピングに含まれるか
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// メモリアクセス
pub struct Memory {
    pid: Pid,
}

impl Memory {
    /// メモリアクセスを作成する
    pub fn new(pid: i32) -> Self {
        Self {
            pid: Pid::from_raw(pid),
        }
    }

    fn mem_path(&self) -> String {
        format!("/proc/{}/mem", self.pid)
    }

    /// メモリからデータを読み取る
    ///
    /// /proc/pid/mem が EIO を返した場合は PTRACE_PEEKDATA にフォールバックします。
    pub fn read(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        match self.read_via_proc_mem(addr, size) {
            Ok(data) => Ok(data),
            Err(e) if e.raw_os_error() == Some(EIO) => self.read_via_ptrace(addr, size),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read {} bytes at 0x{:x}: {}",
                size,
                addr,
                e
            )),
        }
    }

    fn read_via_proc_mem(&self, addr: usize, size: usize) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(self.mem_path())?;
        file.seek(SeekFrom::Start(addr as u64))?;
        let mut buffer = vec![0u8; size];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// メモリにデータを書き込む
    ///
    /// 実行中のテキストセグメントへの書き込みも /proc/pid/mem 経由なら許可されます。
    pub fn write(&self, addr: usize, data: &[u8]) -> Result<()> {
        let mem_path = self.mem_path();
        let mut file = OpenOptions::new()
            .write(true)
            .open(&mem_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {} for writing: {}", mem_path, e))?;

        file.seek(SeekFrom::Start(addr as u64))
            .map_err(|e| anyhow::anyhow!("Failed to seek to address 0x{:x}: {}", addr, e))?;
        file.write_all(data)
            .map_err(|e| anyhow::anyhow!("Failed to write {} bytes to 0x{:x}: {}", data.len(), addr, e))?;

        Ok(())
    }

    /// u8値を読み取る
    pub fn read_u8(&self, addr: usize) -> Result<u8> {
        let bytes = self.read(addr, 1)?;
        bytes
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Cannot read u8 from empty bytes"))
    }

    /// u8値を書き込む
    pub fn write_u8(&self, addr: usize, value: u8) -> Result<()> {
        self.write(addr, &[value])
    }

    /// u64値を読み取る（リトルエンディアン）
    pub fn read_u64(&self, addr: usize) -> Result<u64> {
        let bytes = self.read(addr, 8)?;
        let array: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("Failed to convert {} bytes to u64 array (expected 8 bytes)", bytes.len())
        })?;
        Ok(u64::from_le_bytes(array))
    }

    /// /proc/pid/maps を解析してメモリマッピング情報を取得する
    pub fn get_mappings(&self) -> Result<Vec<MemoryMapping>> {
        let maps_path = format!("/proc/{}/maps", self.pid);
        let content = fs::read_to_string(&maps_path)
            .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", maps_path, e))?;
        Ok(content.lines().filter_map(MemoryMapping::parse).collect())
    }

    /// 指定されたアドレスが有効なメモリマッピング内にあるかチェックする
    pub fn is_mapped(&self, addr: usize) -> Result<bool> {
        Ok(self.get_mappings()?.iter().any(|m| m.contains(addr)))
    }

    /// 実行可能ファイルのロードベースアドレスを取得する
    ///
    /// PIEの場合、シンボルアドレスはロードベースからのオフセットです。
    /// 最初の実行可能セグメントの開始アドレスからファイルオフセットを引いた値を返します。
    pub fn get_base_address(&self) -> Result<usize> {
        base_address(&self.get_mappings()?)
            .ok_or_else(|| anyhow::anyhow!("Could not find executable segment in memory mappings"))
    }

    /// PTRACE_PEEKDATAを使用してメモリからデータを読み取る
    pub fn read_via_ptrace(&self, addr: usize, size: usize) -> Result<Vec<u8>> {
        use nix::sys::ptrace;

        let mut data = Vec::with_capacity(size);
        let word_size = std::mem::size_of::<usize>();

        for offset in (0..size).step_by(word_size) {
            let word_addr = (addr + offset) as ptrace::AddressType;
            let word = ptrace::read(self.pid, word_addr)
                .map_err(|e| anyhow::anyhow!("Failed to read via ptrace at 0x{:x}: {}", addr + offset, e))?;
            let remaining = size - offset;
            data.extend_from_slice(&word.to_ne_bytes()[..remaining.min(word_size)]);
        }

        Ok(data)
    }
}

/// マッピング一覧からロードベースアドレスを求める
fn base_address(mappings: &[MemoryMapping]) -> Option<usize> {
    mappings
        .iter()
        .find(|m| m.executable)
        .map(|m| m.start - m.offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mapping_with_path() {
        let line = "55d0c0a00000-55d0c0a21000 r-xp 00001000 08:01 123456 /usr/bin/true";
        let mapping = MemoryMapping::parse(line).unwrap();
        assert_eq!(mapping.start, 0x55d0c0a00000);
        assert_eq!(mapping.end, 0x55d0c0a21000);
        assert!(mapping.readable);
        assert!(!mapping.writable);
        assert!(mapping.executable);
        assert_eq!(mapping.offset, 0x1000);
        assert_eq!(mapping.pathname.as_deref(), Some("/usr/bin/true"));
    }

    #[test]
    fn test_parse_anonymous_mapping() {
        let line = "7ffd1c000000-7ffd1c021000 rw-p 00000000 00:00 0";
        let mapping = MemoryMapping::parse(line).unwrap();
        assert!(mapping.writable);
        assert!(!mapping.executable);
        assert_eq!(mapping.pathname, None);
        assert!(mapping.contains(0x7ffd1c000010));
        assert!(!mapping.contains(0x7ffd1c021000));
    }

    #[test]
    fn test_parse_mapping_invalid() {
        assert!(MemoryMapping::parse("").is_none());
        assert!(MemoryMapping::parse("zzzz r-xp 0 0 0").is_none());
    }

    #[test]
    fn test_base_address_subtracts_offset() {
        let mappings: Vec<MemoryMapping> = [
            "555555554000-555555555000 r--p 00000000 08:01 1 /tmp/prog",
            "555555555000-555555556000 r-xp 00001000 08:01 1 /tmp/prog",
        ]
        .iter()
        .filter_map(|l| MemoryMapping::parse(l))
        .collect();
        assert_eq!(base_address(&mappings), Some(0x555555554000));
    }

    #[test]
    fn test_self_mappings_are_readable() {
        let memory = Memory::new(std::process::id() as i32);
        let mappings = memory.get_mappings().unwrap();
        assert!(mappings.iter().any(|m| m.executable));
    }
}
