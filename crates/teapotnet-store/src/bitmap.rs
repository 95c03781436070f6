//! Sidecar presence bitmap for a block file (`spec.md` §6 "Block file
//! layout"): one bit per block, LSB-first within each byte, the file
//! grown in 4 KiB chunks as blocks beyond its current capacity are
//! marked.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::err::Result;

/// Chunk size the bitmap file grows by, in bytes.
const GROWTH_CHUNK: usize = 4096;

/// A presence bitmap persisted alongside a block file.
pub struct BitmapFile {
    path: PathBuf,
    bits: Vec<u8>,
}

impl BitmapFile {
    /// Opens (or creates) the bitmap file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut bits = Vec::new();
        if path.exists() {
            let mut file = OpenOptions::new().read(true).open(&path)?;
            file.read_to_end(&mut bits)?;
        }
        Ok(BitmapFile { path, bits })
    }

    /// `true` if block `index` is marked present.
    pub fn is_set(&self, index: u64) -> bool {
        let (byte, bit) = Self::locate(index);
        self.bits
            .get(byte)
            .map(|b| b & (1 << bit) != 0)
            .unwrap_or(false)
    }

    /// Marks block `index` present, growing the backing file in
    /// [`GROWTH_CHUNK`]-byte steps if `index` falls beyond its current
    /// capacity, and persists the change.
    pub fn set(&mut self, index: u64) -> Result<()> {
        let (byte, bit) = Self::locate(index);
        if byte >= self.bits.len() {
            let grown = (byte / GROWTH_CHUNK + 1) * GROWTH_CHUNK;
            self.bits.resize(grown, 0);
        }
        self.bits[byte] |= 1 << bit;
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.bits)?;
        Ok(())
    }

    fn locate(index: u64) -> (usize, u8) {
        ((index / 8) as usize, (index % 8) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_check_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.bitmap");
        let mut bitmap = BitmapFile::open(&path).unwrap();
        assert!(!bitmap.is_set(9000));
        bitmap.set(9000).unwrap();
        assert!(bitmap.is_set(9000));
        assert!(!bitmap.is_set(9001));

        let reopened = BitmapFile::open(&path).unwrap();
        assert!(reopened.is_set(9000));
    }

    #[test]
    fn growth_happens_in_four_kib_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.bitmap");
        let mut bitmap = BitmapFile::open(&path).unwrap();
        bitmap.set(0).unwrap();
        assert_eq!(bitmap.bits.len(), GROWTH_CHUNK);
    }
}
