//! A single growing file holding one target's blocks back-to-back,
//! addressed by integer block index (`spec.md` §6 "Block file
//! layout"). Presence is tracked by a sidecar [`BitmapFile`].

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::bitmap::BitmapFile;
use crate::combination::BLOCK_SIZE;
use crate::err::Result;

/// The backing file for one fountain target, plus its presence
/// bitmap.
pub struct BlockFile {
    path: PathBuf,
    bitmap: BitmapFile,
}

impl BlockFile {
    /// Opens (or creates) the block file and its sidecar bitmap at
    /// `path` (the bitmap lives alongside it with a `.bitmap`
    /// extension appended).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let bitmap_path = Self::bitmap_path(&path);
        let bitmap = BitmapFile::open(bitmap_path)?;
        Ok(BlockFile { path, bitmap })
    }

    fn bitmap_path(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_owned();
        os.push(".bitmap");
        PathBuf::from(os)
    }

    /// The path to the backing file itself (what [`crate::Store`]
    /// records as a block's location once it is also registered
    /// there).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` if block `index` has been written.
    pub fn has_block(&self, index: u64) -> bool {
        self.bitmap.is_set(index)
    }

    /// Reads block `index`'s content, or `None` if it has not been
    /// written. The returned content is the original (un-padded)
    /// block size, at most [`BLOCK_SIZE`] bytes.
    pub fn read_block(&self, index: u64) -> Result<Option<Vec<u8>>> {
        if !self.has_block(index) {
            return Ok(None);
        }
        let mut file = OpenOptions::new().read(true).open(&self.path)?;
        file.seek(SeekFrom::Start(index * BLOCK_SIZE as u64))?;
        let mut buffer = vec![0u8; BLOCK_SIZE];
        file.read_exact(&mut buffer)?;
        Ok(Some(buffer))
    }

    /// Writes `content` (at most [`BLOCK_SIZE`] bytes) at `index`,
    /// zero-padded on disk, and marks it present.
    pub fn write_block(&mut self, index: u64, content: &[u8]) -> Result<()> {
        let mut buffer = vec![0u8; BLOCK_SIZE];
        let n = content.len().min(BLOCK_SIZE);
        buffer[..n].copy_from_slice(&content[..n]);

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(index * BLOCK_SIZE as u64))?;
        file.write_all(&buffer)?;
        self.bitmap.set(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("target.blk")).unwrap();
        assert!(!file.has_block(3));
        file.write_block(3, b"some content").unwrap();
        assert!(file.has_block(3));
        let back = file.read_block(3).unwrap().unwrap();
        assert_eq!(&back[..12], b"some content");
    }

    #[test]
    fn unwritten_block_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = BlockFile::open(dir.path().join("target.blk")).unwrap();
        assert!(file.read_block(0).unwrap().is_none());
    }
}
