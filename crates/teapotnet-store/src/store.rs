//! The content-addressed block store (`spec.md` §4.6 "Store").
//!
//! Blocks reach the store two ways: [`Store::notify_block`] registers
//! a block a caller has already validated by other means (the
//! fountain sink trusts its own linear-algebra decode), while
//! [`Store::stage_and_commit`] is for content arriving from an
//! untrusted source (a standalone block announcement, a filesystem
//! scan): it stages to a temporary file, hashes it, and only on a
//! digest match relocates it into the cache and signals waiters —
//! the same stage-then-rename shape `tor-persist`'s `FsStateMgr` uses
//! for state file writes, adapted here for content verification
//! rather than crash-safety alone.

use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use teapotnet_identity::Identifier;
use tokio::sync::oneshot;

use crate::err::{Result, StoreError};

/// Where a fully-available block lives on disk.
#[derive(Debug, Clone)]
pub struct BlockLocation {
    /// File the block's bytes live in.
    pub file: PathBuf,
    /// Byte offset of the block's first byte within `file`.
    pub offset: u64,
    /// Length of the block in bytes.
    pub size: u32,
}

struct Inner {
    present: Mutex<HashMap<Identifier, BlockLocation>>,
    waiters: Mutex<HashMap<Identifier, Vec<oneshot::Sender<()>>>>,
}

/// A content-addressed repository of 1 KiB-or-smaller blocks.
pub struct Store {
    cache_dir: PathBuf,
    inner: Inner,
}

impl Store {
    /// Opens (creating if necessary) a store rooted at `cache_dir`.
    pub fn open(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        fs::create_dir_all(&cache_dir)?;
        Ok(Store {
            cache_dir,
            inner: Inner {
                present: Mutex::new(HashMap::new()),
                waiters: Mutex::new(HashMap::new()),
            },
        })
    }

    /// `true` if `digest` is currently present.
    pub fn has_block(&self, digest: &Identifier) -> bool {
        self.inner.present.lock().unwrap().contains_key(digest)
    }

    /// Registers that `digest` is present at `(file, offset, size)`,
    /// without re-validating its content, and wakes every waiter.
    pub fn notify_block(&self, digest: Identifier, file: PathBuf, offset: u64, size: u32) {
        self.inner
            .present
            .lock()
            .unwrap()
            .insert(digest, BlockLocation { file, offset, size });
        if let Some(waiters) = self.inner.waiters.lock().unwrap().remove(&digest) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
    }

    /// Stages `content` to a temporary file, hashes it, and on a
    /// match with `expected`, relocates it into the cache directory
    /// under its own hex-named file and registers it
    /// (`spec.md` §4.6 "Writing a block is atomic").
    pub fn stage_and_commit(&self, expected: Identifier, content: &[u8]) -> Result<BlockLocation> {
        let digest = Identifier::hash(content);
        if digest != expected {
            return Err(StoreError::HashMismatch);
        }
        let mut staged = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        use std::io::Write;
        staged.write_all(content)?;
        staged.flush()?;

        let dest = self.cache_dir.join(digest.to_hex());
        staged
            .persist(&dest)
            .map_err(|persist_err| StoreError::Io(persist_err.error))?;

        let location = BlockLocation {
            file: dest,
            offset: 0,
            size: content.len() as u32,
        };
        self.notify_block(digest, location.file.clone(), location.offset, location.size);
        Ok(location)
    }

    /// Returns `digest`'s bytes, blocking (cooperatively) until the
    /// block becomes present or `timeout` elapses.
    ///
    /// `spec.md` §5 lists this as a suspension point: when the block
    /// is absent, the caller yields rather than spins.
    pub async fn get_block(&self, digest: Identifier, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if let Some(location) = self.inner.present.lock().unwrap().get(&digest).cloned() {
            return self.read_location(&location);
        }

        let (tx, rx) = oneshot::channel();
        self.inner.waiters.lock().unwrap().entry(digest).or_default().push(tx);

        // A concurrent `notify_block` between the first lookup and the
        // waiter registration is still caught here on retry.
        if let Some(location) = self.inner.present.lock().unwrap().get(&digest).cloned() {
            return self.read_location(&location);
        }

        let wait = async {
            rx.await.map_err(|_| StoreError::Cancelled)
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, wait)
                .await
                .map_err(|_| StoreError::Timeout)??,
            None => wait.await?,
        };

        let location = self
            .inner
            .present
            .lock()
            .unwrap()
            .get(&digest)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        self.read_location(&location)
    }

    fn read_location(&self, location: &BlockLocation) -> Result<Vec<u8>> {
        let mut file = fs::File::open(&location.file)?;
        file.seek(SeekFrom::Start(location.offset))?;
        let mut buffer = vec![0u8; location.size as usize];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_and_commit_then_get_block_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let content = b"hello block".to_vec();
        let digest = Identifier::hash(&content);

        store.stage_and_commit(digest, &content).unwrap();
        let back = store.get_block(digest, Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn stage_and_commit_rejects_wrong_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let err = store.stage_and_commit(Identifier::hash(b"other"), b"content").unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch));
        assert!(!store.has_block(&Identifier::hash(b"content")));
    }

    #[tokio::test]
    async fn get_block_times_out_when_never_notified() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let err = store
            .get_block(Identifier::hash(b"missing"), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
    }

    #[tokio::test]
    async fn get_block_wakes_on_concurrent_notify() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path()).unwrap());
        let digest = Identifier::hash(b"late");

        let waiter_store = store.clone();
        let waiter = tokio::spawn(async move {
            waiter_store.get_block(digest, Some(Duration::from_secs(1))).await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let file = dir.path().join("late.blk");
        fs::write(&file, b"late content").unwrap();
        store.notify_block(digest, file, 0, "late content".len() as u32);

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, b"late content");
    }
}
