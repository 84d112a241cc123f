//! Durable block storage used by the ledger.
//!
//! The ledger only ever calls `persist` for a block it has already validated
//! and `load_all` once at startup.

use log::{debug, info};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::blockchain::Block;
use crate::error::{ChainError, Result};

pub trait BlockStore: Send {
    /// Durably store a committed block keyed by its height.
    fn persist(&mut self, block: &Block) -> Result<()>;

    /// Every stored block, in height order.
    fn load_all(&self) -> Result<Vec<Block>>;
}

/// One pretty-printed JSON file per block: `<dir>/block_<height>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("block store at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, height: u64) -> PathBuf {
        self.dir.join(format!("block_{height}.json"))
    }
}

/// Make a rename inside `dir` durable. Directories cannot be opened for
/// syncing on every platform, so this is unix-only.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn height_from_file_name(name: &str) -> Option<u64> {
    name.strip_prefix("block_")?.strip_suffix(".json")?.parse().ok()
}

impl BlockStore for FileStore {
    fn persist(&mut self, block: &Block) -> Result<()> {
        let json = serde_json::to_string_pretty(block)?;
        // write-then-rename so a crash never leaves a half-written block
        let tmp = self.dir.join(format!(".block_{}.json.tmp", block.height));
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, self.path_for(block.height))?;
        sync_dir(&self.dir)?;
        debug!("persisted block #{} ({})", block.height, block.hash);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Block>> {
        let mut heights = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(h) = entry.file_name().to_str().and_then(height_from_file_name) {
                heights.push(h);
            }
        }
        heights.sort_unstable();

        let mut blocks = Vec::with_capacity(heights.len());
        for h in heights {
            let raw = fs::read_to_string(self.path_for(h))?;
            let block: Block = serde_json::from_str(&raw)?;
            if block.height != h {
                return Err(ChainError::StorageError(format!(
                    "block_{h}.json holds block #{}",
                    block.height
                )));
            }
            blocks.push(block);
        }
        Ok(blocks)
    }
}

/// In-memory store. Clones share the same backing vector, so a caller can
/// keep one to observe what the ledger persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.blocks.lock().map(|b| b.len()).unwrap_or(0)
    }
}

impl BlockStore for MemoryStore {
    fn persist(&mut self, block: &Block) -> Result<()> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|_| ChainError::StorageError("memory store poisoned".into()))?;
        blocks.retain(|b| b.height != block.height);
        blocks.push(block.clone());
        blocks.sort_by_key(|b| b.height);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<Block>> {
        self.blocks
            .lock()
            .map(|b| b.clone())
            .map_err(|_| ChainError::StorageError("memory store poisoned".into()))
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{BlockStore, MemoryStore};
    use crate::blockchain::Block;
    use crate::error::{ChainError, Result};

    /// Fails the next `failures` persists, then behaves like a `MemoryStore`.
    #[derive(Clone, Default)]
    pub struct FlakyStore {
        pub inner: MemoryStore,
        pub failures: Arc<AtomicUsize>,
    }

    impl FlakyStore {
        pub fn arm(&self, n: usize) {
            self.failures.store(n, Ordering::SeqCst);
        }
    }

    impl BlockStore for FlakyStore {
        fn persist(&mut self, block: &Block) -> Result<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(ChainError::StorageError("injected failure".into()));
            }
            self.inner.persist(block)
        }

        fn load_all(&self) -> Result<Vec<Block>> {
            self.inner.load_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_at(height: u64) -> Block {
        Block::new_with_timestamp(height, format!("prev-{height}"), vec![], 1_000 + height as i64)
    }

    #[test]
    fn file_store_loads_in_height_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        for h in [10, 2, 0, 1] {
            store.persist(&block_at(h)).unwrap();
        }
        // stray files are ignored
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();

        let heights: Vec<u64> = store.load_all().unwrap().iter().map(|b| b.height).collect();
        assert_eq!(heights, vec![0, 1, 2, 10]);
    }

    #[test]
    fn file_store_round_trips_block_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("nested")).unwrap();
        let block = Block::genesis("alice", 100);
        store.persist(&block).unwrap();

        let reopened = FileStore::open(dir.path().join("nested")).unwrap();
        assert_eq!(reopened.load_all().unwrap(), vec![block]);
    }

    #[test]
    fn file_store_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).unwrap();
        store.persist(&block_at(0)).unwrap();
        store.persist(&block_at(0)).unwrap();
        store.persist(&block_at(1)).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["block_0.json", "block_1.json"]);
    }

    #[test]
    fn file_store_rejects_misnamed_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let json = serde_json::to_string(&block_at(4)).unwrap();
        fs::write(dir.path().join("block_3.json"), json).unwrap();
        assert!(matches!(store.load_all(), Err(ChainError::StorageError(_))));
    }

    #[test]
    fn memory_store_clones_share_blocks() {
        let observer = MemoryStore::new();
        let mut writer = observer.clone();
        writer.persist(&block_at(0)).unwrap();
        writer.persist(&block_at(1)).unwrap();
        assert_eq!(observer.len(), 2);
        assert_eq!(observer.load_all().unwrap()[1].height, 1);
    }
}
