//! SwipTree: an embeddable, disk-backed B+tree storage core with
//! optimistic hybrid latching.
//!
//! [`Engine`] is the crate's facade: it owns the buffer pool, the backing
//! file, and the registry of named trees, and is the entry point most
//! callers should use instead of reaching into `buffer`/`index`/`storage`
//! directly.

pub mod buffer;
pub mod common;
pub mod config;
pub mod error;
pub mod index;
pub mod storage;

pub use config::{Config, ConfigBuilder};
pub use error::{Result, StorageError};
pub use index::{BTree, Cursor, ScanVisitor};
pub use storage::TreeOptions;

use buffer::BufferPoolManager;
use index::{scan_asc, scan_desc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use storage::{DiskManager, RegistryEntry, RegistryFile};
use tracing::{debug, info};

/// Top-level handle over one data directory's worth of named trees.
///
/// Mirrors the teacher codebase's pattern of a single struct composing a
/// buffer pool, a disk manager, and a catalog-like registry behind one
/// `Arc`-shared facade.
pub struct Engine {
    config: Config,
    bm: Arc<BufferPoolManager>,
    #[allow(dead_code)]
    disk: Arc<DiskManager>,
    registry: RegistryFile,
    trees: RwLock<HashMap<String, (Arc<BTree>, TreeOptions)>>,
}

impl Engine {
    /// Opens (or creates) the data directory described by `config`,
    /// restoring any previously registered trees from the on-disk
    /// registry (§6 "Persisted registry").
    pub fn open(config: Config) -> Result<Arc<Self>> {
        config.validate()?;
        let disk = Arc::new(DiskManager::open(&config.ssd_path, config.page_size)?);
        let bm = BufferPoolManager::new(
            config.num_frames(),
            config.page_size,
            config.pp_threads,
            disk.clone(),
        );
        let registry = RegistryFile::new(&config.ssd_path);

        let mut trees = HashMap::new();
        for entry in registry.restore()? {
            let tree = BTree::open(entry.name.clone(), bm.clone(), entry.meta_pid, &config, entry.options);
            debug!(name = %entry.name, meta_pid = entry.meta_pid, "restored tree from registry");
            trees.insert(entry.name, (tree, entry.options));
        }
        info!(trees = trees.len(), dir = %config.ssd_path, "engine opened");

        Ok(Arc::new(Self {
            config,
            bm,
            disk,
            registry,
            trees: RwLock::new(trees),
        }))
    }

    /// Registers a new, empty tree under `name`.
    pub fn register(&self, name: impl Into<String>, options: TreeOptions) -> Result<()> {
        let name = name.into();
        {
            let trees = self.trees.read().unwrap();
            if trees.contains_key(&name) {
                return Err(StorageError::TreeExists(name));
            }
        }
        let tree = BTree::create(name.clone(), self.bm.clone(), &self.config, options)?;
        self.trees.write().unwrap().insert(name.clone(), (tree, options));
        debug!(name = %name, "tree registered");
        self.persist_registry()?;
        Ok(())
    }

    /// Returns the handle for a previously registered tree.
    pub fn retrieve(&self, name: &str) -> Result<Arc<BTree>> {
        self.trees
            .read()
            .unwrap()
            .get(name)
            .map(|(tree, _)| tree.clone())
            .ok_or_else(|| StorageError::TreeNotFound(name.to_string()))
    }

    /// Destroys a tree, freeing every page it reaches.
    pub fn drop_tree(&self, name: &str) -> Result<()> {
        let (tree, _options) = self
            .trees
            .write()
            .unwrap()
            .remove(name)
            .ok_or_else(|| StorageError::TreeNotFound(name.to_string()))?;
        tree.free_all_pages()?;
        debug!(name = %name, "tree dropped");
        self.persist_registry()?;
        Ok(())
    }

    pub fn lookup(&self, name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.retrieve(name)?.lookup(key)
    }

    pub fn insert(&self, name: &str, key: &[u8], payload: &[u8]) -> Result<()> {
        self.retrieve(name)?.insert(key, payload)
    }

    pub fn update_same_size_in_place(
        &self,
        name: &str,
        key: &[u8],
        update_fn: impl Fn(&mut [u8]),
        descriptor: &[(usize, usize)],
    ) -> Result<()> {
        self.retrieve(name)?
            .update_same_size_in_place(key, update_fn, descriptor)
    }

    pub fn remove(&self, name: &str, key: &[u8]) -> Result<()> {
        self.retrieve(name)?.remove(key)
    }

    pub fn scan_asc(&self, name: &str, start_key: &[u8], visitor: &mut dyn ScanVisitor) -> Result<()> {
        scan_asc(&self.retrieve(name)?, start_key, visitor)
    }

    pub fn scan_desc(&self, name: &str, start_key: &[u8], visitor: &mut dyn ScanVisitor) -> Result<()> {
        scan_desc(&self.retrieve(name)?, start_key, visitor)
    }

    /// Flushes every dirty frame to disk and rewrites the tree registry.
    /// A subsequent `Engine::open` of the same directory restores the
    /// same set of trees.
    pub fn persist(&self) -> Result<()> {
        self.bm.flush_all()?;
        self.persist_registry()
    }

    fn persist_registry(&self) -> Result<()> {
        let entries: Vec<RegistryEntry> = self
            .trees
            .read()
            .unwrap()
            .iter()
            .map(|(name, (tree, options))| RegistryEntry {
                name: name.clone(),
                meta_pid: tree.meta_pid(),
                options: *options,
            })
            .collect();
        self.registry.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_engine(dir: &std::path::Path) -> Arc<Engine> {
        let config = Config {
            ssd_path: dir.to_str().unwrap().to_string(),
            page_size: 4096,
            ram_budget_bytes: 4096 * 64,
            pp_threads: 1,
            ..Config::default()
        };
        Engine::open(config).unwrap()
    }

    #[test]
    fn register_insert_lookup_roundtrips() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());
        engine.register("t1", TreeOptions::default()).unwrap();
        engine.insert("t1", b"k1", b"v1").unwrap();
        assert_eq!(engine.lookup("t1", b"k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn registering_same_name_twice_errors() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());
        engine.register("t1", TreeOptions::default()).unwrap();
        let err = engine.register("t1", TreeOptions::default());
        assert!(matches!(err, Err(StorageError::TreeExists(_))));
    }

    #[test]
    fn operating_on_unknown_tree_errors() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());
        let err = engine.lookup("ghost", b"k");
        assert!(matches!(err, Err(StorageError::TreeNotFound(_))));
    }

    #[test]
    fn persist_and_reopen_recovers_registered_trees() {
        let dir = tempdir().unwrap();
        {
            let engine = test_engine(dir.path());
            engine.register("t1", TreeOptions::default()).unwrap();
            engine.register("t2", TreeOptions::default()).unwrap();
            engine.insert("t1", b"k1", b"v1").unwrap();
            engine.persist().unwrap();
        }
        let engine = test_engine(dir.path());
        assert_eq!(engine.lookup("t1", b"k1").unwrap(), Some(b"v1".to_vec()));
        engine.retrieve("t2").unwrap();
        let err = engine.retrieve("t3");
        assert!(matches!(err, Err(StorageError::TreeNotFound(_))));
    }

    #[test]
    fn drop_tree_removes_it_from_the_registry() {
        let dir = tempdir().unwrap();
        let engine = test_engine(dir.path());
        engine.register("t1", TreeOptions::default()).unwrap();
        engine.insert("t1", b"k1", b"v1").unwrap();
        engine.drop_tree("t1").unwrap();
        assert!(matches!(
            engine.lookup("t1", b"k1"),
            Err(StorageError::TreeNotFound(_))
        ));
    }
}
