//! Sled-backed persistent storage backend.
//!
//! This module owns the sled database that physically stores every collection. Each collection
//! lives in its own sled tree (`collection/<name>`), which holds all five of its structures; a
//! single `sled::Batch` applied to that tree is the atomic unit every mutation commits through.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Prefix of the sled tree names that hold collections.
const COLLECTION_TREE_PREFIX: &str = "collection/";

/// Backend storage errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Sled error: {0}")]
    SledError(#[from] sled::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Configuration for the backend storage.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Path to the data directory where sled stores all files.
    pub data_dir: PathBuf,

    /// Maximum page cache size in megabytes.
    pub cache_size_mb: u64,

    /// How often sled flushes dirty pages to disk, in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            cache_size_mb: 256,
            flush_interval_ms: 1000,
        }
    }
}

/// The persistent storage backend using sled.
pub struct Backend {
    db: sled::Db,
    config: BackendConfig,
}

impl Backend {
    /// Opens (or creates) the database described by `config`.
    pub fn new(config: BackendConfig) -> BackendResult<Arc<Self>> {
        debug!("Initializing storage backend at {:?}", config.data_dir);

        std::fs::create_dir_all(&config.data_dir)?;

        let db = sled::Config::new()
            .path(&config.data_dir)
            .cache_capacity(config.cache_size_mb * 1024 * 1024)
            .flush_every_ms(Some(config.flush_interval_ms))
            .open()
            .map_err(|e| {
                BackendError::ConfigError(format!("Failed to open sled database: {}", e))
            })?;

        info!(
            "Storage backend initialized with cache_size={}MB, flush_interval={}ms",
            config.cache_size_mb, config.flush_interval_ms
        );

        Ok(Arc::new(Self { db, config }))
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Opens the tree that holds the collection `name`, creating it if needed.
    pub fn open_collection_tree(&self, name: &str) -> BackendResult<sled::Tree> {
        Ok(self.db.open_tree(collection_tree_name(name))?)
    }

    /// Lists the collections that have a tree in this database.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|raw| {
                raw.strip_prefix(COLLECTION_TREE_PREFIX.as_bytes())
                    .map(|name| String::from_utf8_lossy(name).into_owned())
            })
            .collect();
        names.sort();
        names
    }

    /// Applies a batch to a collection tree atomically, optionally waiting for it to be durable.
    pub fn commit(&self, tree: &sled::Tree, batch: sled::Batch, sync: bool) -> BackendResult<()> {
        tree.apply_batch(batch)?;
        if sync {
            tree.flush()?;
        }
        Ok(())
    }

    /// Scans all entries of `tree` whose key starts with `prefix`, returning `(suffix, value)`
    /// pairs with the prefix stripped.
    pub fn scan_prefix(
        &self,
        tree: &sled::Tree,
        prefix: &[u8],
    ) -> BackendResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut results = Vec::new();

        for item in tree.scan_prefix(prefix) {
            let (k, v) = item?;
            results.push((k[prefix.len()..].to_vec(), v.to_vec()));
        }

        Ok(results)
    }

    /// Retrieves a single entry of `tree`.
    pub fn get(&self, tree: &sled::Tree, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        Ok(tree.get(key)?.map(|v| v.to_vec()))
    }

    /// Returns the approximate total size of the database in bytes.
    pub fn size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> BackendResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn collection_tree_name(name: &str) -> String {
    format!("{}{}", COLLECTION_TREE_PREFIX, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_backend(temp_dir: &TempDir) -> Arc<Backend> {
        let config = BackendConfig {
            data_dir: temp_dir.path().to_path_buf(),
            cache_size_mb: 64,
            flush_interval_ms: 100,
        };
        Backend::new(config).unwrap()
    }

    #[test]
    fn test_backend_creation() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);
        let _size = backend.size();
        assert_eq!(backend.config().cache_size_mb, 64);
        assert!(backend.collection_names().is_empty());
    }

    #[test]
    fn test_collection_trees_are_listed() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);

        backend.open_collection_tree("users").unwrap();
        backend.open_collection_tree("orders").unwrap();

        assert_eq!(backend.collection_names(), vec!["orders", "users"]);
    }

    #[test]
    fn test_commit_and_scan_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);
        let tree = backend.open_collection_tree("c").unwrap();

        let mut batch = sled::Batch::default();
        batch.insert(&b"p\x00a"[..], &b"1"[..]);
        batch.insert(&b"p\x00b"[..], &b"2"[..]);
        batch.insert(&b"q\x00a"[..], &b"3"[..]);
        backend.commit(&tree, batch, true).unwrap();

        let results = backend.scan_prefix(&tree, b"p\x00").unwrap();
        assert_eq!(
            results,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec())
            ]
        );
        assert_eq!(backend.get(&tree, b"q\x00a").unwrap(), Some(b"3".to_vec()));
        assert_eq!(backend.get(&tree, b"missing").unwrap(), None);
    }
}
