//! Collection registry over one sled database.
//!
//! [`Store`] opens the backend, hands out shared [`Collection`] handles (opening each at most
//! once), and wires watchers and batches to them.

pub mod batch;

pub use batch::{Mutation, MutationOutcome};

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::storage::{
    Backend, BackendConfig, Collection, Revision, StorageResult, StructureKeys, DEFAULT_MAXLEN,
};
use crate::watch::{Watcher, DEFAULT_WATCH_BLOCK};

/// Configuration for a [`Store`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: BackendConfig,

    /// Change-log bound used when a caller does not pass one.
    pub default_maxlen: usize,

    /// How long a watch poll waits for new entries before polling again.
    pub watch_block: Duration,

    /// Flush the collection tree after every commit.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            default_maxlen: DEFAULT_MAXLEN,
            watch_block: DEFAULT_WATCH_BLOCK,
            sync_writes: false,
        }
    }
}

/// All collections of one data directory.
pub struct Store {
    config: StoreConfig,
    backend: Arc<Backend>,
    collections: DashMap<String, Arc<Collection>>,
}

impl Store {
    pub fn open(config: StoreConfig) -> StorageResult<Arc<Self>> {
        let backend = Backend::new(config.backend.clone())?;

        info!(
            "Store opened with {} collection trees (default_maxlen={}, sync_writes={})",
            backend.collection_names().len(),
            config.default_maxlen,
            config.sync_writes
        );

        Ok(Arc::new(Self {
            config,
            backend,
            collections: DashMap::new(),
        }))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Returns the collection `name`, opening it on first use.
    ///
    /// Opening scans the collection's tree, so it runs outside the map's shard lock. When two
    /// callers race to open the same name, the first insert wins and the other handle is dropped.
    pub fn collection(&self, name: &str) -> StorageResult<Arc<Collection>> {
        if let Some(existing) = self.collections.get(name) {
            return Ok(existing.value().clone());
        }

        let opened = Collection::open(self.backend.clone(), name, self.config.sync_writes)?;
        let collection = self
            .collections
            .entry(name.to_string())
            .or_insert(opened)
            .value()
            .clone();
        Ok(collection)
    }

    /// Names of every collection that has committed at least one change, sorted.
    ///
    /// A tree exists as soon as a collection is opened, even for a read; only trees holding a
    /// revision pointer count as collections.
    pub fn collection_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for name in self.backend.collection_names() {
            let tree = self.backend.open_collection_tree(&name)?;
            let keys = StructureKeys::for_collection(&name);
            if self.backend.get(&tree, keys.revision_entry())?.is_some() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Starts a watcher on `name` after `last_revision`. `block` defaults to the configured
    /// watch block.
    pub fn watch(
        &self,
        name: &str,
        last_revision: Revision,
        block: Option<Duration>,
    ) -> StorageResult<Watcher> {
        let collection = self.collection(name)?;
        Ok(Watcher::new(
            &collection,
            last_revision,
            block.unwrap_or(self.config.watch_block),
        ))
    }

    /// Applies `mutations` to `name` one transaction at a time, in order.
    ///
    /// The outer error is only for failing to open the collection; each mutation reports its
    /// own result.
    pub fn apply_batch(
        &self,
        name: &str,
        mutations: &[Mutation],
        maxlen: Option<usize>,
    ) -> StorageResult<Vec<StorageResult<MutationOutcome>>> {
        let collection = self.collection(name)?;
        let maxlen = maxlen.unwrap_or(self.config.default_maxlen);

        let results: Vec<_> = mutations
            .iter()
            .map(|mutation| mutation.apply(&collection, maxlen))
            .collect();

        debug!(
            "Applied batch of {} mutations to {} ({} failed)",
            results.len(),
            name,
            results.iter().filter(|r| r.is_err()).count()
        );
        Ok(results)
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.backend.flush()?;
        Ok(())
    }
}
