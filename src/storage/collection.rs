//! A single named collection and its atomic commit path.
//!
//! The collection keeps an in-memory mirror of its five structures behind a `RwLock`. Writers
//! take the write lock for the whole read-modify-write cycle, stage their effects in a
//! [`Transaction`], and publish them with [`Collection::commit`]: one `sled::Batch` to disk, then
//! the mirror, then the head-revision notification watchers wait on.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::event::{decode_event, encode_event, ChangeEvent, CollectionItem};
use super::index::{KeyIndex, VersionIndex};
use super::revision::Revision;
use super::schema::StructureKeys;
use super::{Backend, StorageError, StorageResult};
use crate::version::{decode_version, encode_version, Version, ABSENT_VERSION};

/// In-memory mirror of a collection's five structures.
#[derive(Debug, Default)]
pub struct CollectionState {
    pub(crate) values: HashMap<Vec<u8>, Vec<u8>>,
    pub(crate) key_index: KeyIndex,
    pub(crate) version_index: VersionIndex,
    pub(crate) changes: BTreeMap<Revision, ChangeEvent>,
    pub(crate) revision: Revision,
}

impl CollectionState {
    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.values.contains_key(key)
    }

    /// Current version of `key`, or `0` when the key does not exist.
    pub fn version_or_absent(&self, key: &[u8]) -> Version {
        self.version_index.get(key).unwrap_or(ABSENT_VERSION)
    }

    pub fn item(&self, key: &[u8]) -> Option<CollectionItem> {
        let value = self.values.get(key)?;
        Some(CollectionItem {
            key: key.to_vec(),
            value: value.clone(),
            version: self.version_or_absent(key),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Change-log entries with a revision strictly greater than `after`, oldest first.
    pub fn changes_after(&self, after: Revision) -> Vec<ChangeEvent> {
        self.changes
            .range((Bound::Excluded(after), Bound::Unbounded))
            .map(|(_, event)| event.clone())
            .collect()
    }

    fn apply_put(&mut self, key: &[u8], value: &[u8], version: Version) {
        self.values.insert(key.to_vec(), value.to_vec());
        self.key_index.insert(key);
        self.version_index.insert(key, version);
    }

    fn apply_delete(&mut self, key: &[u8]) {
        self.values.remove(key);
        self.key_index.remove(key);
        self.version_index.remove(key);
    }
}

#[derive(Clone, Debug)]
enum StagedWrite {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        version: Version,
    },
    Delete {
        key: Vec<u8>,
    },
}

/// Effects of one mutation, staged until commit.
///
/// Every staged write appends exactly one change event chained to the one before it.
#[derive(Debug)]
pub struct Transaction {
    base: Revision,
    head: Revision,
    writes: Vec<StagedWrite>,
    events: Vec<ChangeEvent>,
}

impl Transaction {
    fn new(base: Revision) -> Self {
        Self {
            base,
            head: base,
            writes: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Stages an upsert and its `Set` event.
    pub fn put(&mut self, key: &[u8], value: &[u8], version: Version) {
        let revision = self.head.next_now();
        self.events.push(ChangeEvent::Set {
            revision,
            prev_revision: self.head,
            key: key.to_vec(),
            value: value.to_vec(),
            version,
        });
        self.writes.push(StagedWrite::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            version,
        });
        self.head = revision;
    }

    /// Stages a deletion and its `Remove` event. The caller checks the key is live.
    pub fn delete(&mut self, key: &[u8]) {
        let revision = self.head.next_now();
        self.events.push(ChangeEvent::Remove {
            revision,
            prev_revision: self.head,
            key: key.to_vec(),
        });
        self.writes.push(StagedWrite::Delete { key: key.to_vec() });
        self.head = revision;
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of change events this transaction will append.
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

/// A named collection of versioned key-value items with a chained change log.
pub struct Collection {
    name: String,
    keys: StructureKeys,
    backend: Arc<Backend>,
    tree: sled::Tree,
    sync_writes: bool,
    state: RwLock<CollectionState>,
    head: watch::Sender<Revision>,
}

impl Collection {
    /// Opens the collection `name`, rebuilding its in-memory mirror from the backend.
    ///
    /// A collection that was never written opens empty at revision `0-0`.
    pub fn open(backend: Arc<Backend>, name: &str, sync_writes: bool) -> StorageResult<Arc<Self>> {
        if name.is_empty() {
            return Err(StorageError::InvalidArgument(
                "collection name cannot be empty".to_string(),
            ));
        }

        let keys = StructureKeys::for_collection(name);
        let tree = backend.open_collection_tree(name)?;
        let state = Self::load(&backend, &tree, name, &keys)?;

        info!(
            collection = name,
            items = state.len(),
            changes = state.changes.len(),
            revision = %state.revision,
            "Collection opened"
        );

        let (head, _) = watch::channel(state.revision);

        Ok(Arc::new(Self {
            name: name.to_string(),
            keys,
            backend,
            tree,
            sync_writes,
            state: RwLock::new(state),
            head,
        }))
    }

    fn load(
        backend: &Backend,
        tree: &sled::Tree,
        name: &str,
        keys: &StructureKeys,
    ) -> StorageResult<CollectionState> {
        let inconsistent = |detail: String| {
            warn!(collection = name, %detail, "Collection structures disagree");
            StorageError::Inconsistent {
                collection: name.to_string(),
                detail,
            }
        };

        let mut state = CollectionState::default();

        for (key, value) in backend.scan_prefix(tree, &keys.values_prefix())? {
            state.values.insert(key, value);
        }

        for (key, _) in backend.scan_prefix(tree, &keys.keys_prefix())? {
            state.key_index.insert(&key);
        }

        for (key, token) in backend.scan_prefix(tree, &keys.versions_prefix())? {
            let token = String::from_utf8(token)
                .map_err(|_| inconsistent("version token is not UTF-8".to_string()))?;
            state.version_index.insert(&key, decode_version(&token)?);
        }

        for (raw_revision, data) in backend.scan_prefix(tree, &keys.changes_prefix())? {
            let revision = Revision::from_be_bytes(&raw_revision)?;
            state.changes.insert(revision, decode_event(revision, &data)?);
        }

        if let Some(raw) = backend.get(tree, keys.revision_entry())? {
            let text = String::from_utf8(raw)
                .map_err(|_| inconsistent("revision pointer is not UTF-8".to_string()))?;
            state.revision = text.parse()?;
        }

        if state.key_index.len() != state.values.len()
            || state.version_index.len() != state.values.len()
            || state
                .values
                .keys()
                .any(|k| !state.key_index.contains(k) || !state.version_index.contains(k))
        {
            return Err(inconsistent(format!(
                "values={} keys={} versions={}",
                state.values.len(),
                state.key_index.len(),
                state.version_index.len()
            )));
        }

        if let Some((last, _)) = state.changes.last_key_value() {
            if *last != state.revision {
                return Err(inconsistent(format!(
                    "revision pointer {} does not match last change {}",
                    state.revision, last
                )));
            }
        }

        Ok(state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn structure_keys(&self) -> &StructureKeys {
        &self.keys
    }

    /// The current revision pointer.
    pub fn revision(&self) -> Revision {
        self.state.read().revision
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Every retained change-log entry, oldest first.
    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.state.read().changes.values().cloned().collect()
    }

    /// Retained change-log entries with a revision strictly greater than `after`.
    pub fn changes_after(&self, after: Revision) -> Vec<ChangeEvent> {
        self.state.read().changes_after(after)
    }

    /// Receiver that observes the head revision after every commit that appended events.
    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.head.subscribe()
    }

    /// Read access to a consistent snapshot of the collection.
    pub(crate) fn snapshot(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.state.read()
    }

    /// Runs one mutation as an atomic transaction.
    ///
    /// `stage` inspects the current state and stages writes; the staged effects are committed
    /// together, or not at all if `stage` or the commit fails. Returns the staging result and
    /// the revision pointer after the commit (unchanged when nothing was staged).
    pub(crate) fn mutate<T>(
        &self,
        maxlen: usize,
        stage: impl FnOnce(&CollectionState, &mut Transaction) -> StorageResult<T>,
    ) -> StorageResult<(T, Revision)> {
        let mut state = self.state.write();
        let mut txn = Transaction::new(state.revision);
        let output = stage(&state, &mut txn)?;
        let revision = self.commit(&mut state, txn, maxlen)?;
        Ok((output, revision))
    }

    /// Persists a transaction and publishes it to the in-memory mirror.
    ///
    /// After appending, the change log is trimmed to the newest `maxlen` entries.
    fn commit(
        &self,
        state: &mut CollectionState,
        txn: Transaction,
        maxlen: usize,
    ) -> StorageResult<Revision> {
        if txn.is_empty() {
            return Ok(state.revision);
        }
        debug_assert_eq!(txn.base, state.revision);

        let evict = (state.changes.len() + txn.events.len()).saturating_sub(maxlen);
        let evicted: Vec<Revision> = state
            .changes
            .keys()
            .copied()
            .chain(txn.events.iter().map(ChangeEvent::revision))
            .take(evict)
            .collect();

        let mut batch = sled::Batch::default();
        for write in &txn.writes {
            match write {
                StagedWrite::Put {
                    key,
                    value,
                    version,
                } => {
                    batch.insert(self.keys.value_entry(key), value.clone());
                    batch.insert(self.keys.key_entry(key), Vec::<u8>::new());
                    batch.insert(
                        self.keys.version_entry(key),
                        encode_version(*version).into_bytes(),
                    );
                }
                StagedWrite::Delete { key } => {
                    batch.remove(self.keys.value_entry(key));
                    batch.remove(self.keys.key_entry(key));
                    batch.remove(self.keys.version_entry(key));
                }
            }
        }
        for event in &txn.events {
            batch.insert(self.keys.change_entry(event.revision()), encode_event(event)?);
        }
        for revision in &evicted {
            batch.remove(self.keys.change_entry(*revision));
        }
        batch.insert(self.keys.revision_entry(), txn.head.to_string().into_bytes());

        self.backend.commit(&self.tree, batch, self.sync_writes)?;

        for write in &txn.writes {
            match write {
                StagedWrite::Put {
                    key,
                    value,
                    version,
                } => state.apply_put(key, value, *version),
                StagedWrite::Delete { key } => state.apply_delete(key),
            }
        }
        let appended = txn.events.len();
        for event in txn.events {
            state.changes.insert(event.revision(), event);
        }
        for revision in &evicted {
            state.changes.remove(revision);
        }
        state.revision = txn.head;

        debug!(
            collection = %self.name,
            revision = %txn.head,
            appended,
            trimmed = evicted.len(),
            "Committed"
        );

        self.head.send_replace(txn.head);

        Ok(txn.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendConfig;
    use tempfile::TempDir;

    fn setup_backend(temp_dir: &TempDir) -> Arc<Backend> {
        let config = BackendConfig {
            data_dir: temp_dir.path().to_path_buf(),
            cache_size_mb: 64,
            flush_interval_ms: 100,
        };
        Backend::new(config).unwrap()
    }

    fn setup_collection(temp_dir: &TempDir, name: &str) -> Arc<Collection> {
        Collection::open(setup_backend(temp_dir), name, false).unwrap()
    }

    /// Writes raw entries into a collection tree, bypassing the commit path.
    fn write_raw(backend: &Backend, name: &str, entries: Vec<(Vec<u8>, Vec<u8>)>) {
        let tree = backend.open_collection_tree(name).unwrap();
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key, value);
        }
        backend.commit(&tree, batch, false).unwrap();
    }

    fn open_error_detail(backend: Arc<Backend>, name: &str) -> String {
        match Collection::open(backend, name, false) {
            Err(StorageError::Inconsistent { collection, detail }) => {
                assert_eq!(collection, name);
                detail
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(collection) => panic!("opened at revision {}", collection.revision()),
        }
    }

    #[test]
    fn test_open_empty_collection() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        assert_eq!(collection.name(), "c");
        assert_eq!(collection.revision(), Revision::ZERO);
        assert!(collection.is_empty());
        assert!(collection.changes().is_empty());
    }

    #[test]
    fn test_empty_name_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let backend = Backend::new(BackendConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(
            Collection::open(backend, "", false),
            Err(StorageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_transaction_chains_events() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        let (_, revision) = collection
            .mutate(1000, |_, txn| {
                txn.put(b"a", b"1", 1.0);
                txn.put(b"b", b"2", 2.0);
                txn.delete(b"a");
                assert_eq!(txn.len(), 3);
                Ok(())
            })
            .unwrap();

        let changes = collection.changes();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].prev_revision(), Revision::ZERO);
        assert_eq!(changes[1].prev_revision(), changes[0].revision());
        assert_eq!(changes[2].prev_revision(), changes[1].revision());
        assert_eq!(changes[2].revision(), revision);
        assert_eq!(collection.revision(), revision);

        let state = collection.snapshot();
        assert!(!state.contains(b"a"));
        assert_eq!(state.item(b"b").unwrap().value, b"2");
    }

    #[test]
    fn test_empty_transaction_keeps_revision() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        let (_, revision) = collection.mutate(1000, |_, _| Ok(())).unwrap();
        assert_eq!(revision, Revision::ZERO);
        assert!(collection.changes().is_empty());
    }

    #[test]
    fn test_failed_staging_leaves_state_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        let result: StorageResult<((), Revision)> = collection.mutate(1000, |_, txn| {
            txn.put(b"a", b"1", 1.0);
            Err(StorageError::InvalidArgument("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(collection.is_empty());
        assert_eq!(collection.revision(), Revision::ZERO);
    }

    #[test]
    fn test_trim_keeps_newest_entries() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        for i in 0..5u8 {
            collection
                .mutate(3, |_, txn| {
                    txn.put(&[i], b"v", f64::from(i));
                    Ok(())
                })
                .unwrap();
        }

        let changes = collection.changes();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].key(), &[2u8]);
        assert_eq!(changes[2].revision(), collection.revision());
        assert_eq!(collection.len(), 5);
    }

    #[test]
    fn test_changes_after() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");

        let (_, first) = collection
            .mutate(1000, |_, txn| {
                txn.put(b"a", b"1", 1.0);
                Ok(())
            })
            .unwrap();
        collection
            .mutate(1000, |_, txn| {
                txn.put(b"b", b"2", 2.0);
                Ok(())
            })
            .unwrap();

        assert_eq!(collection.changes_after(Revision::ZERO).len(), 2);
        let after = collection.changes_after(first);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].key(), b"b");
        assert!(collection.changes_after(collection.revision()).is_empty());
    }

    #[test]
    fn test_subscribe_observes_commits() {
        let temp_dir = TempDir::new().unwrap();
        let collection = setup_collection(&temp_dir, "c");
        let mut rx = collection.subscribe();
        assert_eq!(*rx.borrow_and_update(), Revision::ZERO);

        let (_, revision) = collection
            .mutate(1000, |_, txn| {
                txn.put(b"a", b"1", 1.0);
                Ok(())
            })
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), revision);
    }

    #[test]
    fn test_open_rejects_value_without_indexes() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);
        let keys = StructureKeys::for_collection("c");
        write_raw(&backend, "c", vec![(keys.value_entry(b"k"), b"v".to_vec())]);

        assert_eq!(
            open_error_detail(backend, "c"),
            "values=1 keys=0 versions=0"
        );
    }

    #[test]
    fn test_open_rejects_mismatched_key_sets() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);
        let keys = StructureKeys::for_collection("c");
        write_raw(
            &backend,
            "c",
            vec![
                (keys.value_entry(b"a"), b"v".to_vec()),
                (keys.key_entry(b"b"), Vec::new()),
                (keys.version_entry(b"b"), encode_version(1.0).into_bytes()),
            ],
        );

        assert_eq!(
            open_error_detail(backend, "c"),
            "values=1 keys=1 versions=1"
        );
    }

    #[test]
    fn test_open_rejects_stale_revision_pointer() {
        let temp_dir = TempDir::new().unwrap();
        let backend = setup_backend(&temp_dir);
        let keys = StructureKeys::for_collection("c");
        let last = Revision::new(4, 0);
        let event = ChangeEvent::Set {
            revision: last,
            prev_revision: Revision::ZERO,
            key: b"k".to_vec(),
            value: b"v".to_vec(),
            version: 1.0,
        };
        write_raw(
            &backend,
            "c",
            vec![
                (keys.value_entry(b"k"), b"v".to_vec()),
                (keys.key_entry(b"k"), Vec::new()),
                (keys.version_entry(b"k"), encode_version(1.0).into_bytes()),
                (keys.change_entry(last), encode_event(&event).unwrap()),
                (keys.revision_entry().to_vec(), b"5-0".to_vec()),
            ],
        );

        assert_eq!(
            open_error_detail(backend.clone(), "c"),
            "revision pointer 5-0 does not match last change 4-0"
        );

        // Repairing the pointer makes the same entries load.
        write_raw(
            &backend,
            "c",
            vec![(keys.revision_entry().to_vec(), b"4-0".to_vec())],
        );
        let collection = Collection::open(backend, "c", false).unwrap();
        assert_eq!(collection.revision(), last);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.changes(), vec![event]);
    }
}
