//! # livecol: versioned key-value collections with a tailable change log
//!
//! A collection maps byte-string keys to byte-string values, each tagged with a numeric version
//! (any finite `f64` or ±∞). Every mutation commits atomically and appends chained change events,
//! so readers can:
//!
//! - **Query** a consistent snapshot: point get, full scan, key range, version range, or prefix
//! - **Mutate** unconditionally or with a version comparison (optimistic concurrency)
//! - **Watch** the change log from a known revision, with gap detection when trimming outruns
//!   a slow reader
//!
//! Collections are stored in an embedded sled database.
//!
//! ```no_run
//! use livecol::{Store, StoreConfig, Revision, DEFAULT_MAXLEN};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreConfig::default())?;
//! let users = store.collection("users")?;
//!
//! let written = users.set(b"alice", b"admin", 1.0, DEFAULT_MAXLEN)?;
//! assert_eq!(users.get(b"alice").value.as_deref(), Some(&b"admin"[..]));
//!
//! let mut watcher = store.watch("users", Revision::ZERO, None)?;
//! let batch = watcher.next_batch().await?;
//! assert_eq!(batch.map(|events| events.len()), Some(1));
//! # let _ = written;
//! # Ok(())
//! # }
//! ```

pub mod range;
pub mod storage;
pub mod store;
pub mod version;
pub mod watch;

pub use range::{KeyBound, KeyRange, RangeError, VersionBound, VersionRange};
pub use storage::{
    ChangeEvent, Collection, CollectionItem, ConditionalResult, GetResult, ItemsResult,
    RangeRemoveResult, Revision, StorageError, StorageResult, WriteResult, DEFAULT_MAXLEN,
};
pub use store::{Mutation, MutationOutcome, Store, StoreConfig};
pub use version::{CompareOp, Version, VersionError, DEFAULT_VERSION};
pub use watch::{WatchCancel, WatchError, WatchState, Watcher};
