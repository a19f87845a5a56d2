//! Storage engine: versioned collections layered on a transactional sled substrate.
//!
//! Each collection keeps five structures (values, key index, version index, change log and
//! revision pointer) and every mutation updates all of them in one atomic commit:
//!
//! 1. A per-collection write lock serializes mutations.
//! 2. The mutation stages its writes and change events in a [`Transaction`].
//! 3. The staged writes go to disk as a single `sled::Batch`.
//! 4. Only after the batch is applied does the in-memory mirror change, so readers holding the
//!    read lock always see data and revision from the same commit.

pub mod backend;
pub mod collection;
pub mod event;
pub mod index;
pub mod mutation;
pub mod query;
pub mod revision;
pub mod schema;

pub use backend::{Backend, BackendConfig, BackendError, BackendResult};
pub use collection::{Collection, Transaction};
pub use event::{ChangeEvent, CollectionItem};
pub use index::{KeyIndex, VersionIndex};
pub use mutation::{ConditionalResult, RangeRemoveResult, WriteResult, DEFAULT_MAXLEN};
pub use query::{GetResult, ItemsResult};
pub use revision::{Revision, RevisionError};
pub use schema::StructureKeys;

use thiserror::Error;

use crate::range::RangeError;
use crate::version::VersionError;

/// Storage engine errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Revision error: {0}")]
    Revision(#[from] RevisionError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Inconsistent collection {collection}: {detail}")]
    Inconsistent { collection: String, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<sled::Error> for StorageError {
    fn from(e: sled::Error) -> Self {
        StorageError::Backend(BackendError::SledError(e))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
