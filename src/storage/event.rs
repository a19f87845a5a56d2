//! Change events, snapshot rows, and the persisted change-log record.

use serde::{Deserialize, Serialize};

use super::revision::Revision;
use super::{StorageError, StorageResult};
use crate::version::{decode_version, encode_version, serde_token, Version};

/// One snapshot row returned by queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    #[serde(with = "serde_token")]
    pub version: Version,
}

/// An immutable change-log entry.
///
/// Every event records the revision of the entry before it (`prev_revision`), so a reader can
/// tell whether it has seen the log contiguously.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChangeEvent {
    /// A key was created or overwritten.
    Set {
        revision: Revision,
        #[serde(rename = "prevRevision")]
        prev_revision: Revision,
        key: Vec<u8>,
        value: Vec<u8>,
        #[serde(with = "serde_token")]
        version: Version,
    },
    /// A key was deleted.
    Remove {
        revision: Revision,
        #[serde(rename = "prevRevision")]
        prev_revision: Revision,
        key: Vec<u8>,
    },
}

impl ChangeEvent {
    pub fn revision(&self) -> Revision {
        match self {
            ChangeEvent::Set { revision, .. } | ChangeEvent::Remove { revision, .. } => *revision,
        }
    }

    pub fn prev_revision(&self) -> Revision {
        match self {
            ChangeEvent::Set { prev_revision, .. } | ChangeEvent::Remove { prev_revision, .. } => {
                *prev_revision
            }
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            ChangeEvent::Set { key, .. } | ChangeEvent::Remove { key, .. } => key,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, ChangeEvent::Set { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, ChangeEvent::Remove { .. })
    }
}

/// Persisted form of a change-log entry. The entry's own revision is its storage key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum LogRecord {
    Set {
        prev: Revision,
        key: Vec<u8>,
        value: Vec<u8>,
        version: String,
    },
    Remove {
        prev: Revision,
        key: Vec<u8>,
    },
}

/// Encodes an event for the change-log structure.
pub(crate) fn encode_event(event: &ChangeEvent) -> StorageResult<Vec<u8>> {
    let record = match event {
        ChangeEvent::Set {
            prev_revision,
            key,
            value,
            version,
            ..
        } => LogRecord::Set {
            prev: *prev_revision,
            key: key.clone(),
            value: value.clone(),
            version: encode_version(*version),
        },
        ChangeEvent::Remove {
            prev_revision, key, ..
        } => LogRecord::Remove {
            prev: *prev_revision,
            key: key.clone(),
        },
    };

    bincode::serialize(&record)
        .map_err(|e| StorageError::Encoding(format!("change record: {}", e)))
}

/// Decodes a change-log entry stored at `revision`.
pub(crate) fn decode_event(revision: Revision, data: &[u8]) -> StorageResult<ChangeEvent> {
    let record: LogRecord = bincode::deserialize(data)
        .map_err(|e| StorageError::Encoding(format!("change record at {}: {}", revision, e)))?;

    Ok(match record {
        LogRecord::Set {
            prev,
            key,
            value,
            version,
        } => ChangeEvent::Set {
            revision,
            prev_revision: prev,
            key,
            value,
            version: decode_version(&version)?,
        },
        LogRecord::Remove { prev, key } => ChangeEvent::Remove {
            revision,
            prev_revision: prev,
            key,
        },
    })
}
