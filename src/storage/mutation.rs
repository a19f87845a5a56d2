//! Mutation engine.
//!
//! Every operation runs through [`Collection::mutate`], so it reads the current state and stages
//! its writes under the collection's write lock and commits all five structures in one batch.
//! Each operation takes a `maxlen` bound applied to the change log after its events are appended.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::collection::{Collection, CollectionState, Transaction};
use super::revision::Revision;
use super::StorageResult;
use crate::range::{KeyRange, VersionRange};
use crate::version::{CompareOp, Version, VersionError};

/// Default change-log length bound.
pub const DEFAULT_MAXLEN: usize = 1000;

/// Result of an unconditional write.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    pub revision: Revision,
}

/// Result of a conditional write. `success` reports the comparison outcome only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalResult {
    pub revision: Revision,
    pub success: bool,
}

/// Result of a bulk range removal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeRemoveResult {
    pub revision: Revision,
    #[serde(rename = "removedCount")]
    pub removed_count: usize,
}

fn check_version(version: Version) -> StorageResult<()> {
    if version.is_nan() {
        return Err(VersionError::NotANumber.into());
    }
    Ok(())
}

fn compare(state: &CollectionState, key: &[u8], op: CompareOp, operand: Version) -> bool {
    op.evaluate(state.version_or_absent(key), operand)
}

fn delete_all(state: &CollectionState, txn: &mut Transaction, keys: &[Vec<u8>]) -> usize {
    for key in keys {
        debug_assert!(state.contains(key));
        txn.delete(key);
    }
    keys.len()
}

impl Collection {
    /// Upserts `key` with `value` and `version`. Always appends one `Set` event.
    pub fn set(
        &self,
        key: &[u8],
        value: &[u8],
        version: Version,
        maxlen: usize,
    ) -> StorageResult<WriteResult> {
        check_version(version)?;

        let (_, revision) = self.mutate(maxlen, |_, txn| {
            txn.put(key, value, version);
            Ok(())
        })?;

        debug!(
            "Set key {:?} at revision {} in {}",
            String::from_utf8_lossy(key),
            revision,
            self.name()
        );
        Ok(WriteResult { revision })
    }

    /// Upserts `key` only if `current_version op operand` holds, with an absent key at version 0.
    pub fn compare_and_set(
        &self,
        key: &[u8],
        op: CompareOp,
        operand: Version,
        value: &[u8],
        version: Version,
        maxlen: usize,
    ) -> StorageResult<ConditionalResult> {
        check_version(operand)?;
        check_version(version)?;

        let (success, revision) = self.mutate(maxlen, |state, txn| {
            let success = compare(state, key, op, operand);
            if success {
                txn.put(key, value, version);
            }
            Ok(success)
        })?;

        debug!(
            "Compare-and-set key {:?} ({} {}): success={} revision={}",
            String::from_utf8_lossy(key),
            op,
            operand,
            success,
            revision
        );
        Ok(ConditionalResult { revision, success })
    }

    /// Deletes `key`. Removing an absent key is a no-op that leaves the revision unchanged.
    pub fn remove(&self, key: &[u8], maxlen: usize) -> StorageResult<WriteResult> {
        let (removed, revision) = self.mutate(maxlen, |state, txn| {
            let present = state.contains(key);
            if present {
                txn.delete(key);
            }
            Ok(present)
        })?;

        if removed {
            debug!(
                "Removed key {:?} at revision {}",
                String::from_utf8_lossy(key),
                revision
            );
        }
        Ok(WriteResult { revision })
    }

    /// Deletes `key` if the comparison holds and the key exists.
    ///
    /// `success` is the comparison result; a satisfied comparison on an absent key appends
    /// nothing.
    pub fn compare_and_remove(
        &self,
        key: &[u8],
        op: CompareOp,
        operand: Version,
        maxlen: usize,
    ) -> StorageResult<ConditionalResult> {
        check_version(operand)?;

        let (success, revision) = self.mutate(maxlen, |state, txn| {
            let success = compare(state, key, op, operand);
            if success && state.contains(key) {
                txn.delete(key);
            }
            Ok(success)
        })?;

        debug!(
            "Compare-and-remove key {:?} ({} {}): success={} revision={}",
            String::from_utf8_lossy(key),
            op,
            operand,
            success,
            revision
        );
        Ok(ConditionalResult { revision, success })
    }

    /// Deletes every live key in `range`, in ascending key order.
    pub fn remove_key_range(
        &self,
        range: &KeyRange,
        maxlen: usize,
    ) -> StorageResult<RangeRemoveResult> {
        let (removed_count, revision) = self.mutate(maxlen, |state, txn| {
            let keys = state.key_index.range(range);
            Ok(delete_all(state, txn, &keys))
        })?;

        debug!(
            "Removed {} keys by key range at revision {}",
            removed_count, revision
        );
        Ok(RangeRemoveResult {
            revision,
            removed_count,
        })
    }

    /// Deletes every live key whose version is in `range`, in ascending version order with ties
    /// broken by key.
    pub fn remove_version_range(
        &self,
        range: &VersionRange,
        maxlen: usize,
    ) -> StorageResult<RangeRemoveResult> {
        let (removed_count, revision) = self.mutate(maxlen, |state, txn| {
            let keys: Vec<Vec<u8>> = state
                .version_index
                .range(range)
                .into_iter()
                .map(|(key, _)| key)
                .collect();
            Ok(delete_all(state, txn, &keys))
        })?;

        debug!(
            "Removed {} keys by version range at revision {}",
            removed_count, revision
        );
        Ok(RangeRemoveResult {
            revision,
            removed_count,
        })
    }

    /// Deletes every live key starting with `prefix`.
    pub fn remove_prefix(&self, prefix: &[u8], maxlen: usize) -> StorageResult<RangeRemoveResult> {
        let range = KeyRange::prefix(prefix)?;
        self.remove_key_range(&range, maxlen)
    }
}
