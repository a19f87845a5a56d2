//! Batched mutations.
//!
//! A batch is a list of independent mutations. Each one commits as its own transaction in
//! submission order; a failure is reported for that mutation only and later ones still run.

use serde::Serialize;

use crate::range::{KeyRange, VersionRange};
use crate::storage::{
    Collection, ConditionalResult, RangeRemoveResult, Revision, StorageResult, WriteResult,
};
use crate::version::{CompareOp, Version};

/// One mutation of a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        version: Version,
    },
    CompareAndSet {
        key: Vec<u8>,
        op: CompareOp,
        operand: Version,
        value: Vec<u8>,
        version: Version,
    },
    Remove {
        key: Vec<u8>,
    },
    CompareAndRemove {
        key: Vec<u8>,
        op: CompareOp,
        operand: Version,
    },
    RemoveKeyRange(KeyRange),
    RemoveVersionRange(VersionRange),
    RemovePrefix(Vec<u8>),
}

/// Result of one batched mutation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MutationOutcome {
    Write(WriteResult),
    Conditional(ConditionalResult),
    RangeRemove(RangeRemoveResult),
}

impl MutationOutcome {
    /// Revision pointer after the mutation.
    pub fn revision(&self) -> Revision {
        match self {
            MutationOutcome::Write(r) => r.revision,
            MutationOutcome::Conditional(r) => r.revision,
            MutationOutcome::RangeRemove(r) => r.revision,
        }
    }
}

impl Mutation {
    /// Applies the mutation to `collection` as one transaction.
    pub fn apply(&self, collection: &Collection, maxlen: usize) -> StorageResult<MutationOutcome> {
        Ok(match self {
            Mutation::Set {
                key,
                value,
                version,
            } => MutationOutcome::Write(collection.set(key, value, *version, maxlen)?),
            Mutation::CompareAndSet {
                key,
                op,
                operand,
                value,
                version,
            } => MutationOutcome::Conditional(
                collection.compare_and_set(key, *op, *operand, value, *version, maxlen)?,
            ),
            Mutation::Remove { key } => MutationOutcome::Write(collection.remove(key, maxlen)?),
            Mutation::CompareAndRemove { key, op, operand } => MutationOutcome::Conditional(
                collection.compare_and_remove(key, *op, *operand, maxlen)?,
            ),
            Mutation::RemoveKeyRange(range) => {
                MutationOutcome::RangeRemove(collection.remove_key_range(range, maxlen)?)
            }
            Mutation::RemoveVersionRange(range) => {
                MutationOutcome::RangeRemove(collection.remove_version_range(range, maxlen)?)
            }
            Mutation::RemovePrefix(prefix) => {
                MutationOutcome::RangeRemove(collection.remove_prefix(prefix, maxlen)?)
            }
        })
    }
}
