//! Collection schema: the five named structures every collection owns.
//!
//! Structure keys are derived as `"<collection>:<suffix>"`:
//! - `values`: key -> value
//! - `keys`: live keys, byte-lexicographic order
//! - `versions`: key -> version token, ordered by version
//! - `changes`: append-only change log, keyed by revision
//! - `revision`: revision of the newest change log entry
//!
//! Inside a collection's sled tree, member entries of the map-like structures are stored at
//! `<structure key> 0x00 <member>`; the revision pointer is the bare `revision` structure key.

use super::revision::Revision;

pub const VALUES_SUFFIX: &str = "values";
pub const KEYS_SUFFIX: &str = "keys";
pub const VERSIONS_SUFFIX: &str = "versions";
pub const CHANGES_SUFFIX: &str = "changes";
pub const REVISION_SUFFIX: &str = "revision";

const MEMBER_SEPARATOR: u8 = 0x00;

/// Derives the key of one of a collection's structures.
pub fn structure_key(collection: &str, suffix: &str) -> String {
    format!("{}:{}", collection, suffix)
}

/// All structure keys of one collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructureKeys {
    pub values: String,
    pub keys: String,
    pub versions: String,
    pub changes: String,
    pub revision: String,
}

impl StructureKeys {
    pub fn for_collection(collection: &str) -> Self {
        Self {
            values: structure_key(collection, VALUES_SUFFIX),
            keys: structure_key(collection, KEYS_SUFFIX),
            versions: structure_key(collection, VERSIONS_SUFFIX),
            changes: structure_key(collection, CHANGES_SUFFIX),
            revision: structure_key(collection, REVISION_SUFFIX),
        }
    }

    pub fn value_entry(&self, key: &[u8]) -> Vec<u8> {
        member_entry(&self.values, key)
    }

    pub fn key_entry(&self, key: &[u8]) -> Vec<u8> {
        member_entry(&self.keys, key)
    }

    pub fn version_entry(&self, key: &[u8]) -> Vec<u8> {
        member_entry(&self.versions, key)
    }

    pub fn change_entry(&self, revision: Revision) -> Vec<u8> {
        member_entry(&self.changes, &revision.to_be_bytes())
    }

    pub fn values_prefix(&self) -> Vec<u8> {
        member_entry(&self.values, &[])
    }

    pub fn keys_prefix(&self) -> Vec<u8> {
        member_entry(&self.keys, &[])
    }

    pub fn versions_prefix(&self) -> Vec<u8> {
        member_entry(&self.versions, &[])
    }

    pub fn changes_prefix(&self) -> Vec<u8> {
        member_entry(&self.changes, &[])
    }

    pub fn revision_entry(&self) -> &[u8] {
        self.revision.as_bytes()
    }
}

fn member_entry(structure: &str, member: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(structure.len() + 1 + member.len());
    entry.extend_from_slice(structure.as_bytes());
    entry.push(MEMBER_SEPARATOR);
    entry.extend_from_slice(member);
    entry
}
