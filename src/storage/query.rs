//! Query engine.
//!
//! Each read holds the collection's read lock for its whole duration, so the returned revision
//! and data always come from the same commit.

use serde::{Deserialize, Serialize};

use super::collection::{Collection, CollectionState};
use super::event::CollectionItem;
use super::revision::Revision;
use super::StorageResult;
use crate::range::{KeyRange, VersionRange};
use crate::version::{serde_token, Version};

/// Result of a point read. An absent key has no value and version 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    pub revision: Revision,
    pub value: Option<Vec<u8>>,
    #[serde(with = "serde_token")]
    pub version: Version,
}

/// Snapshot rows paired with the revision they were read at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemsResult {
    pub revision: Revision,
    pub items: Vec<CollectionItem>,
}

fn collect_items<'a>(
    state: &CollectionState,
    keys: impl IntoIterator<Item = &'a Vec<u8>>,
) -> ItemsResult {
    ItemsResult {
        revision: state.revision(),
        items: keys.into_iter().filter_map(|key| state.item(key)).collect(),
    }
}

impl Collection {
    pub fn get(&self, key: &[u8]) -> GetResult {
        let state = self.snapshot();
        GetResult {
            revision: state.revision(),
            value: state.values.get(key).cloned(),
            version: state.version_or_absent(key),
        }
    }

    /// Every live item, in key order.
    pub fn get_all(&self) -> ItemsResult {
        let state = self.snapshot();
        collect_items(&state, state.key_index.keys())
    }

    /// Live items whose key is in `range`, ascending by key.
    pub fn get_key_range(&self, range: &KeyRange) -> ItemsResult {
        let state = self.snapshot();
        let keys = state.key_index.range(range);
        collect_items(&state, &keys)
    }

    /// Live items whose version is in `range`, ascending by version.
    pub fn get_version_range(&self, range: &VersionRange) -> ItemsResult {
        let state = self.snapshot();
        let keys: Vec<Vec<u8>> = state
            .version_index
            .range(range)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        collect_items(&state, &keys)
    }

    /// Live items whose key starts with `prefix`.
    pub fn get_prefix(&self, prefix: &[u8]) -> StorageResult<ItemsResult> {
        let range = KeyRange::prefix(prefix)?;
        Ok(self.get_key_range(&range))
    }
}
