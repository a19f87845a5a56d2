//! In-memory ordered indexes mirroring a collection's `keys` and `versions` structures.
//!
//! - [`KeyIndex`] keeps live keys in byte-lexicographic order for key-range scans.
//! - [`VersionIndex`] maps each live key to its version and keeps `(version, key)` pairs
//!   ordered for version-range scans. Ties on version are broken by key.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use crate::range::{KeyRange, VersionRange};
use crate::version::Version;

/// Live keys in lexicographic order.
#[derive(Clone, Debug, Default)]
pub struct KeyIndex {
    tree: BTreeSet<Vec<u8>>,
}

impl KeyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &[u8]) {
        if !self.tree.contains(key) {
            self.tree.insert(key.to_vec());
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        self.tree.remove(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.tree.contains(key)
    }

    /// Returns all keys in `range`, ascending.
    pub fn range(&self, range: &KeyRange) -> Vec<Vec<u8>> {
        match range.bounds() {
            Some(bounds) => self.tree.range::<[u8], _>(bounds).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.tree.iter()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// Total order over non-NaN versions in which `-0` and `0` are equal.
#[derive(Clone, Copy, Debug)]
struct Score(f64);

impl Score {
    fn new(version: Version) -> Self {
        // Collapse -0 onto 0 so the index agrees with IEEE comparison.
        Score(if version == 0.0 { 0.0 } else { version })
    }
}

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Live keys with their versions, ordered by version.
#[derive(Clone, Debug, Default)]
pub struct VersionIndex {
    by_key: HashMap<Vec<u8>, Version>,
    by_version: BTreeSet<(Score, Vec<u8>)>,
}

impl VersionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the version of `key`, replacing any previous one.
    pub fn insert(&mut self, key: &[u8], version: Version) {
        if let Some(previous) = self.by_key.insert(key.to_vec(), version) {
            self.by_version.remove(&(Score::new(previous), key.to_vec()));
        }
        self.by_version.insert((Score::new(version), key.to_vec()));
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Version> {
        let previous = self.by_key.remove(key)?;
        self.by_version.remove(&(Score::new(previous), key.to_vec()));
        Some(previous)
    }

    pub fn get(&self, key: &[u8]) -> Option<Version> {
        self.by_key.get(key).copied()
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.by_key.contains_key(key)
    }

    /// Returns `(key, version)` for every key whose version is in `range`, ascending by version.
    pub fn range(&self, range: &VersionRange) -> Vec<(Vec<u8>, Version)> {
        let start = (Score::new(range.min.value), Vec::new());

        self.by_version
            .range((Bound::Included(start), Bound::Unbounded))
            .filter_map(|(_, key)| self.by_key.get(key).map(|v| (key, *v)))
            .skip_while(|(_, version)| !range.above_min(*version))
            .take_while(|(_, version)| range.below_max(*version))
            .map(|(key, version)| (key.clone(), version))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::VersionBound;

    fn keys_of(items: Vec<(Vec<u8>, Version)>) -> Vec<Vec<u8>> {
        items.into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_key_index_range() {
        let mut index = KeyIndex::new();
        let keys: [&[u8]; 4] = [b"a", b"b", b"c", b"d"];
        for key in keys {
            index.insert(key);
        }

        let range = KeyRange::parse(b"[b", b"(d").unwrap();
        assert_eq!(index.range(&range), vec![b"b".to_vec(), b"c".to_vec()]);

        let range = KeyRange::parse(b"(b", b"+").unwrap();
        assert_eq!(index.range(&range), vec![b"c".to_vec(), b"d".to_vec()]);

        let empty = KeyRange::parse(b"[d", b"(a").unwrap();
        assert!(index.range(&empty).is_empty());
    }

    #[test]
    fn test_key_index_insert_remove() {
        let mut index = KeyIndex::new();
        index.insert(b"a");
        index.insert(b"a");
        assert_eq!(index.len(), 1);
        assert!(index.remove(b"a"));
        assert!(!index.remove(b"a"));
        assert!(index.is_empty());
    }

    #[test]
    fn test_version_index_update_moves_entry() {
        let mut index = VersionIndex::new();
        index.insert(b"k", 1.0);
        index.insert(b"k", 5.0);
        assert_eq!(index.get(b"k"), Some(5.0));
        assert_eq!(index.len(), 1);

        let low = VersionRange::new(VersionBound::inclusive(0.0), VersionBound::inclusive(2.0));
        assert!(index.range(&low).is_empty());
    }

    #[test]
    fn test_version_index_range_order_and_bounds() {
        let mut index = VersionIndex::new();
        index.insert(b"key-3", f64::INFINITY);
        index.insert(b"key-1", f64::NEG_INFINITY);
        index.insert(b"key-2", 0.0);
        index.insert(b"key-0", 0.0);

        let all = index.range(&VersionRange::all());
        assert_eq!(
            keys_of(all),
            vec![
                b"key-1".to_vec(),
                b"key-0".to_vec(),
                b"key-2".to_vec(),
                b"key-3".to_vec()
            ]
        );

        let above_zero = VersionRange::parse("(0", "inf").unwrap();
        assert_eq!(keys_of(index.range(&above_zero)), vec![b"key-3".to_vec()]);

        let below_inf = VersionRange::parse("-inf", "(inf").unwrap();
        assert_eq!(index.range(&below_inf).len(), 3);

        let zero = VersionRange::parse("0", "0").unwrap();
        assert_eq!(
            keys_of(index.range(&zero)),
            vec![b"key-0".to_vec(), b"key-2".to_vec()]
        );
    }

    #[test]
    fn test_version_index_signed_zero() {
        let mut index = VersionIndex::new();
        index.insert(b"neg", -0.0);
        let zero = VersionRange::parse("0", "0").unwrap();
        assert_eq!(keys_of(index.range(&zero)), vec![b"neg".to_vec()]);
        assert!(index.get(b"neg").unwrap().is_sign_negative());
    }

    #[test]
    fn test_version_index_remove() {
        let mut index = VersionIndex::new();
        index.insert(b"k", 3.0);
        assert_eq!(index.remove(b"k"), Some(3.0));
        assert_eq!(index.remove(b"k"), None);
        assert!(index.range(&VersionRange::all()).is_empty());
    }
}
