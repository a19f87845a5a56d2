//! Range boundaries for key-range and version-range queries.
//!
//! Key ranges use lexicographic boundary tokens:
//! - `-` : unbounded low
//! - `+` : unbounded high
//! - `[v`: inclusive at `v`
//! - `(v`: exclusive at `v`
//!
//! Version ranges use a version token (inclusive) or the token prefixed with `(` (exclusive).
//! Prefix ranges are derived with [`prefix_successor`], the smallest byte string greater than
//! every string starting with the prefix.

use std::ops::Bound;

use thiserror::Error;

use crate::version::{decode_version, encode_version, Version};

/// Range boundary errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("Invalid key range boundary: {0:?}")]
    InvalidKeyBoundary(String),

    #[error("Invalid version range boundary: {0:?}")]
    InvalidVersionBoundary(String),

    #[error("Invalid prefix: must have at least one byte not equal to 0xFF")]
    UnboundedPrefix,
}

pub type RangeResult<T> = Result<T, RangeError>;

/// One end of a lexicographic key range.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyBound {
    /// `-`
    Min,
    /// `+`
    Max,
    /// `[v`
    Inclusive(Vec<u8>),
    /// `(v`
    Exclusive(Vec<u8>),
}

impl KeyBound {
    /// Parses a boundary token.
    pub fn parse(token: &[u8]) -> RangeResult<Self> {
        match token {
            b"-" => Ok(KeyBound::Min),
            b"+" => Ok(KeyBound::Max),
            [b'[', rest @ ..] => Ok(KeyBound::Inclusive(rest.to_vec())),
            [b'(', rest @ ..] => Ok(KeyBound::Exclusive(rest.to_vec())),
            _ => Err(RangeError::InvalidKeyBoundary(
                String::from_utf8_lossy(token).into_owned(),
            )),
        }
    }

    /// Renders the boundary back to its token.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            KeyBound::Min => b"-".to_vec(),
            KeyBound::Max => b"+".to_vec(),
            KeyBound::Inclusive(v) => [b"[".as_slice(), v.as_slice()].concat(),
            KeyBound::Exclusive(v) => [b"(".as_slice(), v.as_slice()].concat(),
        }
    }
}

/// A lexicographic key range `[min, max]` under [`KeyBound`] semantics.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub min: KeyBound,
    pub max: KeyBound,
}

impl KeyRange {
    pub fn new(min: KeyBound, max: KeyBound) -> Self {
        Self { min, max }
    }

    /// Parses a range from two boundary tokens.
    pub fn parse(min: &[u8], max: &[u8]) -> RangeResult<Self> {
        Ok(Self::new(KeyBound::parse(min)?, KeyBound::parse(max)?))
    }

    /// Every key.
    pub fn all() -> Self {
        Self::new(KeyBound::Min, KeyBound::Max)
    }

    /// All keys starting with `prefix`: `[prefix, successor(prefix))`.
    pub fn prefix(prefix: &[u8]) -> RangeResult<Self> {
        Ok(Self::new(
            KeyBound::Inclusive(prefix.to_vec()),
            KeyBound::Exclusive(prefix_successor(prefix)?),
        ))
    }

    fn lower(&self) -> Option<Bound<&[u8]>> {
        match &self.min {
            KeyBound::Min => Some(Bound::Unbounded),
            KeyBound::Max => None,
            KeyBound::Inclusive(v) => Some(Bound::Included(v.as_slice())),
            KeyBound::Exclusive(v) => Some(Bound::Excluded(v.as_slice())),
        }
    }

    fn upper(&self) -> Option<Bound<&[u8]>> {
        match &self.max {
            KeyBound::Min => None,
            KeyBound::Max => Some(Bound::Unbounded),
            KeyBound::Inclusive(v) => Some(Bound::Included(v.as_slice())),
            KeyBound::Exclusive(v) => Some(Bound::Excluded(v.as_slice())),
        }
    }

    /// Returns the range as `std` bounds, or `None` when it cannot contain any key.
    ///
    /// The returned pair is always safe to hand to `BTreeSet::range`.
    pub fn bounds(&self) -> Option<(Bound<&[u8]>, Bound<&[u8]>)> {
        let lower = self.lower()?;
        let upper = self.upper()?;

        let (lo, hi) = match (lower, upper) {
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
                (lo, hi)
            }
            _ => return Some((lower, upper)),
        };

        if lo > hi {
            return None;
        }
        if lo == hi && !matches!((lower, upper), (Bound::Included(_), Bound::Included(_))) {
            return None;
        }

        Some((lower, upper))
    }

    /// Checks if a key falls within this range.
    pub fn contains(&self, key: &[u8]) -> bool {
        let Some((lower, upper)) = self.bounds() else {
            return false;
        };

        let above = match lower {
            Bound::Unbounded => true,
            Bound::Included(lo) => key >= lo,
            Bound::Excluded(lo) => key > lo,
        };
        let below = match upper {
            Bound::Unbounded => true,
            Bound::Included(hi) => key <= hi,
            Bound::Excluded(hi) => key < hi,
        };

        above && below
    }
}

/// Computes the smallest byte string greater than every string that starts with `prefix`.
///
/// Trailing `0xFF` bytes are dropped and the last remaining byte is incremented. Fails when the
/// prefix has no byte other than `0xFF` (including the empty prefix): no finite successor exists.
pub fn prefix_successor(prefix: &[u8]) -> RangeResult<Vec<u8>> {
    let last = prefix
        .iter()
        .rposition(|&b| b != 0xFF)
        .ok_or(RangeError::UnboundedPrefix)?;

    let mut successor = prefix[..=last].to_vec();
    successor[last] += 1;
    Ok(successor)
}

/// Builds the `(min, max)` boundary tokens selecting every key that starts with `prefix`.
pub fn make_prefix_range(prefix: &[u8]) -> RangeResult<(Vec<u8>, Vec<u8>)> {
    let range = KeyRange::prefix(prefix)?;
    Ok((range.min.encode(), range.max.encode()))
}

/// One end of a version range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VersionBound {
    pub value: Version,
    pub exclusive: bool,
}

impl VersionBound {
    pub fn inclusive(value: Version) -> Self {
        Self {
            value,
            exclusive: false,
        }
    }

    pub fn exclusive(value: Version) -> Self {
        Self {
            value,
            exclusive: true,
        }
    }

    /// Parses `token` or `(token`.
    pub fn parse(token: &str) -> RangeResult<Self> {
        let (exclusive, body) = match token.strip_prefix('(') {
            Some(body) => (true, body),
            None => (false, token),
        };

        let value = decode_version(body)
            .map_err(|_| RangeError::InvalidVersionBoundary(token.to_string()))?;

        Ok(Self { value, exclusive })
    }

    pub fn encode(&self) -> String {
        let token = encode_version(self.value);
        if self.exclusive {
            format!("({}", token)
        } else {
            token
        }
    }
}

/// A version range `[min, max]` under [`VersionBound`] semantics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VersionRange {
    pub min: VersionBound,
    pub max: VersionBound,
}

impl VersionRange {
    pub fn new(min: VersionBound, max: VersionBound) -> Self {
        Self { min, max }
    }

    pub fn parse(min: &str, max: &str) -> RangeResult<Self> {
        Ok(Self::new(VersionBound::parse(min)?, VersionBound::parse(max)?))
    }

    /// Every version, `-inf` through `inf` inclusive.
    pub fn all() -> Self {
        Self::new(
            VersionBound::inclusive(f64::NEG_INFINITY),
            VersionBound::inclusive(f64::INFINITY),
        )
    }

    pub fn above_min(&self, version: Version) -> bool {
        if self.min.exclusive {
            version > self.min.value
        } else {
            version >= self.min.value
        }
    }

    pub fn below_max(&self, version: Version) -> bool {
        if self.max.exclusive {
            version < self.max.value
        } else {
            version <= self.max.value
        }
    }

    pub fn contains(&self, version: Version) -> bool {
        self.above_min(version) && self.below_max(version)
    }
}
