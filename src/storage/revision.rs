//! Change-log revisions.
//!
//! A revision identifies one entry of a collection's change log. It is a `(millis, seq)` pair
//! rendered as `"<millis>-<seq>"`; `"0-0"` means the log has never had an entry. Revisions are
//! allocated strictly increasing per collection, whatever the wall clock does.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid revision: {0:?}")]
pub struct RevisionError(pub String);

/// A change-log position, ordered by `(millis, seq)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    /// Wall-clock milliseconds at allocation time (never decreasing within a collection)
    pub millis: u64,
    /// Sequence within `millis`
    pub seq: u64,
}

impl Revision {
    /// The revision of an empty log.
    pub const ZERO: Revision = Revision { millis: 0, seq: 0 };

    pub fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Allocates the revision that follows `self` given the current clock reading.
    pub fn next(&self, now_millis: u64) -> Revision {
        if now_millis > self.millis {
            Revision::new(now_millis, 0)
        } else {
            Revision::new(self.millis, self.seq + 1)
        }
    }

    /// Allocates the revision that follows `self` using the system clock.
    pub fn next_now(&self) -> Revision {
        self.next(now_millis())
    }

    /// Big-endian encoding; byte order matches revision order.
    pub fn to_be_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.millis.to_be_bytes());
        buf[8..].copy_from_slice(&self.seq.to_be_bytes());
        buf
    }

    pub fn from_be_bytes(data: &[u8]) -> Result<Self, RevisionError> {
        let bytes: [u8; 16] = data
            .try_into()
            .map_err(|_| RevisionError(format!("{} bytes", data.len())))?;
        let mut millis = [0u8; 8];
        let mut seq = [0u8; 8];
        millis.copy_from_slice(&bytes[..8]);
        seq.copy_from_slice(&bytes[8..]);
        Ok(Revision::new(u64::from_be_bytes(millis), u64::from_be_bytes(seq)))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for Revision {
    type Err = RevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (millis, seq) = s.split_once('-').ok_or_else(|| RevisionError(s.to_string()))?;
        let millis = millis.parse().map_err(|_| RevisionError(s.to_string()))?;
        let seq = seq.parse().map_err(|_| RevisionError(s.to_string()))?;
        Ok(Revision::new(millis, seq))
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
