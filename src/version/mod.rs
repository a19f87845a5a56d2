//! Version domain: extended reals (any finite `f64`, plus `+inf` and `-inf`).
//!
//! Versions are attached to every live key and drive optimistic concurrency. This module
//! provides the canonical text encoding used both for persisted versions and for version-range
//! boundary tokens, and the comparison operators used by conditional mutations.

pub mod codec;
pub mod compare;

pub use codec::{decode_version, encode_version, NEG_INFINITY_TOKEN, POS_INFINITY_TOKEN};
pub use compare::{CompareOp, CompareOpError};

use thiserror::Error;

/// A version value. `f64::INFINITY` and `f64::NEG_INFINITY` are valid, NaN is not.
pub type Version = f64;

/// Version assigned by `set` when the caller does not pick one.
pub const DEFAULT_VERSION: Version = f64::INFINITY;

/// Version reported for keys that do not exist.
pub const ABSENT_VERSION: Version = 0.0;

/// Version codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version token: {0:?}")]
    InvalidToken(String),

    #[error("NaN is not a valid version")]
    NotANumber,
}

/// Serde adapter that writes versions as their canonical token so infinities survive JSON.
pub mod serde_token {
    use super::{decode_version, encode_version, Version};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &Version, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_version(*version))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let token = String::deserialize(deserializer)?;
        decode_version(&token).map_err(de::Error::custom)
    }
}
