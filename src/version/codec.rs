//! Canonical text encoding of versions.
//!
//! Finite values render as decimal text (shortest representation that parses back to the same
//! `f64`), infinities as fixed sentinel tokens that no decimal rendering can produce.

use super::{Version, VersionError};

/// Token for `+inf`.
pub const POS_INFINITY_TOKEN: &str = "inf";

/// Token for `-inf`.
pub const NEG_INFINITY_TOKEN: &str = "-inf";

/// Encodes a version to its canonical token.
pub fn encode_version(version: Version) -> String {
    if version == f64::INFINITY {
        POS_INFINITY_TOKEN.to_string()
    } else if version == f64::NEG_INFINITY {
        NEG_INFINITY_TOKEN.to_string()
    } else {
        version.to_string()
    }
}

/// Decodes a canonical token back to a version.
///
/// `+inf` is accepted as an alias of `inf`. Any other non-decimal spelling that `f64::from_str`
/// would tolerate (`infinity`, `NaN`, ...) is rejected.
pub fn decode_version(token: &str) -> Result<Version, VersionError> {
    match token {
        POS_INFINITY_TOKEN | "+inf" => return Ok(f64::INFINITY),
        NEG_INFINITY_TOKEN => return Ok(f64::NEG_INFINITY),
        _ => {}
    }

    let is_decimal = !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'));
    if !is_decimal {
        return Err(VersionError::InvalidToken(token.to_string()));
    }

    let version: f64 = token
        .parse()
        .map_err(|_| VersionError::InvalidToken(token.to_string()))?;

    if version.is_nan() {
        return Err(VersionError::NotANumber);
    }

    Ok(version)
}
