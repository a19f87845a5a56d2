//! Comparison operators for conditional mutations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown compare operator: {0:?}")]
pub struct CompareOpError(pub String);

/// One of `<`, `<=`, `==`, `!=`, `>=`, `>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = ">")]
    Greater,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Less,
        CompareOp::LessOrEqual,
        CompareOp::Equal,
        CompareOp::NotEqual,
        CompareOp::GreaterOrEqual,
        CompareOp::Greater,
    ];

    /// Evaluates `current <op> operand` with IEEE-754 ordering.
    ///
    /// Infinities are equal to themselves and bound every finite value. NaN inputs are not
    /// supported.
    pub fn evaluate(self, current: Version, operand: Version) -> bool {
        match self {
            CompareOp::Less => current < operand,
            CompareOp::LessOrEqual => current <= operand,
            CompareOp::Equal => current == operand,
            CompareOp::NotEqual => current != operand,
            CompareOp::GreaterOrEqual => current >= operand,
            CompareOp::Greater => current > operand,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessOrEqual => "<=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::GreaterOrEqual => ">=",
            CompareOp::Greater => ">",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = CompareOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CompareOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| CompareOpError(s.to_string()))
    }
}
