//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers that flow through a train
//! movement. These prevent accidental identifier confusion: you cannot pass
//! a `UserId` where a `TokenId` is expected, and an `Address` or `TxHash`
//! cannot exist in a malformed shape.
//!
//! ## Normalization
//!
//! `Address` and `TxHash` are lowercased at construction so that two
//! spellings of the same value compare equal and produce the same storage
//! key.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// On-chain identifier of a ticket (the collectible minted to the
/// departing passenger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(u64);

/// Social-network user identifier of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

/// 20-byte settlement address, `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

/// 32-byte transaction hash, `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TokenId {
    /// Wrap a raw token number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw token number.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The identifier that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl UserId {
    /// Wrap a raw user number.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw user number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Address {
    /// Validate and normalize a settlement address.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref().trim();
        let hex = strip_hex_prefix(raw).ok_or_else(|| ValidationError::InvalidAddress {
            value: raw.to_string(),
            reason: "missing 0x prefix",
        })?;
        if hex.len() != 40 {
            return Err(ValidationError::InvalidAddress {
                value: raw.to_string(),
                reason: "expected 40 hex digits",
            });
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidAddress {
                value: raw.to_string(),
                reason: "non-hex character",
            });
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// The normalized `0x…` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TxHash {
    /// Validate and normalize a transaction hash.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ValidationError> {
        let raw = raw.as_ref().trim();
        let hex = strip_hex_prefix(raw).ok_or_else(|| ValidationError::InvalidTxHash {
            value: raw.to_string(),
            reason: "missing 0x prefix",
        })?;
        if hex.len() != 64 {
            return Err(ValidationError::InvalidTxHash {
                value: raw.to_string(),
                reason: "expected 64 hex digits",
            });
        }
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidTxHash {
                value: raw.to_string(),
                reason: "non-hex character",
            });
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// The normalized `0x…` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_hex_prefix(raw: &str) -> Option<&str> {
    raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X"))
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl TryFrom<String> for TxHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.0
    }
}

impl FromStr for TokenId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidTokenId(s.to_string()))
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ValidationError::InvalidUserId(s.to_string()))
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
