use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::{U28, U32};
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

type Blake2b224 = Blake2b<U28>;
type Blake2b256 = Blake2b<U32>;

/// Fixed-size ledger digest rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash<const N: usize>(pub [u8; N]);

pub type KeyHash = Hash<28>;
pub type ScriptHash = Hash<28>;
pub type PolicyId = Hash<28>;
pub type TxHash = Hash<32>;
pub type DatumHash = Hash<32>;
pub type ScriptDataHash = Hash<32>;

impl<const N: usize> Hash<N> {
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> AsRef<[u8]> for Hash<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> TryFrom<&[u8]> for Hash<N> {
    type Error = HashParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; N] = bytes.try_into().map_err(|_| HashParseError::Length {
            expected: N,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }
}

impl<const N: usize> fmt::Display for Hash<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl<const N: usize> fmt::Debug for Hash<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash<{N}>({self})")
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HashParseError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

impl<const N: usize> FromStr for Hash<N> {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice())
    }
}

impl<const N: usize> Serialize for Hash<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de, const N: usize> Deserialize<'de> for Hash<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// blake2b-224, used for key and script hashes.
#[must_use]
pub fn blake2b_224(bytes: &[u8]) -> Hash<28> {
    let mut out = [0u8; 28];
    out.copy_from_slice(&Blake2b224::digest(bytes));
    Hash(out)
}

/// blake2b-256, used for transaction ids, datum hashes and the script data hash.
#[must_use]
pub fn blake2b_256(bytes: &[u8]) -> Hash<32> {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(bytes));
    Hash(out)
}
