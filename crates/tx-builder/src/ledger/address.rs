use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::cbor::{CborEncode, EncodeError, Encoder};
use super::hash::{Hash, KeyHash, ScriptHash};

pub const NETWORK_TESTNET: u8 = 0;
pub const NETWORK_MAINNET: u8 = 1;

/// Payment or stake credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    KeyHash(KeyHash),
    ScriptHash(ScriptHash),
}

impl Credential {
    #[must_use]
    pub const fn hash(&self) -> &Hash<28> {
        match self {
            Self::KeyHash(hash) | Self::ScriptHash(hash) => hash,
        }
    }

    #[must_use]
    pub const fn is_script(&self) -> bool {
        matches!(self, Self::ScriptHash(_))
    }
}

impl CborEncode for Credential {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        let tag = u8::from(self.is_script());
        e.array(2)?.u8(tag)?.bytes(self.hash().as_ref())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid address hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("address is empty")]
    Empty,

    #[error("unsupported address header type {0}")]
    UnsupportedType(u8),

    #[error("address header type {header_type} expects {expected} bytes, got {actual}")]
    Length {
        header_type: u8,
        expected: usize,
        actual: usize,
    },
}

/// Shelley-era base or enterprise address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub network: u8,
    pub payment: Credential,
    pub stake: Option<Credential>,
}

impl Address {
    #[must_use]
    pub const fn enterprise(network: u8, payment: Credential) -> Self {
        Self {
            network,
            payment,
            stake: None,
        }
    }

    #[must_use]
    pub const fn base(network: u8, payment: Credential, stake: Credential) -> Self {
        Self {
            network,
            payment,
            stake: Some(stake),
        }
    }

    #[must_use]
    pub const fn payment_credential(&self) -> &Credential {
        &self.payment
    }

    const fn header_type(&self) -> u8 {
        match (self.payment, self.stake) {
            (Credential::KeyHash(_), Some(Credential::KeyHash(_))) => 0,
            (Credential::ScriptHash(_), Some(Credential::KeyHash(_))) => 1,
            (Credential::KeyHash(_), Some(Credential::ScriptHash(_))) => 2,
            (Credential::ScriptHash(_), Some(Credential::ScriptHash(_))) => 3,
            (Credential::KeyHash(_), None) => 6,
            (Credential::ScriptHash(_), None) => 7,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(57);
        bytes.push((self.header_type() << 4) | (self.network & 0x0f));
        bytes.extend_from_slice(self.payment.hash().as_ref());
        if let Some(stake) = &self.stake {
            bytes.extend_from_slice(stake.hash().as_ref());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AddressParseError> {
        let header = *bytes.first().ok_or(AddressParseError::Empty)?;
        let header_type = header >> 4;
        let network = header & 0x0f;
        let expected = match header_type {
            0..=3 => 57,
            6 | 7 => 29,
            other => return Err(AddressParseError::UnsupportedType(other)),
        };
        if bytes.len() != expected {
            return Err(AddressParseError::Length {
                header_type,
                expected,
                actual: bytes.len(),
            });
        }

        let hash_at = |offset: usize| -> Hash<28> {
            let mut out = [0u8; 28];
            out.copy_from_slice(&bytes[offset..offset + 28]);
            Hash(out)
        };
        let payment = if header_type & 0b001 == 0 {
            Credential::KeyHash(hash_at(1))
        } else {
            Credential::ScriptHash(hash_at(1))
        };
        let stake = match header_type {
            0 | 1 => Some(Credential::KeyHash(hash_at(29))),
            2 | 3 => Some(Credential::ScriptHash(hash_at(29))),
            _ => None,
        };

        Ok(Self {
            network,
            payment,
            stake,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(&hex::decode(s)?)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl CborEncode for Address {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.bytes(&self.to_bytes())?;
        Ok(())
    }
}

/// Stake (reward) account, the target of withdrawals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewardAccount {
    pub network: u8,
    pub credential: Credential,
}

impl RewardAccount {
    #[must_use]
    pub const fn new(network: u8, credential: Credential) -> Self {
        Self {
            network,
            credential,
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header_type: u8 = if self.credential.is_script() { 0x0f } else { 0x0e };
        let mut bytes = Vec::with_capacity(29);
        bytes.push((header_type << 4) | (self.network & 0x0f));
        bytes.extend_from_slice(self.credential.hash().as_ref());
        bytes
    }
}

/// Ordered by serialized bytes, the order the ledger uses for the withdrawal map.
impl Ord for RewardAccount {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for RewardAccount {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RewardAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl CborEncode for RewardAccount {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.bytes(&self.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_address_bytes_round_trip() {
        let address = Address::base(
            NETWORK_MAINNET,
            Credential::ScriptHash(Hash([1; 28])),
            Credential::KeyHash(Hash([2; 28])),
        );
        let bytes = address.to_bytes();
        assert_eq!(bytes.len(), 57);
        assert_eq!(bytes[0], 0x11);
        assert_eq!(Address::from_bytes(&bytes).expect("valid address"), address);
    }

    #[test]
    fn enterprise_address_header() {
        let address = Address::enterprise(NETWORK_TESTNET, Credential::KeyHash(Hash([3; 28])));
        assert_eq!(address.to_bytes()[0], 0x60);
        assert_eq!(address.to_bytes().len(), 29);
    }

    #[test]
    fn address_rejects_truncated_bytes() {
        let err = Address::from_bytes(&[0x00, 0x01]).expect_err("short base address");
        match err {
            AddressParseError::Length {
                expected, actual, ..
            } => {
                assert_eq!(expected, 57);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reward_account_header_tracks_credential_kind() {
        let key = RewardAccount::new(NETWORK_MAINNET, Credential::KeyHash(Hash([0; 28])));
        let script = RewardAccount::new(NETWORK_MAINNET, Credential::ScriptHash(Hash([0; 28])));
        assert_eq!(key.to_bytes()[0], 0xe1);
        assert_eq!(script.to_bytes()[0], 0xf1);
        assert!(key < script);
    }
}
