use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::cbor::{CborEncode, EncodeError, Encoder, len_u64};
use super::hash::{KeyHash, ScriptHash, blake2b_224};

/// Plutus language version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    PlutusV1,
    PlutusV2,
    PlutusV3,
}

impl Language {
    /// Ledger language id, also the script-hash prefix minus one.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::PlutusV1 => 0,
            Self::PlutusV2 => 1,
            Self::PlutusV3 => 2,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlutusV1 => f.write_str("PlutusV1"),
            Self::PlutusV2 => f.write_str("PlutusV2"),
            Self::PlutusV3 => f.write_str("PlutusV3"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeScript {
    Pubkey(KeyHash),
    All(Vec<NativeScript>),
    Any(Vec<NativeScript>),
    NOfK { required: u32, scripts: Vec<NativeScript> },
    InvalidBefore(u64),
    InvalidHereafter(u64),
}

impl NativeScript {
    /// Every key hash named anywhere in the script tree.
    #[must_use]
    pub fn key_hashes(&self) -> BTreeSet<KeyHash> {
        let mut keys = BTreeSet::new();
        self.collect_key_hashes(&mut keys);
        keys
    }

    fn collect_key_hashes(&self, keys: &mut BTreeSet<KeyHash>) {
        match self {
            Self::Pubkey(hash) => {
                keys.insert(*hash);
            }
            Self::All(scripts) | Self::Any(scripts) | Self::NOfK { scripts, .. } => {
                for script in scripts {
                    script.collect_key_hashes(keys);
                }
            }
            Self::InvalidBefore(_) | Self::InvalidHereafter(_) => {}
        }
    }
}

impl CborEncode for NativeScript {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        let encode_all = |e: &mut Encoder, scripts: &[Self]| -> Result<(), EncodeError> {
            e.array(len_u64(scripts.len()))?;
            for script in scripts {
                script.encode_cbor(e)?;
            }
            Ok(())
        };

        match self {
            Self::Pubkey(hash) => {
                e.array(2)?.u8(0)?.bytes(hash.as_ref())?;
            }
            Self::All(scripts) => {
                e.array(2)?.u8(1)?;
                encode_all(e, scripts)?;
            }
            Self::Any(scripts) => {
                e.array(2)?.u8(2)?;
                encode_all(e, scripts)?;
            }
            Self::NOfK { required, scripts } => {
                e.array(3)?.u8(3)?.u32(*required)?;
                encode_all(e, scripts)?;
            }
            Self::InvalidBefore(slot) => {
                e.array(2)?.u8(4)?.u64(*slot)?;
            }
            Self::InvalidHereafter(slot) => {
                e.array(2)?.u8(5)?.u64(*slot)?;
            }
        }
        Ok(())
    }
}

/// A native script or a compiled Plutus program.
///
/// Plutus bytes are the on-chain script bytes as they appear in the witness set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    Native(NativeScript),
    PlutusV1(#[serde(with = "hex")] Vec<u8>),
    PlutusV2(#[serde(with = "hex")] Vec<u8>),
    PlutusV3(#[serde(with = "hex")] Vec<u8>),
}

impl Script {
    #[must_use]
    pub const fn language(&self) -> Option<Language> {
        match self {
            Self::Native(_) => None,
            Self::PlutusV1(_) => Some(Language::PlutusV1),
            Self::PlutusV2(_) => Some(Language::PlutusV2),
            Self::PlutusV3(_) => Some(Language::PlutusV3),
        }
    }

    const fn hash_prefix(&self) -> u8 {
        match self.language() {
            None => 0,
            Some(language) => language.id() + 1,
        }
    }

    /// Bytes the script hash and the reference-script fee are computed over.
    #[must_use]
    pub fn raw_bytes(&self) -> Vec<u8> {
        match self {
            Self::Native(native) => native.to_cbor(),
            Self::PlutusV1(bytes) | Self::PlutusV2(bytes) | Self::PlutusV3(bytes) => bytes.clone(),
        }
    }

    #[must_use]
    pub fn hash(&self) -> ScriptHash {
        let raw = self.raw_bytes();
        let mut preimage = Vec::with_capacity(raw.len() + 1);
        preimage.push(self.hash_prefix());
        preimage.extend_from_slice(&raw);
        blake2b_224(&preimage)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.raw_bytes().len()
    }
}

/// Encodes the `script_ref` shape `[tag, script]`.
impl CborEncode for Script {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.array(2)?.u8(self.hash_prefix())?;
        match self {
            Self::Native(native) => native.encode_cbor(e)?,
            Self::PlutusV1(bytes) | Self::PlutusV2(bytes) | Self::PlutusV3(bytes) => {
                e.bytes(bytes)?;
            }
        }
        Ok(())
    }
}
