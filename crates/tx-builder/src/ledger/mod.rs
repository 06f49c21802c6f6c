//! Ledger primitives the builder needs byte-exact encodings for.
//!
//! Encoding is one-way: the builder produces bodies, witness sets and hashes, and
//! never parses a transaction back.

pub mod address;
pub mod cbor;
pub mod data;
pub mod hash;
pub mod script;
pub mod tx;

pub use address::{
    Address, AddressParseError, Credential, NETWORK_MAINNET, NETWORK_TESTNET, RewardAccount,
};
pub use cbor::CborEncode;
pub use data::{Datum, PlutusData};
pub use hash::{
    DatumHash, Hash, HashParseError, KeyHash, PolicyId, ScriptDataHash, ScriptHash, TxHash,
    blake2b_224, blake2b_256,
};
pub use script::{Language, NativeScript, Script};
pub use tx::{
    Certificate, ExUnits, Redeemer, RedeemerTag, Transaction, TransactionBody, TransactionInput,
    TransactionOutput, Utxo, VKeyWitness, WitnessSet, encode_datums, encode_redeemers,
};
