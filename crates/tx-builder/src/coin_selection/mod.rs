//! Coin selection strategies.
//!
//! A selector receives the spare UTxOs and a positive requirement (the dearth)
//! and returns the inputs it picked. The builder calls it once per balancing pass
//! with whatever the transaction is still short of, so selectors stay pure and
//! stateless.

mod highest_value_first;
mod wide_deep;

use std::fmt;

pub use highest_value_first::HighestValueFirst;
pub use wide_deep::{MAX_PASS_ITERATIONS, WideDeepSelector};

use crate::error::UtxoSelectionError;
use crate::ledger::Utxo;
use crate::value::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionResult {
    pub selected_inputs: Vec<Utxo>,
    pub selected_value: Value,
    /// Candidates that were not picked, in the order the selector considered them.
    pub remaining_inputs: Vec<Utxo>,
}

pub trait CoinSelector: Send + Sync + fmt::Debug {
    fn select(&self, available: &[Utxo], dearth: &Value)
    -> Result<SelectionResult, UtxoSelectionError>;
}

/// Deterministic candidate order: ascending input reference.
fn sorted_by_reference(available: &[Utxo]) -> Vec<Utxo> {
    let mut candidates = available.to_vec();
    candidates.sort_by(|a, b| a.input.cmp(&b.input));
    candidates
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::ledger::{
        Address, Credential, Hash, NETWORK_TESTNET, TransactionInput, TransactionOutput, Utxo,
    };
    use crate::value::{AssetId, AssetName, Value};

    pub fn test_asset(tag: u8) -> AssetId {
        AssetId::new(
            Hash::new([tag; 28]),
            AssetName::new(b"token".to_vec()).expect("short name"),
        )
    }

    pub fn test_address() -> Address {
        Address::enterprise(NETWORK_TESTNET, Credential::KeyHash(Hash::new([0xaa; 28])))
    }

    pub fn test_utxo(tag: u8, value: Value) -> Utxo {
        Utxo::new(
            TransactionInput::new(Hash::new([tag; 32]), 0),
            TransactionOutput::new(test_address(), value),
        )
    }
}
