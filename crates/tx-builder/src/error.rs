use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::evaluator::EvaluationError;
use crate::ledger::{
    DatumHash, Language, PolicyId, RedeemerTag, RewardAccount, ScriptHash,
    TransactionInput, Utxo,
};
use crate::value::Value;

/// Coin selection stage that gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionPhase {
    Wide,
    Deep,
    Final,
}

impl fmt::Display for SelectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wide => f.write_str("wide"),
            Self::Deep => f.write_str("deep"),
            Self::Final => f.write_str("final"),
        }
    }
}

/// Best candidate seen on the iteration where a selection pass got stuck.
///
/// `index` points into [`UtxoSelectionError::available_inputs`]. Wide-pass ratings
/// are scaled by ten to stay integral.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionStep {
    pub rating: i128,
    pub value: Value,
    pub index: usize,
}

#[derive(Clone, Debug, Error)]
#[error(
    "UTxO selection failed in {phase} phase, unmet dearth {dearth} ({} selected, {} still available)",
    .selected_inputs.len(),
    .available_inputs.len()
)]
pub struct UtxoSelectionError {
    pub phase: SelectionPhase,
    /// Still-unmet requirement, positive components only.
    pub dearth: Value,
    pub available_inputs: Vec<Utxo>,
    pub selected_inputs: Vec<Utxo>,
    pub best_step: Option<SelectionStep>,
}

impl UtxoSelectionError {
    /// Structured failure report for logs and CLI output.
    #[must_use]
    pub fn diagnostics_json(&self) -> serde_json::Value {
        let inputs = |utxos: &[Utxo]| {
            serde_json::Value::Array(
                utxos
                    .iter()
                    .map(|utxo| {
                        serde_json::json!({
                            "input": utxo.input.to_string(),
                            "value": utxo.output.value,
                        })
                    })
                    .collect(),
            )
        };

        serde_json::json!({
            "phase": self.phase.to_string(),
            "dearth": self.dearth,
            "available_inputs": inputs(&self.available_inputs),
            "selected_inputs": inputs(&self.selected_inputs),
            "best_step": self.best_step.as_ref().map(|step| serde_json::json!({
                "rating": step.rating.to_string(),
                "value": step.value,
                "index": step.index,
            })),
        })
    }
}

#[derive(Debug, Error)]
pub enum TxBuilderError {
    #[error("input {0} is already part of the transaction")]
    DuplicateInput(TransactionInput),

    #[error("reference input {0} is already part of the transaction")]
    DuplicateReferenceInput(TransactionInput),

    #[error("withdrawal from {0} is already part of the transaction")]
    DuplicateWithdrawal(RewardAccount),

    #[error("mint for policy {0} already carries a redeemer")]
    DuplicateMintRedeemer(PolicyId),

    #[error("a redeemer was supplied for {0}, which is locked by a key hash")]
    RedeemerForKeyCredential(String),

    #[error("input {0} is spent with a redeemer but its output carries no datum")]
    MissingDatum(TransactionInput),

    #[error("input {0} only carries a datum hash, the datum itself must be provided")]
    DatumRequired(TransactionInput),

    #[error("input {0} carries an inline datum, a separate datum must not be provided")]
    InlineDatumConflict(TransactionInput),

    #[error("datum for input {input} hashes to {actual}, output expects {expected}")]
    DatumHashMismatch {
        input: TransactionInput,
        expected: DatumHash,
        actual: DatumHash,
    },

    #[error("output to {address} holds {actual} lovelace, minimum is {required}")]
    MinimumAdaNotMet {
        address: String,
        required: u64,
        actual: i128,
    },

    #[error("output value is {size} bytes, maximum is {max}")]
    ValueTooLarge { size: usize, max: u64 },

    #[error("output value must not be negative: {0}")]
    NegativeOutputValue(Value),

    #[error("{0} is already set")]
    ValidityAlreadySet(&'static str),

    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    #[error("a change address must be set before completing")]
    MissingChangeAddress,

    #[error("transaction has already been completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Selection(#[from] UtxoSelectionError),

    #[error("script {0} is required but neither attached nor referenced")]
    UnresolvableScript(ScriptHash),

    #[error("script {hash} is required as a {expected} script")]
    ScriptKindMismatch {
        hash: ScriptHash,
        expected: &'static str,
    },

    #[error("no cost model for {0}")]
    MissingCostModel(Language),

    #[error("insufficient collateral: required {required} lovelace, available {available}")]
    InsufficientCollateral { required: u64, available: u64 },

    #[error("collateral needs {required} inputs, at most {max} are allowed")]
    TooManyCollateralInputs { required: usize, max: u32 },

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("script evaluation timed out after {0:?}")]
    EvaluationTimeout(Duration),

    #[error("evaluator returned units for unknown redeemer {tag}:{index}")]
    UnknownRedeemer { tag: RedeemerTag, index: u32 },

    #[error("transaction has no inputs and no spare UTxO to add")]
    NoInputs,

    #[error("signed transaction would be {size} bytes, maximum is {max}")]
    TransactionTooLarge { size: u64, max: u64 },

    #[error("balancing did not converge after {iterations} iterations (last fee {fee})")]
    DidNotConverge { iterations: usize, fee: u64 },

    #[error("invalid protocol parameters: {0}")]
    InvalidProtocolParameters(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}
