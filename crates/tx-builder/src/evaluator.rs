//! Script evaluation seam.
//!
//! The builder never runs Plutus itself. It hands a draft transaction and the full
//! UTxO scope to an [`Evaluator`], typically backed by a node, Ogmios or an
//! embedded machine, and writes the returned execution units back into its
//! redeemers.

use async_trait::async_trait;
use thiserror::Error;

use crate::ledger::{Redeemer, Transaction, Utxo};

/// Failure reported by an evaluator. The builder surfaces it unchanged.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("script evaluation failed: {message}")]
pub struct EvaluationError {
    pub message: String,
    /// Script traces, when the backend provides them.
    pub traces: Vec<String>,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traces: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_traces(mut self, traces: Vec<String>) -> Self {
        self.traces = traces;
        self
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Return every redeemer of `draft` with measured execution units.
    ///
    /// `utxos` resolves every input and reference input of the draft, including
    /// outputs of transactions that are not on chain yet.
    async fn evaluate(
        &self,
        draft: &Transaction,
        utxos: &[Utxo],
    ) -> Result<Vec<Redeemer>, EvaluationError>;
}
