//! Wide-then-deep multi-asset coin selection.
//!
//! # Algorithm
//!
//! 1. Wide pass: while the goal still spans more than one asset type, pick the
//!    candidate that closes the most asset types outright, breaking near-ties by how
//!    many of the goal's asset types it touches at all. At most one pick per asset
//!    type of the dearth, plus one, is made here.
//! 2. Deep pass: while the goal is non-empty, take its first asset (base unit
//!    first) and pick the candidate holding the most of it.
//! 3. Anything still missing after both passes is reported as a `final` failure.
//!
//! Wide-pass rating for candidate `v` against goal `g`, scaled by ten so it stays
//! integral:
//!
//! ```text
//! 10 * (types(g) - types(positives(g - v))) + intersect(g, v)
//! ```
//!
//! # Determinism
//!
//! Candidates are sorted by input reference `(transaction_id, index)` ascending
//! and only a strictly better rating replaces the incumbent, so ties go to the
//! smallest reference.
//!
//! # Failure modes
//!
//! - A pass whose remaining candidates all rate zero fails with its own phase
//!   (`wide` / `deep`) and reports the best of them.
//! - A pass that runs out of candidates, or of iterations, hands over. A deficit
//!   left after both passes fails with phase `final`.

use tracing::debug;

use super::{CoinSelector, SelectionResult, sorted_by_reference};
use crate::error::{SelectionPhase, SelectionStep, UtxoSelectionError};
use crate::ledger::Utxo;
use crate::value::Value;

/// Upper bound on picks per pass.
pub const MAX_PASS_ITERATIONS: usize = 30;

#[derive(Clone, Copy, Debug, Default)]
pub struct WideDeepSelector;

struct SelectionState {
    /// Signed remaining requirement. Only its positive part is still owed.
    goal: Value,
    candidates: Vec<Utxo>,
    selected: Vec<Utxo>,
}

impl SelectionState {
    fn owed(&self) -> Value {
        self.goal.positives()
    }

    fn take(&mut self, index: usize) {
        let utxo = self.candidates.remove(index);
        self.goal = self.goal.sub(utxo.value());
        self.selected.push(utxo);
    }

    fn failure(&self, phase: SelectionPhase, best_step: Option<SelectionStep>) -> UtxoSelectionError {
        UtxoSelectionError {
            phase,
            dearth: self.owed(),
            available_inputs: self.candidates.clone(),
            selected_inputs: self.selected.clone(),
            best_step,
        }
    }

    /// Highest-rated candidate, first one wins ties.
    fn best_candidate(&self, rate: impl Fn(&Value) -> i128) -> Option<SelectionStep> {
        let mut best: Option<SelectionStep> = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let rating = rate(candidate.value());
            if best.as_ref().is_none_or(|step| rating > step.rating) {
                best = Some(SelectionStep {
                    rating,
                    value: candidate.value().clone(),
                    index,
                });
            }
        }
        best
    }
}

fn count_as_i128(count: usize) -> i128 {
    i128::try_from(count).unwrap_or(i128::MAX)
}

fn wide_rating(owed: &Value, candidate: &Value) -> i128 {
    let closed = owed
        .asset_type_count()
        .saturating_sub(owed.sub(candidate).positives().asset_type_count());
    10 * count_as_i128(closed) + count_as_i128(owed.intersect_count(candidate))
}

/// Wide picks allowed for a goal, one per asset type plus one.
fn wide_pick_limit(goal: &Value) -> usize {
    (goal.asset_type_count() + 1).min(MAX_PASS_ITERATIONS)
}

fn wide_pass(state: &mut SelectionState) -> Result<(), UtxoSelectionError> {
    for _ in 0..wide_pick_limit(&state.owed()) {
        let owed = state.owed();
        if owed.asset_type_count() <= 1 || state.candidates.is_empty() {
            break;
        }

        match state.best_candidate(|value| wide_rating(&owed, value)) {
            Some(step) if step.rating > 0 => {
                debug!(rating = %step.rating, input = %state.candidates[step.index].input, "wide pass pick");
                state.take(step.index);
            }
            best => return Err(state.failure(SelectionPhase::Wide, best)),
        }
    }
    Ok(())
}

fn deep_pass(state: &mut SelectionState) -> Result<(), UtxoSelectionError> {
    for _ in 0..MAX_PASS_ITERATIONS {
        let owed = state.owed();
        let Some(target) = owed.asset_classes().into_iter().next() else {
            break;
        };
        if state.candidates.is_empty() {
            break;
        }

        match state.best_candidate(|value| value.quantity_of(&target)) {
            Some(step) if step.rating > 0 => {
                debug!(asset = %target, quantity = %step.rating, input = %state.candidates[step.index].input, "deep pass pick");
                state.take(step.index);
            }
            best => return Err(state.failure(SelectionPhase::Deep, best)),
        }
    }
    Ok(())
}

impl CoinSelector for WideDeepSelector {
    fn select(
        &self,
        available: &[Utxo],
        dearth: &Value,
    ) -> Result<SelectionResult, UtxoSelectionError> {
        let mut state = SelectionState {
            goal: dearth.positives(),
            candidates: sorted_by_reference(available),
            selected: Vec::new(),
        };

        wide_pass(&mut state)?;
        deep_pass(&mut state)?;

        if !state.owed().is_empty() {
            return Err(state.failure(SelectionPhase::Final, None));
        }

        let selected_value = state.selected.iter().map(Utxo::value).sum();
        Ok(SelectionResult {
            selected_inputs: state.selected,
            selected_value,
            remaining_inputs: state.candidates,
        })
    }
}
