//! Highest-value-first selection.
//!
//! Candidates are visited by descending base-unit amount and picked while they
//! contribute to something still owed. Each pick raises the requirement by a
//! per-input fee buffer, and once the requirement is met the leftover must be
//! able to stand as a change output on its own, otherwise more base units are
//! requested. Script-locked outputs and outputs carrying a reference script are
//! never considered.

use tracing::debug;

use super::{CoinSelector, SelectionResult};
use crate::error::{SelectionPhase, UtxoSelectionError};
use crate::ledger::{CborEncode, TransactionOutput, Utxo};
use crate::params::ProtocolParameters;
use crate::value::Value;

/// Serialized input reference plus one vkey witness.
const INPUT_WITNESS_BYTES: u64 = 139;

/// Overhead the ledger adds to every output when pricing its deposit.
const OUTPUT_OVERHEAD_BYTES: u64 = 160;

#[derive(Clone, Copy, Debug)]
pub struct HighestValueFirst {
    pub coins_per_utxo_byte: u64,
    pub fee_per_input: u64,
}

impl HighestValueFirst {
    #[must_use]
    pub const fn from_params(params: &ProtocolParameters) -> Self {
        Self {
            coins_per_utxo_byte: params.coins_per_utxo_byte,
            fee_per_input: params.min_fee_coefficient * INPUT_WITNESS_BYTES,
        }
    }

    fn min_change(&self, leftover: &Value, template: &Utxo) -> i128 {
        let output = TransactionOutput::new(template.output.address, leftover.positives());
        let size = u64::try_from(output.cbor_len()).unwrap_or(u64::MAX);
        i128::from(self.coins_per_utxo_byte) * i128::from(OUTPUT_OVERHEAD_BYTES + size)
    }

    fn target(&self, requirement: &Value, picks: usize, extra: i128) -> Value {
        let picks = i128::try_from(picks).unwrap_or(i128::MAX);
        requirement.merge(&Value::from_coin(
            i128::from(self.fee_per_input) * picks + extra,
        ))
    }
}

impl CoinSelector for HighestValueFirst {
    fn select(
        &self,
        available: &[Utxo],
        dearth: &Value,
    ) -> Result<SelectionResult, UtxoSelectionError> {
        let requirement = dearth.positives();
        let mut remaining: Vec<Utxo> = available
            .iter()
            .filter(|utxo| {
                !utxo.output.address.payment_credential().is_script()
                    && utxo.output.script_ref.is_none()
            })
            .cloned()
            .collect();
        remaining.sort_by(|a, b| {
            b.value()
                .coin()
                .cmp(&a.value().coin())
                .then_with(|| a.input.cmp(&b.input))
        });

        let mut selected: Vec<Utxo> = Vec::new();
        let mut accumulated = Value::zero();
        let mut extra_lovelace = 0i128;

        loop {
            if requirement.is_empty() && selected.is_empty() {
                break;
            }

            let target = self.target(&requirement, selected.len(), extra_lovelace);
            let shortfall = target.sub(&accumulated).positives();

            if shortfall.is_empty() {
                let leftover = accumulated.sub(&target);
                let Some(template) = selected.first() else {
                    break;
                };
                let min_change = self.min_change(&leftover, template);
                if leftover.is_empty() || leftover.coin() >= min_change {
                    break;
                }
                extra_lovelace += min_change - leftover.coin();
                continue;
            }

            let next = remaining
                .iter()
                .position(|utxo| utxo.value().positives().intersect_count(&shortfall) > 0);
            let Some(index) = next else {
                return Err(UtxoSelectionError {
                    phase: SelectionPhase::Final,
                    dearth: shortfall,
                    available_inputs: remaining,
                    selected_inputs: selected,
                    best_step: None,
                });
            };

            let utxo = remaining.remove(index);
            debug!(input = %utxo.input, coin = %utxo.value().coin(), "highest-value-first pick");
            accumulated = accumulated.merge(utxo.value());
            selected.push(utxo);
        }

        Ok(SelectionResult {
            selected_inputs: selected,
            selected_value: accumulated,
            remaining_inputs: remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_selection::test_support::{test_asset, test_utxo};
    use crate::ledger::{Address, Credential, Hash, NETWORK_TESTNET, NativeScript, Script};

    use proptest::prelude::*;

    fn selector() -> HighestValueFirst {
        HighestValueFirst {
            coins_per_utxo_byte: 4_310,
            fee_per_input: 10_000,
        }
    }

    #[test]
    fn picks_largest_contributing_outputs_first() {
        let pool = vec![
            test_utxo(1, Value::from_coin(2_000_000)),
            test_utxo(2, Value::from_coin(9_000_000)),
            test_utxo(3, Value::from_coin(4_000_000)),
        ];

        let result = selector()
            .select(&pool, &Value::from_coin(5_000_000))
            .expect("enough funds");

        assert_eq!(result.selected_inputs.len(), 1);
        assert_eq!(result.selected_inputs[0].input.transaction_id.0[0], 2);
        assert_eq!(result.remaining_inputs.len(), 2);
    }

    #[test]
    fn leftover_below_min_change_pulls_more_lovelace() {
        let pool = vec![
            test_utxo(1, Value::from_coin(5_020_000)),
            test_utxo(2, Value::from_coin(3_000_000)),
        ];

        let result = selector()
            .select(&pool, &Value::from_coin(5_000_000))
            .expect("second input covers change deposit");

        assert_eq!(result.selected_inputs.len(), 2);
        let leftover = result.selected_value.coin() - 5_000_000 - 2 * 10_000;
        assert!(leftover >= 4_310 * 160);
    }

    #[test]
    fn token_requirement_skips_outputs_without_the_token() {
        let x = test_asset(1);
        let pool = vec![
            test_utxo(1, Value::from_coin(50_000_000)),
            test_utxo(2, Value::from_coin(2_000_000).with_asset(x.clone(), 8)),
        ];

        let result = selector()
            .select(&pool, &Value::zero().with_asset(x, 8))
            .expect("token available");
        assert_eq!(result.selected_inputs[0].input.transaction_id.0[0], 2);
    }

    #[test]
    fn script_locked_outputs_are_ignored() {
        let script_address =
            Address::enterprise(NETWORK_TESTNET, Credential::ScriptHash(Hash::new([5; 28])));
        let mut locked = test_utxo(1, Value::from_coin(100_000_000));
        locked.output.address = script_address;

        let err = selector()
            .select(&[locked], &Value::from_coin(1_000_000))
            .expect_err("only a script output is available");
        assert_eq!(err.phase, SelectionPhase::Final);
        assert!(err.available_inputs.is_empty());
        assert_eq!(err.dearth.coin(), 1_000_000);
    }

    #[test]
    fn outputs_carrying_reference_scripts_are_ignored() {
        let mut holder = test_utxo(1, Value::from_coin(50_000_000));
        holder.output.script_ref = Some(Script::Native(NativeScript::InvalidBefore(0)));
        let plain = test_utxo(2, Value::from_coin(3_000_000));

        let result = selector()
            .select(&[holder, plain], &Value::from_coin(1_000_000))
            .expect("plain output covers the dearth");
        assert_eq!(result.selected_inputs.len(), 1);
        assert_eq!(result.selected_inputs[0].input.transaction_id.0[0], 2);
        assert!(result.remaining_inputs.is_empty());
    }

    fn arb_pool() -> impl Strategy<Value = Vec<Utxo>> {
        proptest::collection::vec((1i128..20_000_000, 0i128..20), 1..8).prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(tag, (coin, x))| {
                    let tag = u8::try_from(tag).expect("small pool");
                    test_utxo(tag, Value::from_parts(coin, [(test_asset(1), x)]))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn successful_selection_covers_the_dearth(
            pool in arb_pool(),
            coin in 0i128..30_000_000,
            x in 0i128..40,
        ) {
            let dearth = Value::from_parts(coin, [(test_asset(1), x)]);
            if let Ok(result) = selector().select(&pool, &dearth) {
                prop_assert!(result.selected_value.sub(&dearth).is_non_negative());
                prop_assert_eq!(
                    result.selected_inputs.len() + result.remaining_inputs.len(),
                    pool.len()
                );
            }
        }
    }
}
