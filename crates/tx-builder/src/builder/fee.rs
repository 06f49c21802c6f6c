//! Fee and deposit arithmetic.

use crate::ledger::{CborEncode, ExUnits, Redeemer, TransactionOutput};
use crate::params::{MinFeeReferenceScripts, ProtocolParameters};
use crate::value::Value;

/// Fixed overhead the ledger adds to an output's serialized size when pricing
/// its minimum deposit.
pub const OUTPUT_OVERHEAD_BYTES: u64 = 160;

fn size_u64(size: usize) -> u64 {
    u64::try_from(size).unwrap_or(u64::MAX)
}

/// Minimum base-unit amount `output` must hold.
#[must_use]
pub fn min_ada_for_output(params: &ProtocolParameters, output: &TransactionOutput) -> u64 {
    params
        .coins_per_utxo_byte
        .saturating_mul(OUTPUT_OVERHEAD_BYTES.saturating_add(size_u64(output.cbor_len())))
}

/// Minimum deposit for an output whose coin is not known yet. The coin is priced
/// at its widest encoding, so the result never falls short.
#[must_use]
pub fn min_ada_upper_bound(params: &ProtocolParameters, output: &TransactionOutput) -> u64 {
    let mut widest = output.clone();
    widest.value = Value::from_parts(i128::from(u64::MAX), output.value.assets().clone());
    min_ada_for_output(params, &widest)
}

/// Serialized size of a value as the ledger measures it against `max_value_size`.
#[must_use]
pub fn value_size(value: &Value) -> usize {
    value.cbor_len()
}

/// Tiered fee for reference scripts of `total_size` bytes: each `range`-byte tier
/// costs `multiplier` times more per byte than the one before.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn reference_script_fee(tiers: &MinFeeReferenceScripts, total_size: u64) -> u64 {
    if total_size == 0 || tiers.range == 0 {
        return 0;
    }

    let mut remaining = total_size;
    let mut price = tiers.base;
    let mut fee = 0.0_f64;
    while remaining > 0 {
        let chunk = remaining.min(tiers.range);
        fee += chunk as f64 * price;
        remaining -= chunk;
        price *= tiers.multiplier;
    }
    fee.ceil() as u64
}

/// Price of the declared execution units, rounded up once over the exact sum.
#[must_use]
pub fn ex_units_fee(params: &ProtocolParameters, redeemers: &[Redeemer]) -> u64 {
    let total = redeemers.iter().fold(ExUnits::default(), |acc, redeemer| {
        ExUnits::new(
            acc.mem.saturating_add(redeemer.ex_units.mem),
            acc.steps.saturating_add(redeemer.ex_units.steps),
        )
    });
    if total.mem == 0 && total.steps == 0 {
        return 0;
    }

    let memory = params.prices.memory;
    let steps = params.prices.steps;
    let denominator = u128::from(memory.denominator) * u128::from(steps.denominator);
    if denominator == 0 {
        return u64::MAX;
    }
    let numerator = u128::from(total.mem)
        * u128::from(memory.numerator)
        * u128::from(steps.denominator)
        + u128::from(total.steps) * u128::from(steps.numerator) * u128::from(memory.denominator);

    u64::try_from(numerator.div_ceil(denominator)).unwrap_or(u64::MAX)
}

/// Linear size fee plus reference-script and execution-unit fees.
#[must_use]
pub fn min_fee(
    params: &ProtocolParameters,
    tx_size: usize,
    reference_script_size: u64,
    redeemers: &[Redeemer],
) -> u64 {
    let size_fee = params
        .min_fee_coefficient
        .saturating_mul(size_u64(tx_size))
        .saturating_add(params.min_fee_constant);
    let ref_fee = params
        .min_fee_reference_scripts
        .as_ref()
        .map_or(0, |tiers| reference_script_fee(tiers, reference_script_size));

    size_fee
        .saturating_add(ref_fee)
        .saturating_add(ex_units_fee(params, redeemers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin_selection::test_support::{test_address, test_asset};
    use crate::ledger::{PlutusData, RedeemerTag};
    use crate::params::{ExUnitPrices, UnitInterval};

    fn redeemer(mem: u64, steps: u64) -> Redeemer {
        Redeemer {
            tag: RedeemerTag::Spend,
            index: 0,
            data: PlutusData::unit(),
            ex_units: ExUnits::new(mem, steps),
        }
    }

    #[test]
    fn min_ada_scales_with_output_size() {
        let params = ProtocolParameters::default();
        let plain = TransactionOutput::new(test_address(), Value::from_coin(1_000_000));
        let with_token = TransactionOutput::new(
            test_address(),
            Value::from_coin(1_000_000).with_asset(test_asset(1), 1),
        );

        let plain_min = min_ada_for_output(&params, &plain);
        assert_eq!(
            plain_min,
            params.coins_per_utxo_byte * (OUTPUT_OVERHEAD_BYTES + plain.cbor_len() as u64)
        );
        assert!(min_ada_for_output(&params, &with_token) > plain_min);
        assert!(min_ada_upper_bound(&params, &plain) >= plain_min);
    }

    #[test]
    fn reference_script_fee_grows_per_tier() {
        let tiers = MinFeeReferenceScripts {
            base: 15.0,
            range: 25_600,
            multiplier: 1.2,
        };
        assert_eq!(reference_script_fee(&tiers, 0), 0);
        assert_eq!(reference_script_fee(&tiers, 1_000), 15_000);
        // One full tier at 15 plus 400 bytes at 18.
        assert_eq!(reference_script_fee(&tiers, 26_000), 25_600 * 15 + 400 * 18);
    }

    #[test]
    fn ex_units_fee_rounds_up_once() {
        let params = ProtocolParameters {
            prices: ExUnitPrices {
                memory: UnitInterval::new(1, 3),
                steps: UnitInterval::new(1, 3),
            },
            ..ProtocolParameters::default()
        };
        // 1/3 + 1/3 + 1/3 + 1/3 = 4/3, one ceil gives 2, per-redeemer ceil would give 4.
        let fee = ex_units_fee(&params, &[redeemer(1, 1), redeemer(1, 1)]);
        assert_eq!(fee, 2);
        assert_eq!(ex_units_fee(&params, &[]), 0);
    }

    #[test]
    fn min_fee_adds_all_components() {
        let params = ProtocolParameters {
            min_fee_constant: 100,
            min_fee_coefficient: 2,
            min_fee_reference_scripts: None,
            prices: ExUnitPrices {
                memory: UnitInterval::new(1, 1),
                steps: UnitInterval::new(1, 1),
            },
            ..ProtocolParameters::default()
        };
        assert_eq!(min_fee(&params, 50, 10_000, &[redeemer(3, 4)]), 100 + 100 + 7);
    }
}
