use std::collections::BTreeSet;

use tracing::debug;

use super::{TxBuilder, fee};
use crate::error::TxBuilderError;
use crate::ledger::{Address, TransactionOutput, Utxo};
use crate::value::Value;

/// Collateral inputs with the matching return output and declared total.
#[derive(Debug)]
struct CollateralPlan {
    inputs: Vec<Utxo>,
    collateral_return: Option<TransactionOutput>,
    total: u64,
}

impl TxBuilder {
    /// Base units the collateral must cover for the current fee.
    pub(super) fn required_collateral(&self) -> u64 {
        let required = u128::from(self.fee) * u128::from(self.params.collateral_percentage);
        u64::try_from(required.div_ceil(100)).unwrap_or(u64::MAX)
    }

    /// Return output and total for spending `inputs` as collateral, or `None`
    /// when the leftover cannot stand as an output of its own.
    fn plan_for(
        &self,
        inputs: Vec<Utxo>,
        required: u64,
        return_address: Address,
    ) -> Option<CollateralPlan> {
        let sum: Value = inputs.iter().map(Utxo::value).sum();
        let leftover = sum.sub(&Value::from_coin(i128::from(required)));
        if !leftover.is_non_negative() {
            return None;
        }
        if leftover.is_empty() {
            return Some(CollateralPlan {
                inputs,
                collateral_return: None,
                total: required,
            });
        }

        let output = TransactionOutput::new(return_address, leftover.clone());
        if leftover.coin() >= i128::from(fee::min_ada_for_output(&self.params, &output)) {
            return Some(CollateralPlan {
                inputs,
                collateral_return: Some(output),
                total: required,
            });
        }
        if leftover.has_assets() {
            return None;
        }
        // Dust without tokens is forfeited with the collateral.
        u64::try_from(sum.coin()).ok().map(|total| CollateralPlan {
            inputs,
            collateral_return: None,
            total,
        })
    }

    fn candidate_pool(&self) -> Vec<Utxo> {
        let mut pool: Vec<Utxo> = self
            .utxo_scope
            .values()
            .filter(|utxo| !self.reference_inputs.contains(&utxo.input))
            .filter(|utxo| !utxo.output.address.payment_credential().is_script())
            .cloned()
            .collect();
        pool.sort_by(|a, b| a.input.cmp(&b.input));
        pool
    }

    fn select_collateral(
        &self,
        required: u64,
        return_address: Address,
    ) -> Result<CollateralPlan, TxBuilderError> {
        let pool = self.candidate_pool();
        let needed = i128::from(required);

        let single = pool
            .iter()
            .filter(|utxo| utxo.value().coin() >= needed)
            .filter_map(|utxo| {
                self.plan_for(vec![utxo.clone()], required, return_address)
                    .map(|plan| (utxo.value().asset_type_count(), plan))
            })
            .min_by_key(|(types, plan)| (*types, plan.inputs[0].input));
        if let Some((_, plan)) = single {
            return Ok(plan);
        }

        let mut ada_only: Vec<Utxo> = pool
            .into_iter()
            .filter(|utxo| !utxo.value().has_assets())
            .collect();
        ada_only.sort_by(|a, b| {
            b.value()
                .coin()
                .cmp(&a.value().coin())
                .then_with(|| a.input.cmp(&b.input))
        });

        let available: i128 = ada_only.iter().map(|utxo| utxo.value().coin()).sum();
        let max = self.params.max_collateral_inputs;
        let mut picked = Vec::new();
        let mut covered = 0i128;
        for utxo in ada_only {
            if covered >= needed {
                break;
            }
            covered += utxo.value().coin();
            picked.push(utxo);
        }

        if picked.is_empty() || covered < needed {
            return Err(TxBuilderError::InsufficientCollateral {
                required,
                available: u64::try_from(available).unwrap_or(u64::MAX),
            });
        }
        if picked.len() > usize::try_from(max).unwrap_or(usize::MAX) {
            return Err(TxBuilderError::TooManyCollateralInputs {
                required: picked.len(),
                max,
            });
        }
        self.plan_for(picked, required, return_address)
            .ok_or(TxBuilderError::InsufficientCollateral {
                required,
                available: u64::try_from(available).unwrap_or(u64::MAX),
            })
    }

    /// Choose collateral for the current fee. Transactions without redeemers
    /// carry none.
    pub(super) fn provision_collateral(&mut self) -> Result<(), TxBuilderError> {
        if self.redeemers.is_empty() {
            self.collateral.clear();
            self.collateral_return = None;
            self.total_collateral = None;
            return Ok(());
        }

        let required = self.required_collateral();
        let return_address = self
            .collateral_change_address
            .or(self.change_address)
            .ok_or(TxBuilderError::MissingChangeAddress)?;

        let provided = self.provided_collateral.clone();
        let max = usize::try_from(self.params.max_collateral_inputs).unwrap_or(usize::MAX);
        let plan = match (!provided.is_empty() && provided.len() <= max)
            .then(|| self.plan_for(provided, required, return_address))
            .flatten()
        {
            Some(plan) => plan,
            None => self.select_collateral(required, return_address)?,
        };

        debug!(
            required,
            inputs = plan.inputs.len(),
            total = plan.total,
            "collateral chosen"
        );
        self.collateral = plan.inputs.iter().map(|utxo| utxo.input).collect::<BTreeSet<_>>();
        self.collateral_return = plan.collateral_return;
        self.total_collateral = Some(plan.total);
        Ok(())
    }
}
