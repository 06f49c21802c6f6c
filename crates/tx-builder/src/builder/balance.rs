use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{TxBuilder, fee};
use crate::error::{SelectionPhase, TxBuilderError, UtxoSelectionError};
use crate::ledger::{
    Address, CborEncode, Certificate, Credential, KeyHash, Language, NativeScript, Script,
    Transaction, TransactionBody, TransactionOutput, Utxo, VKeyWitness, WitnessSet,
};
use crate::script_data::compute_script_data;
use crate::value::Value;

/// Upper bound on balancing passes before giving up.
pub const MAX_BALANCE_ITERATIONS: usize = 10;

/// Change is split once its value grows past this share of `max_value_size`.
const CHANGE_SPLIT_PERCENT: u64 = 90;

/// Scripts that end up in the witness set, and the languages the body uses.
#[derive(Debug, Default)]
struct ResolvedScripts {
    native: Vec<NativeScript>,
    plutus_v1: Vec<Vec<u8>>,
    plutus_v2: Vec<Vec<u8>>,
    plutus_v3: Vec<Vec<u8>>,
    languages: BTreeSet<Language>,
    /// Keys named by `pubkey` leaves of the required native scripts.
    native_keys: BTreeSet<KeyHash>,
}

fn placeholder_vkey(index: usize) -> VKeyWitness {
    let mut vkey = [0u8; 32];
    vkey[..8].copy_from_slice(&u64::try_from(index).unwrap_or(u64::MAX).to_be_bytes());
    VKeyWitness {
        vkey,
        signature: [0u8; 64],
    }
}

impl TxBuilder {
    /// Everything spent minus everything produced, change excluded.
    fn surplus(&self) -> Value {
        let deposit = i128::from(self.params.stake_key_deposit);
        let mut spent: Value = self
            .inputs
            .iter()
            .filter_map(|input| self.utxo_scope.get(input))
            .map(Utxo::value)
            .sum();
        spent = spent.merge(&self.mint);

        let mut balance = i128::from(self.withdrawals.values().sum::<u64>());
        for certificate in &self.certificates {
            match certificate {
                Certificate::StakeRegistration(_) => balance -= deposit,
                Certificate::StakeDeregistration(_) => balance += deposit,
                Certificate::StakeDelegation { .. } => {}
            }
        }
        balance -= i128::from(self.fee);
        balance -= i128::from(self.donation.unwrap_or(0));

        let produced: Value = self.outputs.iter().map(|output| &output.value).sum();
        spent.merge(&Value::from_coin(balance)).sub(&produced)
    }

    fn spare_candidates(&self) -> Vec<Utxo> {
        self.spare_utxos
            .iter()
            .filter(|utxo| {
                !self.inputs.contains(&utxo.input) && !self.reference_inputs.contains(&utxo.input)
            })
            .cloned()
            .collect()
    }

    /// Spend whatever the selector picks for `dearth`.
    fn select_for(&mut self, dearth: &Value) -> Result<(), TxBuilderError> {
        let result = self
            .coin_selector
            .select(&self.spare_candidates(), dearth)
            .inspect_err(|err| {
                warn!(diagnostics = %err.diagnostics_json(), "coin selection failed");
            })?;
        if result.selected_inputs.is_empty() {
            return Err(UtxoSelectionError {
                phase: SelectionPhase::Final,
                dearth: dearth.clone(),
                available_inputs: result.remaining_inputs,
                selected_inputs: Vec::new(),
                best_step: None,
            }
            .into());
        }
        debug!(
            dearth = %dearth,
            picked = result.selected_inputs.len(),
            "coin selection"
        );
        for utxo in result.selected_inputs {
            self.add_input(utxo, None, None)?;
        }
        Ok(())
    }

    /// Lay `change` out over one or more outputs at `address`.
    ///
    /// Returns the base units still missing when the outputs cannot all carry
    /// their minimum deposit.
    fn layout_change(
        &self,
        address: Address,
        change: &Value,
    ) -> Result<Vec<TransactionOutput>, i128> {
        let single = TransactionOutput::new(address, change.clone());
        if u64::try_from(fee::value_size(change)).unwrap_or(u64::MAX) < self.params.max_value_size {
            let required = i128::from(fee::min_ada_for_output(&self.params, &single));
            return if change.coin() >= required {
                Ok(vec![single])
            } else {
                Err(required - change.coin())
            };
        }

        let limit = self.params.max_value_size * CHANGE_SPLIT_PERCENT / 100;
        let mut bundles: Vec<Value> = Vec::new();
        let mut current = Value::zero();
        for (asset, quantity) in change.assets() {
            let candidate = current.clone().with_asset(asset.clone(), *quantity);
            let size = u64::try_from(fee::value_size(&candidate)).unwrap_or(u64::MAX);
            if size > limit && current.has_assets() {
                bundles.push(current);
                current = Value::zero().with_asset(asset.clone(), *quantity);
            } else {
                current = candidate;
            }
        }
        bundles.push(current);
        debug!(bundles = bundles.len(), limit, "splitting change");

        let mut outputs = Vec::with_capacity(bundles.len());
        let mut coin_left = change.coin();
        let last = bundles.len() - 1;
        for (position, bundle) in bundles.into_iter().enumerate() {
            let output = TransactionOutput::new(address, bundle);
            let deposit = i128::from(fee::min_ada_upper_bound(&self.params, &output));
            if position == last {
                if coin_left < deposit {
                    return Err(deposit - coin_left);
                }
                outputs.push(TransactionOutput::new(
                    address,
                    output.value.merge(&Value::from_coin(coin_left)),
                ));
            } else {
                coin_left -= deposit;
                outputs.push(TransactionOutput::new(
                    address,
                    output.value.merge(&Value::from_coin(deposit)),
                ));
            }
        }
        Ok(outputs)
    }

    /// Select until nothing is owed, then rebuild the change outputs.
    fn cover_deficits(&mut self, change_address: Address) -> Result<(), TxBuilderError> {
        loop {
            let surplus = self.surplus();
            let owed = surplus.negatives();
            if !owed.is_empty() {
                self.select_for(&owed.negate())?;
                continue;
            }

            if surplus.is_empty() {
                self.change_outputs.clear();
                return Ok(());
            }

            match self.layout_change(change_address, &surplus) {
                Ok(outputs) => {
                    self.change_outputs = outputs;
                    return Ok(());
                }
                Err(shortfall) => {
                    let dearth = Value::from_coin(shortfall);
                    if self.spare_candidates().is_empty() && !surplus.has_assets() {
                        // Too little for a change output and nothing left to add.
                        let dust = u64::try_from(surplus.coin()).unwrap_or(0);
                        debug!(dust, "folding change dust into the fee");
                        self.fee = self.fee.saturating_add(dust);
                        self.change_outputs.clear();
                        return Ok(());
                    }
                    self.select_for(&dearth)?;
                }
            }
        }
    }

    /// A transaction needs at least one input; take the spare UTxO with the
    /// fewest asset types.
    fn ensure_some_input(&mut self, change_address: Address) -> Result<(), TxBuilderError> {
        if !self.inputs.is_empty() {
            return Ok(());
        }
        let pick = self
            .spare_candidates()
            .into_iter()
            .min_by_key(|utxo| (utxo.value().asset_type_count(), utxo.input))
            .ok_or(TxBuilderError::NoInputs)?;
        self.add_input(pick, None, None)?;
        self.cover_deficits(change_address)
    }

    fn body(&self) -> TransactionBody {
        let mut outputs = self.outputs.clone();
        outputs.extend(self.change_outputs.iter().cloned());
        TransactionBody {
            inputs: self.inputs.clone(),
            outputs,
            fee: self.fee,
            ttl: self.ttl,
            certificates: self.certificates.clone(),
            withdrawals: self.withdrawals.clone(),
            validity_start: self.validity_start,
            mint: self.mint.clone(),
            script_data_hash: None,
            collateral: self.collateral.clone(),
            required_signers: self.required_signers.clone(),
            collateral_return: self.collateral_return.clone(),
            total_collateral: self.total_collateral,
            reference_inputs: self.reference_inputs.clone(),
            donation: self.donation,
        }
    }

    fn resolve_scripts(&self) -> Result<ResolvedScripts, TxBuilderError> {
        let mut resolved = ResolvedScripts::default();

        for hash in self.witnesses.native_scripts() {
            match self.scripts.get(hash) {
                Some(Script::Native(native)) => {
                    resolved.native_keys.extend(native.key_hashes());
                    if !self.scripts.is_referenced(hash) {
                        resolved.native.push(native.clone());
                    }
                }
                Some(_) => {
                    return Err(TxBuilderError::ScriptKindMismatch {
                        hash: *hash,
                        expected: "native",
                    });
                }
                None => return Err(TxBuilderError::UnresolvableScript(*hash)),
            }
        }

        for hash in self.witnesses.plutus_scripts() {
            let script = self
                .scripts
                .get(hash)
                .ok_or(TxBuilderError::UnresolvableScript(*hash))?;
            let language = script.language().ok_or(TxBuilderError::ScriptKindMismatch {
                hash: *hash,
                expected: "plutus",
            })?;
            resolved.languages.insert(language);
            if self.scripts.is_referenced(hash) {
                continue;
            }
            let bytes = script.raw_bytes();
            match language {
                Language::PlutusV1 => resolved.plutus_v1.push(bytes),
                Language::PlutusV2 => resolved.plutus_v2.push(bytes),
                Language::PlutusV3 => resolved.plutus_v3.push(bytes),
            }
        }

        Ok(resolved)
    }

    /// Body and witness set for the current state. Placeholder signatures are
    /// included when `with_placeholders` is set so the size matches a signed
    /// transaction.
    fn assemble(&self, with_placeholders: bool) -> Result<Transaction, TxBuilderError> {
        let mut body = self.body();
        let scripts = self.resolve_scripts()?;
        let redeemers = self.redeemers.resolve(&body);

        body.script_data_hash = compute_script_data(
            &redeemers,
            &self.datums,
            &scripts.languages,
            &self.params.cost_models,
        )?
        .map(|data| data.hash);

        let vkeys = if with_placeholders {
            let mut signers: BTreeSet<KeyHash> = self.witnesses.vkeys().copied().collect();
            signers.extend(scripts.native_keys.iter().copied());
            signers.extend(
                self.collateral
                    .iter()
                    .filter_map(|input| self.utxo_scope.get(input))
                    .filter_map(|utxo| match utxo.output.address.payment_credential() {
                        Credential::KeyHash(hash) => Some(*hash),
                        Credential::ScriptHash(_) => None,
                    }),
            );
            (0..signers.len() + self.additional_signers)
                .map(placeholder_vkey)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Transaction {
            body,
            witness_set: WitnessSet {
                vkeys,
                native_scripts: scripts.native,
                plutus_v1_scripts: scripts.plutus_v1,
                plutus_data: self.datums.clone(),
                redeemers,
                plutus_v2_scripts: scripts.plutus_v2,
                plutus_v3_scripts: scripts.plutus_v3,
            },
            is_valid: true,
        })
    }

    fn reference_script_size(&self) -> u64 {
        self.inputs
            .iter()
            .chain(&self.reference_inputs)
            .filter_map(|input| self.utxo_scope.get(input))
            .filter_map(|utxo| utxo.output.script_ref.as_ref())
            .map(|script| u64::try_from(script.size()).unwrap_or(u64::MAX))
            .sum()
    }

    fn estimate_fee(&self, draft: &Transaction) -> u64 {
        fee::min_fee(
            &self.params,
            draft.cbor_len(),
            self.reference_script_size(),
            &draft.witness_set.redeemers,
        )
    }

    async fn evaluate(&mut self, draft: &Transaction) -> Result<(), TxBuilderError> {
        let Some(evaluator) = self.evaluator.as_ref().map(Arc::clone) else {
            return Ok(());
        };
        let scope: Vec<Utxo> = self.utxo_scope.values().cloned().collect();

        let call = evaluator.evaluate(draft, &scope);
        let evaluated = match self.evaluation_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| TxBuilderError::EvaluationTimeout(limit))??,
            None => call.await?,
        };

        self.redeemers.apply_ex_units(&draft.body, &evaluated)
    }

    /// Balance, evaluate and price the transaction.
    ///
    /// Each pass recomputes the surplus from scratch, selects inputs for what is
    /// owed, rebuilds change and collateral, evaluates the scripts and
    /// re-estimates the fee. The loop ends once the estimate no longer exceeds
    /// the fee the body already carries. The returned transaction has no vkey
    /// witnesses; signing happens elsewhere.
    pub async fn complete(&mut self) -> Result<Transaction, TxBuilderError> {
        self.ensure_open()?;
        let change_address = self
            .change_address
            .ok_or(TxBuilderError::MissingChangeAddress)?;
        if self.fee_padding > 0 || self.minimum_fee > 0 {
            warn!(
                padding = self.fee_padding,
                minimum = self.minimum_fee,
                "fee is raised above the calculated minimum"
            );
        }

        for iteration in 1..=MAX_BALANCE_ITERATIONS {
            self.cover_deficits(change_address)?;
            self.ensure_some_input(change_address)?;
            self.provision_collateral()?;

            if !self.redeemers.is_empty() {
                let draft = self.assemble(true)?;
                self.evaluate(&draft).await?;
            }

            let draft = self.assemble(true)?;
            let estimate = self
                .estimate_fee(&draft)
                .max(self.minimum_fee)
                .saturating_add(self.fee_padding);
            debug!(iteration, fee = self.fee, estimate, "balancing pass");

            if estimate <= self.fee {
                let size = u64::try_from(draft.cbor_len()).unwrap_or(u64::MAX);
                if size > self.params.max_tx_size {
                    return Err(TxBuilderError::TransactionTooLarge {
                        size,
                        max: self.params.max_tx_size,
                    });
                }
                let transaction = self.assemble(false)?;
                self.completed = true;
                info!(
                    tx_id = %transaction.id(),
                    fee = self.fee,
                    inputs = transaction.body.inputs.len(),
                    outputs = transaction.body.outputs.len(),
                    iterations = iteration,
                    "transaction balanced"
                );
                return Ok(transaction);
            }
            self.fee = estimate;
        }

        Err(TxBuilderError::DidNotConverge {
            iterations: MAX_BALANCE_ITERATIONS,
            fee: self.fee,
        })
    }

    /// CBOR of the transaction as it stands, without placeholder signatures.
    pub fn to_draft_cbor(&self) -> Result<Vec<u8>, TxBuilderError> {
        Ok(self.assemble(false)?.to_cbor())
    }
}
