//! Incremental transaction builder.
//!
//! A [`TxBuilder`] accumulates inputs, outputs, mints, withdrawals, certificates
//! and their witnesses, then [`TxBuilder::complete`] runs the balancing loop:
//! coin selection, change, collateral, script data hash, evaluation and fee
//! estimation, repeated until the fee stops moving.
//!
//! Redeemers are tracked by what they unlock and get their ledger index only when
//! the body is assembled, so inputs picked by coin selection never leave a
//! redeemer pointing at the wrong input.

mod balance;
mod collateral;
pub mod fee;
pub mod witnesses;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::coin_selection::{CoinSelector, WideDeepSelector};
use crate::error::TxBuilderError;
use crate::evaluator::Evaluator;
use crate::ledger::{
    Address, Certificate, Credential, Datum, KeyHash, PlutusData, PolicyId, RewardAccount,
    Script, TransactionInput, TransactionOutput, Utxo,
};
use crate::params::ProtocolParameters;
use crate::value::{AssetId, AssetName, Value};

pub use balance::MAX_BALANCE_ITERATIONS;
pub use witnesses::{RedeemerPurpose, RequiredWitness};

use witnesses::{RedeemerSet, RequiredWitnesses, ScriptScope};

pub struct TxBuilder {
    params: ProtocolParameters,

    inputs: BTreeSet<TransactionInput>,
    reference_inputs: BTreeSet<TransactionInput>,
    /// Every UTxO the builder can resolve: inputs, reference inputs, spare pool
    /// and collateral candidates.
    utxo_scope: BTreeMap<TransactionInput, Utxo>,
    spare_utxos: Vec<Utxo>,
    provided_collateral: Vec<Utxo>,

    outputs: Vec<TransactionOutput>,
    change_outputs: Vec<TransactionOutput>,
    change_address: Option<Address>,
    collateral_change_address: Option<Address>,

    mint: Value,
    withdrawals: BTreeMap<RewardAccount, u64>,
    certificates: Vec<Certificate>,
    required_signers: BTreeSet<KeyHash>,
    additional_signers: usize,
    validity_start: Option<u64>,
    ttl: Option<u64>,
    donation: Option<u64>,

    fee: u64,
    minimum_fee: u64,
    fee_padding: u64,

    collateral: BTreeSet<TransactionInput>,
    collateral_return: Option<TransactionOutput>,
    total_collateral: Option<u64>,

    witnesses: RequiredWitnesses,
    scripts: ScriptScope,
    redeemers: RedeemerSet,
    datums: Vec<PlutusData>,

    coin_selector: Box<dyn CoinSelector>,
    evaluator: Option<Arc<dyn Evaluator>>,
    evaluation_timeout: Option<Duration>,
    completed: bool,
}

impl fmt::Debug for TxBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxBuilder")
            .field("inputs", &self.inputs)
            .field("reference_inputs", &self.reference_inputs)
            .field("outputs", &self.outputs)
            .field("change_outputs", &self.change_outputs)
            .field("mint", &self.mint)
            .field("fee", &self.fee)
            .field("collateral", &self.collateral)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

fn amount_i64(amount: i128, what: &str) -> Result<i128, TxBuilderError> {
    i64::try_from(amount)
        .map(i128::from)
        .map_err(|_| TxBuilderError::AmountOutOfRange(format!("{what} {amount}")))
}

fn amount_u64(amount: i128, what: &str) -> Result<u64, TxBuilderError> {
    u64::try_from(amount).map_err(|_| TxBuilderError::AmountOutOfRange(format!("{what} {amount}")))
}

impl TxBuilder {
    #[must_use]
    pub fn new(params: ProtocolParameters) -> Self {
        Self {
            params,
            inputs: BTreeSet::new(),
            reference_inputs: BTreeSet::new(),
            utxo_scope: BTreeMap::new(),
            spare_utxos: Vec::new(),
            provided_collateral: Vec::new(),
            outputs: Vec::new(),
            change_outputs: Vec::new(),
            change_address: None,
            collateral_change_address: None,
            mint: Value::zero(),
            withdrawals: BTreeMap::new(),
            certificates: Vec::new(),
            required_signers: BTreeSet::new(),
            additional_signers: 0,
            validity_start: None,
            ttl: None,
            donation: None,
            fee: 0,
            minimum_fee: 0,
            fee_padding: 0,
            collateral: BTreeSet::new(),
            collateral_return: None,
            total_collateral: None,
            witnesses: RequiredWitnesses::default(),
            scripts: ScriptScope::default(),
            redeemers: RedeemerSet::default(),
            datums: Vec::new(),
            coin_selector: Box::new(WideDeepSelector),
            evaluator: None,
            evaluation_timeout: None,
            completed: false,
        }
    }

    #[must_use]
    pub const fn params(&self) -> &ProtocolParameters {
        &self.params
    }

    /// Fee currently carried by the body.
    #[must_use]
    pub const fn fee(&self) -> u64 {
        self.fee
    }

    fn ensure_open(&self) -> Result<(), TxBuilderError> {
        if self.completed {
            return Err(TxBuilderError::AlreadyCompleted);
        }
        Ok(())
    }

    fn require_credential(&mut self, credential: &Credential) {
        let witness = match credential {
            Credential::KeyHash(hash) => RequiredWitness::VKey(*hash),
            Credential::ScriptHash(hash) => RequiredWitness::NativeScript(*hash),
        };
        self.witnesses.insert(witness);
    }

    fn register_redeemer(
        &mut self,
        purpose: RedeemerPurpose,
        credential: &Credential,
        redeemer: PlutusData,
        label: String,
    ) -> Result<(), TxBuilderError> {
        let Credential::ScriptHash(hash) = credential else {
            return Err(TxBuilderError::RedeemerForKeyCredential(label));
        };
        self.witnesses.insert(RequiredWitness::PlutusScript(*hash));
        self.redeemers.insert(
            purpose,
            redeemer,
            self.params.max_execution_units_per_transaction,
        );
        Ok(())
    }

    fn push_datum(&mut self, datum: PlutusData) {
        if !self.datums.contains(&datum) {
            self.datums.push(datum);
        }
    }

    fn track_utxo(&mut self, utxo: &Utxo) {
        self.utxo_scope
            .entry(utxo.input)
            .or_insert_with(|| utxo.clone());
    }

    /// Spend `utxo`.
    ///
    /// With a redeemer the output must be script-locked and carry a datum; a
    /// datum that is only referenced by hash has to be supplied as `datum`.
    /// Without a redeemer the payment credential is witnessed by a key or a
    /// native script.
    pub fn add_input(
        &mut self,
        utxo: Utxo,
        redeemer: Option<PlutusData>,
        datum: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if self.inputs.contains(&utxo.input) || self.reference_inputs.contains(&utxo.input) {
            return Err(TxBuilderError::DuplicateInput(utxo.input));
        }

        let credential = *utxo.output.address.payment_credential();
        match redeemer {
            Some(redeemer) => {
                if !credential.is_script() {
                    return Err(TxBuilderError::RedeemerForKeyCredential(
                        utxo.input.to_string(),
                    ));
                }
                match (&utxo.output.datum, datum) {
                    (None, _) => return Err(TxBuilderError::MissingDatum(utxo.input)),
                    (Some(Datum::Inline(_)), Some(_)) => {
                        return Err(TxBuilderError::InlineDatumConflict(utxo.input));
                    }
                    (Some(Datum::Inline(_)), None) => {}
                    (Some(Datum::Hash(_)), None) => {
                        return Err(TxBuilderError::DatumRequired(utxo.input));
                    }
                    (Some(Datum::Hash(expected)), Some(datum)) => {
                        let actual = datum.hash();
                        if actual != *expected {
                            return Err(TxBuilderError::DatumHashMismatch {
                                input: utxo.input,
                                expected: *expected,
                                actual,
                            });
                        }
                        self.push_datum(datum);
                    }
                }
                self.register_redeemer(
                    RedeemerPurpose::Spend(utxo.input),
                    &credential,
                    redeemer,
                    utxo.input.to_string(),
                )?;
            }
            None => self.require_credential(&credential),
        }

        if let Some(script) = &utxo.output.script_ref {
            self.scripts.reference(script.clone());
        }
        debug!(input = %utxo.input, value = %utxo.output.value, "input added");
        self.inputs.insert(utxo.input);
        self.utxo_scope.insert(utxo.input, utxo);
        Ok(self)
    }

    /// Read `utxo` without spending it; a script it carries becomes usable by
    /// reference.
    pub fn add_reference_input(&mut self, utxo: Utxo) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if self.reference_inputs.contains(&utxo.input) || self.inputs.contains(&utxo.input) {
            return Err(TxBuilderError::DuplicateReferenceInput(utxo.input));
        }
        if let Some(script) = &utxo.output.script_ref {
            self.scripts.reference(script.clone());
        }
        self.reference_inputs.insert(utxo.input);
        self.utxo_scope.insert(utxo.input, utxo);
        Ok(self)
    }

    /// Add to the pool coin selection draws from.
    pub fn add_unspent_outputs(
        &mut self,
        utxos: impl IntoIterator<Item = Utxo>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        for utxo in utxos {
            if self.spare_utxos.iter().any(|spare| spare.input == utxo.input) {
                continue;
            }
            self.track_utxo(&utxo);
            self.spare_utxos.push(utxo);
        }
        Ok(self)
    }

    /// Preferred collateral, used when its base units cover the requirement.
    pub fn provide_collateral(
        &mut self,
        utxos: impl IntoIterator<Item = Utxo>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        for utxo in utxos {
            self.track_utxo(&utxo);
            self.provided_collateral.push(utxo);
        }
        Ok(self)
    }

    /// Attach a script to the witness set when it is required.
    pub fn provide_script(&mut self, script: Script) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.scripts.attach(script);
        Ok(self)
    }

    /// Include a datum in the witness set.
    pub fn provide_datum(&mut self, datum: PlutusData) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.push_datum(datum);
        Ok(self)
    }

    pub fn add_output(&mut self, output: TransactionOutput) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if !output.value.is_non_negative() {
            return Err(TxBuilderError::NegativeOutputValue(output.value));
        }
        amount_u64(output.value.coin(), "output coin")?;
        for quantity in output.value.assets().values() {
            amount_u64(*quantity, "output asset quantity")?;
        }

        let size = fee::value_size(&output.value);
        if u64::try_from(size).unwrap_or(u64::MAX) > self.params.max_value_size {
            return Err(TxBuilderError::ValueTooLarge {
                size,
                max: self.params.max_value_size,
            });
        }

        let required = fee::min_ada_for_output(&self.params, &output);
        if output.value.coin() < i128::from(required) {
            return Err(TxBuilderError::MinimumAdaNotMet {
                address: output.address.to_string(),
                required,
                actual: output.value.coin(),
            });
        }

        self.outputs.push(output);
        Ok(self)
    }

    pub fn pay_lovelace(
        &mut self,
        address: Address,
        coin: u64,
        datum: Option<Datum>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.pay_assets(address, Value::from_coin(i128::from(coin)), datum)
    }

    pub fn pay_assets(
        &mut self,
        address: Address,
        value: Value,
        datum: Option<Datum>,
    ) -> Result<&mut Self, TxBuilderError> {
        let mut output = TransactionOutput::new(address, value);
        output.datum = datum;
        self.add_output(output)
    }

    /// Mint (positive) or burn (negative) `assets` under `policy`.
    ///
    /// Repeated calls for the same policy merge their amounts. A policy may carry
    /// at most one redeemer; without one it is witnessed by a native script.
    pub fn add_mint(
        &mut self,
        policy: PolicyId,
        assets: impl IntoIterator<Item = (AssetName, i64)>,
        redeemer: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        let purpose = RedeemerPurpose::Mint(policy);
        let delta = Value::from_parts(
            0,
            assets
                .into_iter()
                .map(|(name, amount)| (AssetId::new(policy, name), i128::from(amount))),
        );
        let merged = self.mint.merge(&delta);
        for quantity in merged.assets().values() {
            amount_i64(*quantity, "mint quantity")?;
        }

        match redeemer {
            Some(redeemer) => {
                if self.redeemers.contains(&purpose) {
                    return Err(TxBuilderError::DuplicateMintRedeemer(policy));
                }
                self.register_redeemer(
                    purpose,
                    &Credential::ScriptHash(policy),
                    redeemer,
                    policy.to_string(),
                )?;
            }
            None if self.redeemers.contains(&purpose) => {}
            None => self
                .witnesses
                .insert(RequiredWitness::NativeScript(policy)),
        }

        self.mint = merged;
        Ok(self)
    }

    pub fn add_withdrawal(
        &mut self,
        account: RewardAccount,
        amount: u64,
        redeemer: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if self.withdrawals.contains_key(&account) {
            return Err(TxBuilderError::DuplicateWithdrawal(account));
        }
        match redeemer {
            Some(redeemer) => self.register_redeemer(
                RedeemerPurpose::Reward(account),
                &account.credential,
                redeemer,
                account.to_string(),
            )?,
            None => self.require_credential(&account.credential),
        }
        self.withdrawals.insert(account, amount);
        Ok(self)
    }

    /// Register a stake credential. Pays the key deposit; no witness is needed.
    pub fn add_register_stake(
        &mut self,
        credential: Credential,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.certificates
            .push(Certificate::StakeRegistration(credential));
        Ok(self)
    }

    /// Deregister a stake credential, refunding the key deposit.
    pub fn add_deregister_stake(
        &mut self,
        credential: Credential,
        redeemer: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.push_witnessed_certificate(
            Certificate::StakeDeregistration(credential),
            credential,
            redeemer,
        )
    }

    pub fn add_delegation(
        &mut self,
        credential: Credential,
        pool: KeyHash,
        redeemer: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.push_witnessed_certificate(
            Certificate::StakeDelegation { credential, pool },
            credential,
            redeemer,
        )
    }

    fn push_witnessed_certificate(
        &mut self,
        certificate: Certificate,
        credential: Credential,
        redeemer: Option<PlutusData>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        let position = self.certificates.len();
        match redeemer {
            Some(redeemer) => self.register_redeemer(
                RedeemerPurpose::Cert(position),
                &credential,
                redeemer,
                format!("certificate {position}"),
            )?,
            None => self.require_credential(&credential),
        }
        self.certificates.push(certificate);
        Ok(self)
    }

    pub fn add_required_signer(&mut self, key_hash: KeyHash) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.required_signers.insert(key_hash);
        self.witnesses.insert(RequiredWitness::VKey(key_hash));
        Ok(self)
    }

    /// Reserve fee room for `count` signatures the builder cannot infer.
    pub fn add_additional_signers(&mut self, count: usize) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.additional_signers = self.additional_signers.saturating_add(count);
        Ok(self)
    }

    pub fn set_valid_from(&mut self, slot: u64) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if self.validity_start.is_some() {
            return Err(TxBuilderError::ValidityAlreadySet("validity start"));
        }
        self.validity_start = Some(slot);
        Ok(self)
    }

    pub fn set_valid_until(&mut self, slot: u64) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        if self.ttl.is_some() {
            return Err(TxBuilderError::ValidityAlreadySet("validity end"));
        }
        self.ttl = Some(slot);
        Ok(self)
    }

    /// Treasury donation.
    pub fn set_donation(&mut self, coin: u64) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.donation = (coin > 0).then_some(coin);
        Ok(self)
    }

    pub fn set_change_address(&mut self, address: Address) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.change_address = Some(address);
        Ok(self)
    }

    /// Where the collateral return goes; defaults to the change address.
    pub fn set_collateral_change_address(
        &mut self,
        address: Address,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.collateral_change_address = Some(address);
        Ok(self)
    }

    /// Floor for the final fee.
    pub fn set_minimum_fee(&mut self, fee: u64) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.minimum_fee = fee;
        Ok(self)
    }

    /// Added on top of every fee estimate.
    pub fn set_fee_padding(&mut self, padding: u64) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.fee_padding = padding;
        Ok(self)
    }

    pub fn use_coin_selector(
        &mut self,
        selector: Box<dyn CoinSelector>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.coin_selector = selector;
        Ok(self)
    }

    pub fn use_evaluator(
        &mut self,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.evaluator = Some(evaluator);
        Ok(self)
    }

    /// Bound a single evaluator call.
    pub fn set_evaluation_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<&mut Self, TxBuilderError> {
        self.ensure_open()?;
        self.evaluation_timeout = Some(timeout);
        Ok(self)
    }
}
