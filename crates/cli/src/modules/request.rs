//! JSON description of a transaction to build.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use tx_builder::{
    Address, AssetName, Credential, KeyHash, PlutusData, PolicyId, RewardAccount, Script,
    TransactionOutput, TxBuilder, Utxo,
};

#[derive(Clone, Debug, Deserialize)]
pub struct InputRequest {
    pub utxo: Utxo,
    #[serde(default)]
    pub redeemer: Option<PlutusData>,
    #[serde(default)]
    pub datum: Option<PlutusData>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MintRequest {
    pub policy: PolicyId,
    /// Hex asset name to signed quantity.
    pub assets: BTreeMap<String, i64>,
    #[serde(default)]
    pub redeemer: Option<PlutusData>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub account: RewardAccount,
    pub amount: u64,
    #[serde(default)]
    pub redeemer: Option<PlutusData>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CertificateRequest {
    StakeRegistration {
        credential: Credential,
    },
    StakeDeregistration {
        credential: Credential,
        #[serde(default)]
        redeemer: Option<PlutusData>,
    },
    StakeDelegation {
        credential: Credential,
        pool: KeyHash,
        #[serde(default)]
        redeemer: Option<PlutusData>,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    pub change_address: Address,
    #[serde(default)]
    pub collateral_change_address: Option<Address>,
    #[serde(default)]
    pub inputs: Vec<InputRequest>,
    #[serde(default)]
    pub reference_inputs: Vec<Utxo>,
    /// Pool coin selection draws from.
    #[serde(default)]
    pub spare_utxos: Vec<Utxo>,
    #[serde(default)]
    pub collateral: Vec<Utxo>,
    #[serde(default)]
    pub outputs: Vec<TransactionOutput>,
    #[serde(default)]
    pub mints: Vec<MintRequest>,
    #[serde(default)]
    pub withdrawals: Vec<WithdrawalRequest>,
    #[serde(default)]
    pub certificates: Vec<CertificateRequest>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    #[serde(default)]
    pub datums: Vec<PlutusData>,
    #[serde(default)]
    pub required_signers: Vec<KeyHash>,
    #[serde(default)]
    pub additional_signers: usize,
    #[serde(default)]
    pub valid_from: Option<u64>,
    #[serde(default)]
    pub valid_until: Option<u64>,
    #[serde(default)]
    pub donation: Option<u64>,
    #[serde(default)]
    pub minimum_fee: Option<u64>,
    #[serde(default)]
    pub fee_padding: Option<u64>,
}

impl BuildRequest {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("malformed build request")
    }

    /// Replay the request against `builder`, in the order a caller would.
    pub fn apply(self, builder: &mut TxBuilder) -> Result<()> {
        builder.set_change_address(self.change_address)?;
        if let Some(address) = self.collateral_change_address {
            builder.set_collateral_change_address(address)?;
        }

        for script in self.scripts {
            builder.provide_script(script)?;
        }
        for datum in self.datums {
            builder.provide_datum(datum)?;
        }
        for utxo in self.reference_inputs {
            builder.add_reference_input(utxo)?;
        }
        for input in self.inputs {
            let reference = input.utxo.input;
            builder
                .add_input(input.utxo, input.redeemer, input.datum)
                .with_context(|| format!("input {reference}"))?;
        }
        builder.add_unspent_outputs(self.spare_utxos)?;
        builder.provide_collateral(self.collateral)?;

        for (position, output) in self.outputs.into_iter().enumerate() {
            builder
                .add_output(output)
                .with_context(|| format!("output {position}"))?;
        }

        for mint in self.mints {
            let assets = mint
                .assets
                .into_iter()
                .map(|(name, amount)| {
                    let bytes = hex::decode(&name)
                        .with_context(|| format!("asset name '{name}' is not hex"))?;
                    Ok((AssetName::new(bytes)?, amount))
                })
                .collect::<Result<Vec<_>>>()?;
            builder.add_mint(mint.policy, assets, mint.redeemer)?;
        }

        for withdrawal in self.withdrawals {
            builder.add_withdrawal(withdrawal.account, withdrawal.amount, withdrawal.redeemer)?;
        }

        for certificate in self.certificates {
            match certificate {
                CertificateRequest::StakeRegistration { credential } => {
                    builder.add_register_stake(credential)?;
                }
                CertificateRequest::StakeDeregistration {
                    credential,
                    redeemer,
                } => {
                    builder.add_deregister_stake(credential, redeemer)?;
                }
                CertificateRequest::StakeDelegation {
                    credential,
                    pool,
                    redeemer,
                } => {
                    builder.add_delegation(credential, pool, redeemer)?;
                }
            }
        }

        for signer in self.required_signers {
            builder.add_required_signer(signer)?;
        }
        builder.add_additional_signers(self.additional_signers)?;

        if let Some(slot) = self.valid_from {
            builder.set_valid_from(slot)?;
        }
        if let Some(slot) = self.valid_until {
            builder.set_valid_until(slot)?;
        }
        if let Some(coin) = self.donation {
            builder.set_donation(coin)?;
        }
        if let Some(fee) = self.minimum_fee {
            builder.set_minimum_fee(fee)?;
        }
        if let Some(padding) = self.fee_padding {
            builder.set_fee_padding(padding)?;
        }

        Ok(())
    }
}
