use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::address::{Address, Credential, RewardAccount};
use super::cbor::{CborEncode, EncodeError, Encoder, len_u64, write_embedded};
use super::data::{Datum, PlutusData};
use super::hash::{KeyHash, ScriptDataHash, TxHash, blake2b_256};
use super::script::NativeScript;
use crate::value::Value;

/// Reference to an output of a previous transaction.
///
/// Ordered by `(transaction_id, index)`, the order of the ledger's input set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionInput {
    pub transaction_id: TxHash,
    pub index: u32,
}

impl TransactionInput {
    #[must_use]
    pub const fn new(transaction_id: TxHash, index: u32) -> Self {
        Self {
            transaction_id,
            index,
        }
    }
}

impl fmt::Display for TransactionInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transaction_id, self.index)
    }
}

impl CborEncode for TransactionInput {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.array(2)?
            .bytes(self.transaction_id.as_ref())?
            .u32(self.index)?;
        Ok(())
    }
}

/// Amounts reaching the encoder have already been range-checked by the builder.
pub(crate) fn ledger_coin(amount: i128) -> u64 {
    u64::try_from(amount.max(0)).unwrap_or(u64::MAX)
}

pub(crate) fn ledger_int(amount: i128) -> i64 {
    i64::try_from(amount).unwrap_or(if amount < 0 { i64::MIN } else { i64::MAX })
}

fn encode_multiasset(
    e: &mut Encoder,
    value: &Value,
    quantity: impl Fn(&mut Encoder, i128) -> Result<(), EncodeError>,
) -> Result<(), EncodeError> {
    let grouped = value.assets_by_policy();
    e.map(len_u64(grouped.len()))?;
    for (policy, names) in grouped {
        e.bytes(policy.as_ref())?.map(len_u64(names.len()))?;
        for (name, amount) in names {
            e.bytes(name.as_bytes())?;
            quantity(e, amount)?;
        }
    }
    Ok(())
}

/// Output value: a bare coin, or `[coin, multiasset]`.
impl CborEncode for Value {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        if !self.has_assets() {
            e.u64(ledger_coin(self.coin()))?;
            return Ok(());
        }
        e.array(2)?.u64(ledger_coin(self.coin()))?;
        encode_multiasset(e, self, |e, amount| {
            e.u64(ledger_coin(amount))?;
            Ok(())
        })
    }
}

fn encode_mint(e: &mut Encoder, mint: &Value) -> Result<(), EncodeError> {
    encode_multiasset(e, mint, |e, amount| {
        e.i64(ledger_int(amount))?;
        Ok(())
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<Datum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_ref: Option<super::script::Script>,
}

impl TransactionOutput {
    #[must_use]
    pub const fn new(address: Address, value: Value) -> Self {
        Self {
            address,
            value,
            datum: None,
            script_ref: None,
        }
    }

    #[must_use]
    pub fn with_datum(mut self, datum: Datum) -> Self {
        self.datum = Some(datum);
        self
    }

    #[must_use]
    pub fn with_script_ref(mut self, script: super::script::Script) -> Self {
        self.script_ref = Some(script);
        self
    }
}

/// Post-Alonzo map-form output.
impl CborEncode for TransactionOutput {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        let fields = 2 + u64::from(self.datum.is_some()) + u64::from(self.script_ref.is_some());
        e.map(fields)?.u8(0)?;
        self.address.encode_cbor(e)?;
        e.u8(1)?;
        self.value.encode_cbor(e)?;
        if let Some(datum) = &self.datum {
            e.u8(2)?;
            datum.encode_cbor(e)?;
        }
        if let Some(script) = &self.script_ref {
            e.u8(3)?;
            write_embedded(e, &script.to_cbor())?;
        }
        Ok(())
    }
}

/// An unspent output together with the reference that locates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub input: TransactionInput,
    pub output: TransactionOutput,
}

impl Utxo {
    #[must_use]
    pub const fn new(input: TransactionInput, output: TransactionOutput) -> Self {
        Self { input, output }
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.output.value
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Certificate {
    StakeRegistration(Credential),
    StakeDeregistration(Credential),
    StakeDelegation { credential: Credential, pool: KeyHash },
}

impl CborEncode for Certificate {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            Self::StakeRegistration(credential) => {
                e.array(2)?.u8(0)?;
                credential.encode_cbor(e)?;
            }
            Self::StakeDeregistration(credential) => {
                e.array(2)?.u8(1)?;
                credential.encode_cbor(e)?;
            }
            Self::StakeDelegation { credential, pool } => {
                e.array(3)?.u8(2)?;
                credential.encode_cbor(e)?;
                e.bytes(pool.as_ref())?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl ExUnits {
    #[must_use]
    pub const fn new(mem: u64, steps: u64) -> Self {
        Self { mem, steps }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemerTag {
    Spend,
    Mint,
    Cert,
    Reward,
}

impl RedeemerTag {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Spend => 0,
            Self::Mint => 1,
            Self::Cert => 2,
            Self::Reward => 3,
        }
    }
}

impl fmt::Display for RedeemerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spend => f.write_str("spend"),
            Self::Mint => f.write_str("mint"),
            Self::Cert => f.write_str("cert"),
            Self::Reward => f.write_str("reward"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    pub data: PlutusData,
    pub ex_units: ExUnits,
}

impl CborEncode for Redeemer {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.array(4)?.u8(self.tag.code())?.u32(self.index)?;
        self.data.encode_cbor(e)?;
        e.array(2)?.u64(self.ex_units.mem)?.u64(self.ex_units.steps)?;
        Ok(())
    }
}

fn encode_array<T: CborEncode>(e: &mut Encoder, items: &[T]) -> Result<(), EncodeError> {
    e.array(len_u64(items.len()))?;
    for item in items {
        item.encode_cbor(e)?;
    }
    Ok(())
}

fn encode_set<'a, T: CborEncode + 'a>(
    e: &mut Encoder,
    items: impl ExactSizeIterator<Item = &'a T>,
) -> Result<(), EncodeError> {
    e.array(len_u64(items.len()))?;
    for item in items {
        item.encode_cbor(e)?;
    }
    Ok(())
}

/// The redeemer array as it appears in the witness set and in the script data
/// preimage.
#[must_use]
pub fn encode_redeemers(redeemers: &[Redeemer]) -> Vec<u8> {
    super::cbor::encode_with(|e| encode_array(e, redeemers))
}

/// The datum array as it appears in the witness set and in the script data
/// preimage.
#[must_use]
pub fn encode_datums(datums: &[PlutusData]) -> Vec<u8> {
    super::cbor::encode_with(|e| encode_array(e, datums))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionBody {
    pub inputs: BTreeSet<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub fee: u64,
    pub ttl: Option<u64>,
    pub certificates: Vec<Certificate>,
    pub withdrawals: BTreeMap<RewardAccount, u64>,
    pub validity_start: Option<u64>,
    pub mint: Value,
    pub script_data_hash: Option<ScriptDataHash>,
    pub collateral: BTreeSet<TransactionInput>,
    pub required_signers: BTreeSet<KeyHash>,
    pub collateral_return: Option<TransactionOutput>,
    pub total_collateral: Option<u64>,
    pub reference_inputs: BTreeSet<TransactionInput>,
    pub donation: Option<u64>,
}

impl CborEncode for TransactionBody {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        let present = [
            true,
            true,
            true,
            self.ttl.is_some(),
            !self.certificates.is_empty(),
            !self.withdrawals.is_empty(),
            self.validity_start.is_some(),
            self.mint.has_assets(),
            self.script_data_hash.is_some(),
            !self.collateral.is_empty(),
            !self.required_signers.is_empty(),
            self.collateral_return.is_some(),
            self.total_collateral.is_some(),
            !self.reference_inputs.is_empty(),
            self.donation.is_some(),
        ];
        e.map(len_u64(present.iter().filter(|field| **field).count()))?;

        e.u8(0)?;
        encode_set(e, self.inputs.iter())?;
        e.u8(1)?;
        encode_array(e, &self.outputs)?;
        e.u8(2)?.u64(self.fee)?;
        if let Some(ttl) = self.ttl {
            e.u8(3)?.u64(ttl)?;
        }
        if !self.certificates.is_empty() {
            e.u8(4)?;
            encode_array(e, &self.certificates)?;
        }
        if !self.withdrawals.is_empty() {
            e.u8(5)?.map(len_u64(self.withdrawals.len()))?;
            for (account, amount) in &self.withdrawals {
                account.encode_cbor(e)?;
                e.u64(*amount)?;
            }
        }
        if let Some(start) = self.validity_start {
            e.u8(8)?.u64(start)?;
        }
        if self.mint.has_assets() {
            e.u8(9)?;
            encode_mint(e, &self.mint)?;
        }
        if let Some(hash) = &self.script_data_hash {
            e.u8(11)?.bytes(hash.as_ref())?;
        }
        if !self.collateral.is_empty() {
            e.u8(13)?;
            encode_set(e, self.collateral.iter())?;
        }
        if !self.required_signers.is_empty() {
            e.u8(14)?.array(len_u64(self.required_signers.len()))?;
            for signer in &self.required_signers {
                e.bytes(signer.as_ref())?;
            }
        }
        if let Some(output) = &self.collateral_return {
            e.u8(16)?;
            output.encode_cbor(e)?;
        }
        if let Some(total) = self.total_collateral {
            e.u8(17)?.u64(total)?;
        }
        if !self.reference_inputs.is_empty() {
            e.u8(18)?;
            encode_set(e, self.reference_inputs.iter())?;
        }
        if let Some(donation) = self.donation {
            e.u8(22)?.u64(donation)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VKeyWitness {
    pub vkey: [u8; 32],
    pub signature: [u8; 64],
}

impl CborEncode for VKeyWitness {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.array(2)?.bytes(&self.vkey)?.bytes(&self.signature)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WitnessSet {
    pub vkeys: Vec<VKeyWitness>,
    pub native_scripts: Vec<NativeScript>,
    pub plutus_v1_scripts: Vec<Vec<u8>>,
    pub plutus_data: Vec<PlutusData>,
    pub redeemers: Vec<Redeemer>,
    pub plutus_v2_scripts: Vec<Vec<u8>>,
    pub plutus_v3_scripts: Vec<Vec<u8>>,
}

impl CborEncode for WitnessSet {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        let present = [
            !self.vkeys.is_empty(),
            !self.native_scripts.is_empty(),
            !self.plutus_v1_scripts.is_empty(),
            !self.plutus_data.is_empty(),
            !self.redeemers.is_empty(),
            !self.plutus_v2_scripts.is_empty(),
            !self.plutus_v3_scripts.is_empty(),
        ];
        e.map(len_u64(present.iter().filter(|field| **field).count()))?;

        let encode_scripts =
            |e: &mut Encoder, key: u8, scripts: &[Vec<u8>]| -> Result<(), EncodeError> {
                if scripts.is_empty() {
                    return Ok(());
                }
                e.u8(key)?.array(len_u64(scripts.len()))?;
                for script in scripts {
                    e.bytes(script)?;
                }
                Ok(())
            };

        if !self.vkeys.is_empty() {
            e.u8(0)?;
            encode_array(e, &self.vkeys)?;
        }
        if !self.native_scripts.is_empty() {
            e.u8(1)?;
            encode_array(e, &self.native_scripts)?;
        }
        encode_scripts(e, 3, &self.plutus_v1_scripts)?;
        if !self.plutus_data.is_empty() {
            e.u8(4)?;
            encode_array(e, &self.plutus_data)?;
        }
        if !self.redeemers.is_empty() {
            e.u8(5)?;
            encode_array(e, &self.redeemers)?;
        }
        encode_scripts(e, 6, &self.plutus_v2_scripts)?;
        encode_scripts(e, 7, &self.plutus_v3_scripts)?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub body: TransactionBody,
    pub witness_set: WitnessSet,
    pub is_valid: bool,
}

impl Transaction {
    #[must_use]
    pub fn id(&self) -> TxHash {
        blake2b_256(&self.body.to_cbor())
    }
}

impl CborEncode for Transaction {
    fn encode_cbor(&self, e: &mut Encoder) -> Result<(), EncodeError> {
        e.array(4)?;
        self.body.encode_cbor(e)?;
        self.witness_set.encode_cbor(e)?;
        e.bool(self.is_valid)?.null()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Hash, NETWORK_TESTNET};
    use crate::value::{AssetId, AssetName};

    fn test_address() -> Address {
        Address::enterprise(NETWORK_TESTNET, Credential::KeyHash(Hash([9; 28])))
    }

    #[test]
    fn coin_only_value_encodes_as_uint() {
        assert_eq!(Value::from_coin(1_000_000).to_cbor(), vec![0x1a, 0x00, 0x0f, 0x42, 0x40]);
    }

    #[test]
    fn multiasset_value_groups_by_policy() {
        let value = Value::from_parts(
            2,
            [
                (AssetId::new(Hash([1; 28]), AssetName::new(vec![0xaa]).expect("name")), 5),
                (AssetId::new(Hash([1; 28]), AssetName::new(vec![0xbb]).expect("name")), 6),
            ],
        );
        let encoded = value.to_cbor();
        assert_eq!(encoded[..3], [0x82, 0x02, 0xa1]);
        // one policy with a two-entry inner map
        assert_eq!(encoded[3 + 30], 0xa2);
    }

    #[test]
    fn body_map_counts_only_present_fields() {
        let body = TransactionBody {
            inputs: BTreeSet::from([TransactionInput::new(Hash([0; 32]), 0)]),
            outputs: vec![TransactionOutput::new(test_address(), Value::from_coin(1))],
            fee: 0,
            ..TransactionBody::default()
        };
        assert_eq!(body.to_cbor()[0], 0xa3);

        let with_ttl = TransactionBody {
            ttl: Some(100),
            ..body
        };
        assert_eq!(with_ttl.to_cbor()[0], 0xa4);
    }

    #[test]
    fn empty_witness_set_is_empty_map() {
        assert_eq!(WitnessSet::default().to_cbor(), vec![0xa0]);
    }

    #[test]
    fn transaction_ids_change_with_body() {
        let body = TransactionBody {
            inputs: BTreeSet::from([TransactionInput::new(Hash([0; 32]), 0)]),
            fee: 10,
            ..TransactionBody::default()
        };
        let tx = Transaction {
            body: body.clone(),
            witness_set: WitnessSet::default(),
            is_valid: true,
        };
        let other = Transaction {
            body: TransactionBody { fee: 11, ..body },
            witness_set: WitnessSet::default(),
            is_valid: true,
        };
        assert_ne!(tx.id(), other.id());
        assert_eq!(*tx.to_cbor().last().expect("non-empty"), 0xf6);
    }
}
