//! Witness bookkeeping: what must be proven, which scripts are in scope, and the
//! redeemers waiting for their final indices.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TxBuilderError;
use crate::ledger::{
    ExUnits, KeyHash, PlutusData, PolicyId, Redeemer, RedeemerTag, RewardAccount, Script,
    ScriptHash, TransactionBody, TransactionInput,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequiredWitness {
    VKey(KeyHash),
    NativeScript(ScriptHash),
    PlutusScript(ScriptHash),
}

#[derive(Clone, Debug, Default)]
pub struct RequiredWitnesses(BTreeSet<RequiredWitness>);

impl RequiredWitnesses {
    pub fn insert(&mut self, witness: RequiredWitness) {
        self.0.insert(witness);
    }

    pub fn vkeys(&self) -> impl Iterator<Item = &KeyHash> {
        self.0.iter().filter_map(|witness| match witness {
            RequiredWitness::VKey(hash) => Some(hash),
            _ => None,
        })
    }

    pub fn native_scripts(&self) -> impl Iterator<Item = &ScriptHash> {
        self.0.iter().filter_map(|witness| match witness {
            RequiredWitness::NativeScript(hash) => Some(hash),
            _ => None,
        })
    }

    pub fn plutus_scripts(&self) -> impl Iterator<Item = &ScriptHash> {
        self.0.iter().filter_map(|witness| match witness {
            RequiredWitness::PlutusScript(hash) => Some(hash),
            _ => None,
        })
    }
}

/// Scripts the transaction can draw on, attached or reachable by reference.
#[derive(Clone, Debug, Default)]
pub struct ScriptScope {
    scripts: BTreeMap<ScriptHash, Script>,
    by_reference: BTreeSet<ScriptHash>,
}

impl ScriptScope {
    /// Make a script available as a witness-set attachment.
    pub fn attach(&mut self, script: Script) -> ScriptHash {
        let hash = script.hash();
        self.scripts.entry(hash).or_insert(script);
        hash
    }

    /// Make a script available through a reference or spent input.
    pub fn reference(&mut self, script: Script) -> ScriptHash {
        let hash = self.attach(script);
        self.by_reference.insert(hash);
        hash
    }

    pub fn get(&self, hash: &ScriptHash) -> Option<&Script> {
        self.scripts.get(hash)
    }

    pub fn is_referenced(&self, hash: &ScriptHash) -> bool {
        self.by_reference.contains(hash)
    }
}

/// What a redeemer unlocks. The ledger index is derived from the body at
/// assembly time.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RedeemerPurpose {
    Spend(TransactionInput),
    Mint(PolicyId),
    Cert(usize),
    Reward(RewardAccount),
}

#[derive(Clone, Debug)]
struct RedeemerEntry {
    data: PlutusData,
    ex_units: ExUnits,
}

#[derive(Clone, Debug, Default)]
pub struct RedeemerSet(BTreeMap<RedeemerPurpose, RedeemerEntry>);

fn position_u32(position: Option<usize>) -> Option<u32> {
    position.and_then(|index| u32::try_from(index).ok())
}

impl RedeemerSet {
    /// Register a redeemer; returns `false` if the purpose already has one.
    pub fn insert(&mut self, purpose: RedeemerPurpose, data: PlutusData, ex_units: ExUnits) -> bool {
        if self.0.contains_key(&purpose) {
            return false;
        }
        self.0.insert(purpose, RedeemerEntry { data, ex_units });
        true
    }

    pub fn contains(&self, purpose: &RedeemerPurpose) -> bool {
        self.0.contains_key(purpose)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn pointer(purpose: &RedeemerPurpose, body: &TransactionBody) -> Option<(RedeemerTag, u32)> {
        match purpose {
            RedeemerPurpose::Spend(input) => {
                position_u32(body.inputs.iter().position(|candidate| candidate == input))
                    .map(|index| (RedeemerTag::Spend, index))
            }
            RedeemerPurpose::Mint(policy) => position_u32(
                body.mint
                    .assets_by_policy()
                    .keys()
                    .position(|candidate| candidate == policy),
            )
            .map(|index| (RedeemerTag::Mint, index)),
            RedeemerPurpose::Cert(position) => {
                (*position < body.certificates.len())
                    .then(|| position_u32(Some(*position)))
                    .flatten()
                    .map(|index| (RedeemerTag::Cert, index))
            }
            RedeemerPurpose::Reward(account) => position_u32(
                body.withdrawals
                    .keys()
                    .position(|candidate| candidate == account),
            )
            .map(|index| (RedeemerTag::Reward, index)),
        }
    }

    /// Redeemers with indices resolved against `body`, ordered by `(tag, index)`.
    ///
    /// A purpose that no longer exists in the body (a mint that netted to zero)
    /// is left out.
    pub fn resolve(&self, body: &TransactionBody) -> Vec<Redeemer> {
        let mut resolved: Vec<Redeemer> = self
            .0
            .iter()
            .filter_map(|(purpose, entry)| {
                Self::pointer(purpose, body).map(|(tag, index)| Redeemer {
                    tag,
                    index,
                    data: entry.data.clone(),
                    ex_units: entry.ex_units,
                })
            })
            .collect();
        resolved.sort_by_key(|redeemer| (redeemer.tag, redeemer.index));
        resolved
    }

    /// Write evaluated execution units back, matching on `(tag, index)` in `body`.
    pub fn apply_ex_units(
        &mut self,
        body: &TransactionBody,
        evaluated: &[Redeemer],
    ) -> Result<(), TxBuilderError> {
        let pointers: BTreeMap<(RedeemerTag, u32), RedeemerPurpose> = self
            .0
            .keys()
            .filter_map(|purpose| Self::pointer(purpose, body).map(|ptr| (ptr, purpose.clone())))
            .collect();

        for redeemer in evaluated {
            let purpose = pointers.get(&(redeemer.tag, redeemer.index)).ok_or(
                TxBuilderError::UnknownRedeemer {
                    tag: redeemer.tag,
                    index: redeemer.index,
                },
            )?;
            if let Some(entry) = self.0.get_mut(purpose) {
                entry.ex_units = redeemer.ex_units;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Credential, Hash, NETWORK_TESTNET};
    use crate::value::{AssetId, AssetName, Value};

    use std::collections::BTreeSet;

    fn input(tag: u8) -> TransactionInput {
        TransactionInput::new(Hash::new([tag; 32]), 0)
    }

    #[test]
    fn spend_indices_follow_the_sorted_input_set() {
        let mut redeemers = RedeemerSet::default();
        assert!(redeemers.insert(
            RedeemerPurpose::Spend(input(5)),
            PlutusData::Integer(5),
            ExUnits::default()
        ));

        let mut body = TransactionBody {
            inputs: BTreeSet::from([input(5)]),
            ..TransactionBody::default()
        };
        assert_eq!(redeemers.resolve(&body)[0].index, 0);

        // A smaller reference added later shifts the redeemer.
        body.inputs.insert(input(1));
        assert_eq!(redeemers.resolve(&body)[0].index, 1);
    }

    #[test]
    fn duplicate_purpose_is_rejected() {
        let mut redeemers = RedeemerSet::default();
        let purpose = RedeemerPurpose::Cert(0);
        assert!(redeemers.insert(purpose.clone(), PlutusData::unit(), ExUnits::default()));
        assert!(!redeemers.insert(purpose, PlutusData::unit(), ExUnits::default()));
    }

    #[test]
    fn resolve_orders_by_tag_then_index() {
        let policy = Hash::new([3; 28]);
        let account = RewardAccount::new(NETWORK_TESTNET, Credential::ScriptHash(Hash::new([4; 28])));
        let mut redeemers = RedeemerSet::default();
        redeemers.insert(RedeemerPurpose::Reward(account), PlutusData::unit(), ExUnits::default());
        redeemers.insert(RedeemerPurpose::Mint(policy), PlutusData::unit(), ExUnits::default());
        redeemers.insert(RedeemerPurpose::Spend(input(2)), PlutusData::unit(), ExUnits::default());

        let body = TransactionBody {
            inputs: BTreeSet::from([input(2)]),
            mint: Value::zero().with_asset(
                AssetId::new(policy, AssetName::new(vec![1]).expect("name")),
                1,
            ),
            withdrawals: BTreeMap::from([(account, 10)]),
            ..TransactionBody::default()
        };

        let tags: Vec<RedeemerTag> = redeemers.resolve(&body).iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![RedeemerTag::Spend, RedeemerTag::Mint, RedeemerTag::Reward]);
    }

    #[test]
    fn evaluated_units_are_written_back() {
        let mut redeemers = RedeemerSet::default();
        redeemers.insert(
            RedeemerPurpose::Spend(input(1)),
            PlutusData::unit(),
            ExUnits::new(u64::MAX, u64::MAX),
        );
        let body = TransactionBody {
            inputs: BTreeSet::from([input(1)]),
            ..TransactionBody::default()
        };

        let mut evaluated = redeemers.resolve(&body);
        evaluated[0].ex_units = ExUnits::new(100, 200);
        redeemers
            .apply_ex_units(&body, &evaluated)
            .expect("pointer is known");
        assert_eq!(redeemers.resolve(&body)[0].ex_units, ExUnits::new(100, 200));

        evaluated[0].index = 7;
        let err = redeemers
            .apply_ex_units(&body, &evaluated)
            .expect_err("unknown pointer");
        match err {
            TxBuilderError::UnknownRedeemer { tag, index } => {
                assert_eq!(tag, RedeemerTag::Spend);
                assert_eq!(index, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn referenced_scripts_are_tracked() {
        let mut scope = ScriptScope::default();
        let attached = scope.attach(Script::PlutusV2(vec![1]));
        let referenced = scope.reference(Script::PlutusV3(vec![2]));
        assert!(!scope.is_referenced(&attached));
        assert!(scope.is_referenced(&referenced));
        assert!(scope.get(&referenced).is_some());
    }
}
