//! Multi-asset value algebra.
//!
//! A [`Value`] is a base-unit (lovelace) amount plus a map of native-asset
//! quantities. Quantities are signed so the same type carries both balances and
//! deficits; a balance equation is just `inputs - outputs`, and its
//! [`Value::negatives`] are what coin selection still has to find.
//!
//! Zero entries are never stored. Every constructor and operation prunes them, so
//! [`Value::asset_type_count`] and equality are structural.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ledger::{HashParseError, PolicyId};

/// Maximum length of an asset name in bytes.
pub const MAX_ASSET_NAME_LEN: usize = 32;

#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetName(Vec<u8>);

impl AssetName {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, AssetIdParseError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_ASSET_NAME_LEN {
            return Err(AssetIdParseError::NameTooLong(bytes.len()));
        }
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetName({})", hex::encode(&self.0))
    }
}

/// A native asset, identified by minting policy and asset name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId {
    pub policy: PolicyId,
    pub name: AssetName,
}

impl AssetId {
    #[must_use]
    pub const fn new(policy: PolicyId, name: AssetName) -> Self {
        Self { policy, name }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssetIdParseError {
    #[error("asset unit must be at least 56 hex characters, got {0}")]
    TooShort(usize),

    #[error("asset name is {0} bytes, the limit is 32")]
    NameTooLong(usize),

    #[error("invalid policy id: {0}")]
    Policy(#[from] HashParseError),

    #[error("invalid asset name hex: {0}")]
    Name(#[from] hex::FromHexError),
}

/// Renders as `policy_hex || name_hex`.
impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.policy, hex::encode(self.name.as_bytes()))
    }
}

impl FromStr for AssetId {
    type Err = AssetIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 56 || !s.is_char_boundary(56) {
            return Err(AssetIdParseError::TooShort(s.len()));
        }
        let (policy, name) = s.split_at(56);
        Ok(Self {
            policy: policy.parse()?,
            name: AssetName::new(hex::decode(name)?)?,
        })
    }
}

impl Serialize for AssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry in a value's asset enumeration: the base unit or a native asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetClass {
    Lovelace,
    Native(AssetId),
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lovelace => f.write_str("lovelace"),
            Self::Native(asset) => write!(f, "{asset}"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValueRepr")]
pub struct Value {
    coin: i128,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    assets: BTreeMap<AssetId, i128>,
}

#[derive(Deserialize)]
struct ValueRepr {
    #[serde(default)]
    coin: i128,
    #[serde(default)]
    assets: BTreeMap<AssetId, i128>,
}

impl From<ValueRepr> for Value {
    fn from(repr: ValueRepr) -> Self {
        Self::from_parts(repr.coin, repr.assets)
    }
}

impl Value {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            coin: 0,
            assets: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn from_coin(coin: i128) -> Self {
        Self {
            coin,
            assets: BTreeMap::new(),
        }
    }

    /// Build a value, dropping zero quantities and summing repeated asset ids.
    pub fn from_parts(coin: i128, assets: impl IntoIterator<Item = (AssetId, i128)>) -> Self {
        let mut value = Self::from_coin(coin);
        for (asset, quantity) in assets {
            value.add_asset(asset, quantity);
        }
        value
    }

    #[must_use]
    pub fn with_asset(mut self, asset: AssetId, quantity: i128) -> Self {
        self.add_asset(asset, quantity);
        self
    }

    fn add_asset(&mut self, asset: AssetId, quantity: i128) {
        match self.assets.entry(asset) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() += quantity;
                if *entry.get() == 0 {
                    entry.remove();
                }
            }
            Entry::Vacant(entry) => {
                if quantity != 0 {
                    entry.insert(quantity);
                }
            }
        }
    }

    #[must_use]
    pub const fn coin(&self) -> i128 {
        self.coin
    }

    #[must_use]
    pub const fn assets(&self) -> &BTreeMap<AssetId, i128> {
        &self.assets
    }

    #[must_use]
    pub fn quantity_of(&self, class: &AssetClass) -> i128 {
        match class {
            AssetClass::Lovelace => self.coin,
            AssetClass::Native(asset) => self.assets.get(asset).copied().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn has_assets(&self) -> bool {
        !self.assets.is_empty()
    }

    /// Component-wise sum.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.coin += other.coin;
        for (asset, quantity) in &other.assets {
            merged.add_asset(asset.clone(), *quantity);
        }
        merged
    }

    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            coin: -self.coin,
            assets: self
                .assets
                .iter()
                .map(|(asset, quantity)| (asset.clone(), -quantity))
                .collect(),
        }
    }

    #[must_use]
    pub fn sub(&self, other: &Self) -> Self {
        self.merge(&other.negate())
    }

    /// Keep only strictly positive components.
    #[must_use]
    pub fn positives(&self) -> Self {
        Self {
            coin: self.coin.max(0),
            assets: self
                .assets
                .iter()
                .filter(|(_, quantity)| **quantity > 0)
                .map(|(asset, quantity)| (asset.clone(), *quantity))
                .collect(),
        }
    }

    /// Keep only strictly negative components (still negative).
    #[must_use]
    pub fn negatives(&self) -> Self {
        Self {
            coin: self.coin.min(0),
            assets: self
                .assets
                .iter()
                .filter(|(_, quantity)| **quantity < 0)
                .map(|(asset, quantity)| (asset.clone(), *quantity))
                .collect(),
        }
    }

    /// Number of components, base unit included, that are non-zero in both values.
    #[must_use]
    pub fn intersect_count(&self, other: &Self) -> usize {
        let coin = usize::from(self.coin != 0 && other.coin != 0);
        coin + self
            .assets
            .keys()
            .filter(|asset| other.assets.contains_key(*asset))
            .count()
    }

    /// Number of non-zero components, base unit included.
    #[must_use]
    pub fn asset_type_count(&self) -> usize {
        usize::from(self.coin != 0) + self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coin == 0 && self.assets.is_empty()
    }

    #[must_use]
    pub fn is_non_negative(&self) -> bool {
        self.coin >= 0 && self.assets.values().all(|quantity| *quantity >= 0)
    }

    /// Non-zero components in enumeration order: the base unit first, then
    /// native assets by `(policy, name)`.
    #[must_use]
    pub fn asset_classes(&self) -> Vec<AssetClass> {
        let mut classes = Vec::with_capacity(self.asset_type_count());
        if self.coin != 0 {
            classes.push(AssetClass::Lovelace);
        }
        classes.extend(self.assets.keys().cloned().map(AssetClass::Native));
        classes
    }

    /// Group the native assets by policy, the shape the ledger serializes.
    #[must_use]
    pub fn assets_by_policy(&self) -> BTreeMap<PolicyId, BTreeMap<&AssetName, i128>> {
        let mut grouped: BTreeMap<PolicyId, BTreeMap<&AssetName, i128>> = BTreeMap::new();
        for (asset, quantity) in &self.assets {
            grouped
                .entry(asset.policy)
                .or_default()
                .insert(&asset.name, *quantity);
        }
        grouped
    }
}

impl Add<&Value> for &Value {
    type Output = Value;

    fn add(self, rhs: &Value) -> Value {
        self.merge(rhs)
    }
}

impl Add for Value {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.merge(&rhs)
    }
}

impl Sub<&Value> for &Value {
    type Output = Value;

    fn sub(self, rhs: &Value) -> Value {
        Value::sub(self, rhs)
    }
}

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        self.negate()
    }
}

impl Neg for Value {
    type Output = Self;

    fn neg(self) -> Self {
        self.negate()
    }
}

impl<'a> std::iter::Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, value| acc.merge(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lovelace", self.coin)?;
        for (asset, quantity) in &self.assets {
            write!(f, " + {quantity} {asset}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Hash;

    use proptest::prelude::*;

    fn test_asset(tag: u8) -> AssetId {
        AssetId::new(
            Hash::new([tag; 28]),
            AssetName::new(vec![tag]).expect("short name"),
        )
    }

    #[test]
    fn zero_entries_are_pruned() {
        let value = Value::from_parts(5, [(test_asset(1), 3), (test_asset(1), -3)]);
        assert_eq!(value.asset_type_count(), 1);
        assert!(!value.has_assets());

        let cancelled = value.sub(&Value::from_coin(5));
        assert!(cancelled.is_empty());
        assert_eq!(cancelled, Value::zero());
    }

    #[test]
    fn positives_and_negatives_split_components() {
        let value = Value::from_parts(-4, [(test_asset(1), 7), (test_asset(2), -2)]);

        assert_eq!(value.positives(), Value::from_parts(0, [(test_asset(1), 7)]));
        assert_eq!(
            value.negatives(),
            Value::from_parts(-4, [(test_asset(2), -2)])
        );
    }

    #[test]
    fn intersect_count_includes_base_unit() {
        let a = Value::from_parts(10, [(test_asset(1), 1), (test_asset(2), 1)]);
        let b = Value::from_parts(3, [(test_asset(2), 9), (test_asset(3), 1)]);
        assert_eq!(a.intersect_count(&b), 2);
        assert_eq!(a.intersect_count(&Value::from_parts(0, [(test_asset(3), 1)])), 0);
    }

    #[test]
    fn asset_classes_enumerate_base_unit_first() {
        let value = Value::from_parts(1, [(test_asset(2), 1), (test_asset(1), 1)]);
        assert_eq!(
            value.asset_classes(),
            vec![
                AssetClass::Lovelace,
                AssetClass::Native(test_asset(1)),
                AssetClass::Native(test_asset(2)),
            ]
        );
    }

    #[test]
    fn value_json_round_trip_prunes_zero_assets() {
        let json = format!(
            r#"{{"coin": 2000000, "assets": {{"{}": 10, "{}": 0}}}}"#,
            test_asset(1),
            test_asset(2)
        );
        let value: Value = serde_json::from_str(&json).expect("valid value json");
        assert_eq!(value, Value::from_parts(2_000_000, [(test_asset(1), 10)]));

        let encoded = serde_json::to_string(&value).expect("serialize");
        let decoded: Value = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, value);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        (
            -1_000_000_000i128..1_000_000_000,
            proptest::collection::vec((0u8..4, -1_000i128..1_000), 0..6),
        )
            .prop_map(|(coin, assets)| {
                Value::from_parts(
                    coin,
                    assets.into_iter().map(|(tag, qty)| (test_asset(tag), qty)),
                )
            })
    }

    proptest! {
        #[test]
        fn merge_is_commutative(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a.merge(&b), b.merge(&a));
        }

        #[test]
        fn merge_is_associative(a in arb_value(), b in arb_value(), c in arb_value()) {
            prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
        }

        #[test]
        fn merge_with_negation_is_empty(a in arb_value()) {
            prop_assert!(a.merge(&a.negate()).is_empty());
        }

        #[test]
        fn positives_plus_negatives_is_identity(a in arb_value()) {
            prop_assert_eq!(a.positives().merge(&a.negatives()), a);
        }

        #[test]
        fn sub_is_merge_of_negation(a in arb_value(), b in arb_value()) {
            prop_assert_eq!(a.sub(&b), a.merge(&b.negate()));
        }
    }
}
