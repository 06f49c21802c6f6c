use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TxBuilderError;
use crate::ledger::{ExUnits, Language};

pub type CostModels = BTreeMap<Language, Vec<i64>>;

/// Exact non-negative rational, as the ledger stores prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInterval {
    pub numerator: u64,
    pub denominator: u64,
}

impl UnitInterval {
    #[must_use]
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExUnitPrices {
    pub memory: UnitInterval,
    pub steps: UnitInterval,
}

/// Tiered pricing for reference scripts: every `range` bytes the per-byte price is
/// multiplied by `multiplier`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinFeeReferenceScripts {
    pub base: f64,
    pub range: u64,
    pub multiplier: f64,
}

impl Default for MinFeeReferenceScripts {
    fn default() -> Self {
        Self {
            base: 15.0,
            range: 25_600,
            multiplier: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    pub min_fee_constant: u64,
    pub min_fee_coefficient: u64,
    pub coins_per_utxo_byte: u64,
    pub max_value_size: u64,
    pub max_tx_size: u64,
    /// Integer percent of the fee that collateral must cover, e.g. `150`.
    pub collateral_percentage: u64,
    pub max_collateral_inputs: u32,
    pub stake_key_deposit: u64,
    pub prices: ExUnitPrices,
    pub max_execution_units_per_transaction: ExUnits,
    #[serde(default)]
    pub cost_models: CostModels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fee_reference_scripts: Option<MinFeeReferenceScripts>,
}

impl Default for ProtocolParameters {
    fn default() -> Self {
        Self {
            min_fee_constant: 155_381,
            min_fee_coefficient: 44,
            coins_per_utxo_byte: 4_310,
            max_value_size: 5_000,
            max_tx_size: 16_384,
            collateral_percentage: 150,
            max_collateral_inputs: 3,
            stake_key_deposit: 2_000_000,
            prices: ExUnitPrices {
                memory: UnitInterval::new(577, 10_000),
                steps: UnitInterval::new(721, 10_000_000),
            },
            max_execution_units_per_transaction: ExUnits::new(14_000_000, 10_000_000_000),
            cost_models: CostModels::new(),
            min_fee_reference_scripts: Some(MinFeeReferenceScripts::default()),
        }
    }
}

impl ProtocolParameters {
    pub fn from_json_str(raw: &str) -> Result<Self, TxBuilderError> {
        let params: Self = serde_json::from_str(raw)?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TxBuilderError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), TxBuilderError> {
        if self.prices.memory.denominator == 0 || self.prices.steps.denominator == 0 {
            return Err(TxBuilderError::InvalidProtocolParameters(
                "execution unit price denominators must be > 0".to_string(),
            ));
        }

        if self.max_value_size == 0 {
            return Err(TxBuilderError::InvalidProtocolParameters(
                "max_value_size must be > 0".to_string(),
            ));
        }

        if let Some(tiers) = &self.min_fee_reference_scripts {
            if tiers.range == 0 {
                return Err(TxBuilderError::InvalidProtocolParameters(
                    "min_fee_reference_scripts.range must be > 0".to_string(),
                ));
            }
            if !tiers.base.is_finite()
                || tiers.base < 0.0
                || !tiers.multiplier.is_finite()
                || tiers.multiplier < 1.0
            {
                return Err(TxBuilderError::InvalidProtocolParameters(format!(
                    "min_fee_reference_scripts must have base >= 0 and multiplier >= 1; got base {} multiplier {}",
                    tiers.base, tiers.multiplier
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS_JSON: &str = r#"{
        "min_fee_constant": 155381,
        "min_fee_coefficient": 44,
        "coins_per_utxo_byte": 4310,
        "max_value_size": 5000,
        "max_tx_size": 16384,
        "collateral_percentage": 150,
        "max_collateral_inputs": 3,
        "stake_key_deposit": 2000000,
        "prices": {
            "memory": { "numerator": 577, "denominator": 10000 },
            "steps": { "numerator": 721, "denominator": 10000000 }
        },
        "max_execution_units_per_transaction": { "mem": 14000000, "steps": 10000000000 },
        "cost_models": { "plutus_v2": [1, 2, -3] }
    }"#;

    #[test]
    fn parses_parameters_json() {
        let params = ProtocolParameters::from_json_str(PARAMS_JSON).expect("valid params");
        assert_eq!(params.collateral_percentage, 150);
        assert_eq!(
            params.cost_models.get(&Language::PlutusV2),
            Some(&vec![1, 2, -3])
        );
        assert!(params.min_fee_reference_scripts.is_none());
    }

    #[test]
    fn rejects_zero_price_denominator() {
        let mut params = ProtocolParameters::default();
        params.prices.steps.denominator = 0;

        let err = params.validate().expect_err("zero denominator must fail");
        match err {
            TxBuilderError::InvalidProtocolParameters(message) => {
                assert!(message.contains("denominators"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_zero_reference_script_range() {
        let mut params = ProtocolParameters::default();
        params.min_fee_reference_scripts = Some(MinFeeReferenceScripts {
            range: 0,
            ..MinFeeReferenceScripts::default()
        });
        assert!(params.validate().is_err());
    }
}
