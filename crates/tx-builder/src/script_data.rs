//! Script integrity hash.
//!
//! The hashed preimage is a plain concatenation without an outer array header:
//!
//! - redeemers present: `redeemers || datums (if any) || language_views`
//! - datums only: `0x80 || datums || 0xa0` (empty redeemers, empty views)
//! - neither: no hash at all
//!
//! Language views follow the ledger's canonical map ordering, which sorts keys
//! by encoded length first. PlutusV1 keeps its historical quirks: the key is the
//! language id wrapped in a byte string, and the cost model is an
//! indefinite-length list wrapped in a byte string.

use std::collections::BTreeSet;

use crate::error::TxBuilderError;
use crate::ledger::cbor::{encode_with, len_u64, write_raw};
use crate::ledger::{
    Language, PlutusData, Redeemer, ScriptDataHash, blake2b_256, encode_datums, encode_redeemers,
};
use crate::params::CostModels;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptData {
    pub redeemers_encoded: Vec<u8>,
    pub datums_encoded: Option<Vec<u8>>,
    pub cost_models_encoded: Vec<u8>,
    pub hashed_data: Vec<u8>,
    pub hash: ScriptDataHash,
}

pub fn compute_script_data(
    redeemers: &[Redeemer],
    datums: &[PlutusData],
    used_languages: &BTreeSet<Language>,
    cost_models: &CostModels,
) -> Result<Option<ScriptData>, TxBuilderError> {
    if redeemers.is_empty() && datums.is_empty() {
        return Ok(None);
    }

    let datums_encoded = (!datums.is_empty()).then(|| encode_datums(datums));

    let (redeemers_encoded, cost_models_encoded) = if redeemers.is_empty() {
        (vec![0x80], vec![0xa0])
    } else {
        (
            encode_redeemers(redeemers),
            encode_language_views(used_languages, cost_models)?,
        )
    };

    let mut hashed_data = redeemers_encoded.clone();
    if let Some(datums) = &datums_encoded {
        hashed_data.extend_from_slice(datums);
    }
    hashed_data.extend_from_slice(&cost_models_encoded);

    Ok(Some(ScriptData {
        hash: blake2b_256(&hashed_data),
        redeemers_encoded,
        datums_encoded,
        cost_models_encoded,
        hashed_data,
    }))
}

fn language_view_entry(language: Language, model: &[i64]) -> (Vec<u8>, Vec<u8>) {
    match language {
        Language::PlutusV1 => {
            let key = encode_with(|e| {
                e.bytes(&[language.id()])?;
                Ok(())
            });
            let inner = encode_with(|e| {
                e.begin_array()?;
                for cost in model {
                    e.i64(*cost)?;
                }
                e.end()?;
                Ok(())
            });
            let value = encode_with(|e| {
                e.bytes(&inner)?;
                Ok(())
            });
            (key, value)
        }
        Language::PlutusV2 | Language::PlutusV3 => {
            let key = encode_with(|e| {
                e.u8(language.id())?;
                Ok(())
            });
            let value = encode_with(|e| {
                e.array(len_u64(model.len()))?;
                for cost in model {
                    e.i64(*cost)?;
                }
                Ok(())
            });
            (key, value)
        }
    }
}

/// Encode the cost models of `used_languages` as the ledger's language-view map.
pub fn encode_language_views(
    used_languages: &BTreeSet<Language>,
    cost_models: &CostModels,
) -> Result<Vec<u8>, TxBuilderError> {
    let mut entries = used_languages
        .iter()
        .map(|language| {
            cost_models
                .get(language)
                .map(|model| language_view_entry(*language, model))
                .ok_or(TxBuilderError::MissingCostModel(*language))
        })
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    Ok(encode_with(|e| {
        e.map(len_u64(entries.len()))?;
        for (key, value) in &entries {
            write_raw(e, key);
            write_raw(e, value);
        }
        Ok(())
    }))
}
