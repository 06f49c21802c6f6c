#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![cfg_attr(
    test,
    allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::default_trait_access,
        clippy::iter_on_single_items,
        clippy::needless_pass_by_value,
        clippy::too_many_lines
    )
)]

pub mod builder;
pub mod coin_selection;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod params;
pub mod script_data;
pub mod value;

pub use builder::TxBuilder;
pub use coin_selection::{CoinSelector, HighestValueFirst, SelectionResult, WideDeepSelector};
pub use error::{SelectionPhase, SelectionStep, TxBuilderError, UtxoSelectionError};
pub use evaluator::{EvaluationError, Evaluator};
pub use ledger::*;
pub use params::{
    CostModels, ExUnitPrices, MinFeeReferenceScripts, ProtocolParameters, UnitInterval,
};
pub use script_data::{ScriptData, compute_script_data};
pub use value::{AssetId, AssetName, Value};
