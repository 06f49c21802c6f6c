use std::path::PathBuf;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use serde_json::json;
use tracing::{error, info};
use tx_builder::{
    CborEncode, CoinSelector, HighestValueFirst, ProtocolParameters, TxBuilder, TxBuilderError,
    WideDeepSelector,
};

use crate::modules::request::BuildRequest;
use crate::modules::settings::Settings;
use crate::modules::utils::read_source;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Selector {
    /// Multi-asset wide-then-deep selection
    #[default]
    WideDeep,
    /// Largest base-unit amounts first, key-locked outputs only
    HighestValueFirst,
}

impl Selector {
    fn build(self, params: &ProtocolParameters) -> Box<dyn CoinSelector> {
        match self {
            Self::WideDeep => Box::new(WideDeepSelector),
            Self::HighestValueFirst => Box::new(HighestValueFirst::from_params(params)),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Balance the request and print the unsigned transaction
    Complete {
        /// Build request JSON file, `-` for standard input
        #[arg(long = "request")]
        request: PathBuf,
        /// Coin selection strategy
        #[arg(long = "selector", value_enum, default_value_t = Selector::WideDeep)]
        selector: Selector,
    },
    /// Print the request as a transaction without balancing it
    Draft {
        /// Build request JSON file, `-` for standard input
        #[arg(long = "request")]
        request: PathBuf,
    },
}

impl Command {
    pub async fn handle(self, settings: &Settings) -> Result<()> {
        let params = settings.protocol_parameters()?;

        match self {
            Self::Complete { request, selector } => {
                let request = BuildRequest::from_json_str(&read_source(&request)?)?;
                let mut builder = TxBuilder::new(params.clone());
                request.apply(&mut builder)?;
                builder.use_coin_selector(selector.build(&params))?;
                if let Some(timeout) = settings.evaluation_timeout {
                    builder.set_evaluation_timeout(timeout)?;
                }

                let tx = match builder.complete().await {
                    Ok(tx) => tx,
                    Err(TxBuilderError::Selection(err)) => {
                        error!(phase = %err.phase, "coin selection failed");
                        eprintln!("{:#}", err.diagnostics_json());
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                };

                let tx_id = tx.id();
                info!(%tx_id, fee = tx.body.fee, "transaction complete");
                println!(
                    "{:#}",
                    json!({
                        "tx_id": tx_id.to_string(),
                        "tx_hex": hex::encode(tx.to_cbor()),
                        "fee": tx.body.fee,
                    })
                );
            }
            Self::Draft { request } => {
                let request = BuildRequest::from_json_str(&read_source(&request)?)?;
                let mut builder = TxBuilder::new(params);
                request.apply(&mut builder)?;
                println!(
                    "{:#}",
                    json!({ "tx_hex": hex::encode(builder.to_draft_cbor()?) })
                );
            }
        }

        Ok(())
    }
}
