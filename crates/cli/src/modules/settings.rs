use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};
use tx_builder::ProtocolParameters;

use crate::modules::utils::read_source;

/// Runtime settings shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Protocol parameters JSON. Built-in mainnet-like defaults when unset.
    pub params_path: Option<PathBuf>,
    pub evaluation_timeout: Option<Duration>,
}

impl Settings {
    #[must_use]
    pub fn new(params_path: Option<PathBuf>, evaluation_timeout_ms: Option<u64>) -> Self {
        Self {
            params_path,
            evaluation_timeout: evaluation_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn protocol_parameters(&self) -> Result<ProtocolParameters> {
        let Some(path) = &self.params_path else {
            debug!("using built-in protocol parameters");
            return Ok(ProtocolParameters::default());
        };

        let raw = read_source(path)?;
        let params = ProtocolParameters::from_json_str(&raw)
            .with_context(|| format!("invalid protocol parameters in '{}'", path.display()))?;
        info!(path = %path.display(), "loaded protocol parameters");
        Ok(params)
    }
}
