#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use anyhow::Result;

use clap::Parser;

use cli::commands::Command;
use cli::modules::settings::Settings;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Command-line entrypoint for the transaction builder.
#[derive(Parser, Debug)]
#[command(
    name = "tx-builder",
    version,
    about = "Balance and serialize UTxO transactions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Protocol parameters JSON file, `-` for standard input
    #[arg(long = "params", env = "TX_BUILDER_PARAMS", global = true)]
    params: Option<PathBuf>,
    /// Upper bound on a single script evaluation, in milliseconds
    #[arg(long = "evaluation-timeout-ms", env = "TX_BUILDER_EVALUATION_TIMEOUT_MS", global = true)]
    evaluation_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    logging_init();

    let parsed = Cli::parse();
    let settings = Settings::new(parsed.params, parsed.evaluation_timeout_ms);

    parsed.command.handle(&settings).await
}

fn logging_init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
