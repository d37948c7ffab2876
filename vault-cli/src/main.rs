//! Intelligence Vault CLI entry point.

use clap::Parser;
use vault_cli::{Cli, LogFormat};
use vault_telemetry::{DEFAULT_FILTER, init_json_telemetry, init_telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.log_format {
        LogFormat::Pretty => init_telemetry(DEFAULT_FILTER)?,
        LogFormat::Json => init_json_telemetry(DEFAULT_FILTER)?,
    }

    let output = vault_cli::run(&cli).await.inspect_err(|e| {
        tracing::error!(error = %e, "command failed");
    })?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
