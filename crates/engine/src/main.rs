// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tracing::error;

use nxapi_engine::proof::{select_backend, HashMethod, ProofRequest};
use nxapi_engine::transport::ReqwestTransport;
use nxapi_engine::EngineConfig;

/// Generate one proof through the configured proof backend.
#[derive(Debug, Parser)]
#[command(name = "nxapi-f", version)]
struct Cli {
    #[command(flatten)]
    config: EngineConfig,

    /// Token the proof is bound to (id token for login, bearer token for web services).
    #[arg(long, env = "NXAPI_F_TOKEN", hide_env_values = true)]
    token: String,

    /// 1 for account login, 2 for web service tokens.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
    hash_method: u8,

    #[arg(long)]
    na_id: Option<String>,

    #[arg(long)]
    coral_user_id: Option<String>,

    /// Account whose proof backend session is saved in the credentials file.
    #[arg(long, env = "NXAPI_ACCOUNT")]
    account: Option<String>,
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let transport = Arc::new(ReqwestTransport::new(concat!("nxapi-f/", env!("CARGO_PKG_VERSION"))));
    let ctx = cli.config.backend_context(transport, cli.account.clone());
    let preference = cli.config.backend_preference()?;
    let provider =
        select_backend(preference.as_ref(), &cli.config.default_selector()?, &ctx).await?;

    let hash_method = HashMethod::try_from(cli.hash_method).map_err(anyhow::Error::msg)?;
    let mut request = ProofRequest::new(cli.token, hash_method);
    request.na_id = cli.na_id;
    request.coral_user_id = cli.coral_user_id;

    let proof = provider.generate_proof(request).await?;
    println!("{}", serde_json::to_string_pretty(&proof)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
