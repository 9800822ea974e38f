//! Standalone dialogue relay server binary.
//!
//! Serves `POST /api/chat` for the assistant runtime. Configuration comes
//! from `onerobo.toml` in the working directory (defaults apply when the
//! file is absent) and the upstream API key from the configured environment
//! variable.

use onerobo::relay::RelayServer;
use onerobo::AssistantConfig;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AssistantConfig::load(Path::new("onerobo.toml"))?;

    let handle = RelayServer::new(config.relay_server).serve().await?;
    tracing::info!("relay running on {}", handle.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("relay shutting down");
    handle.shutdown();
    Ok(())
}
