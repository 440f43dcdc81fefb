//! Binary entrypoint for the KDX API server.
use kdx_api::{run, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Listen address can be overridden with KDX_ADDR
    run(ServerConfig::from_env()).await
}
