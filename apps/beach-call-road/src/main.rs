use std::sync::Arc;

use anyhow::{Context, Result};
use beach_call_road::{config::Config, router};
use call_signaling::Relay;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beach-call-road", about = "Rendezvous relay for beach-call clients")]
struct Cli {
    /// Port to listen on (overrides BEACH_CALL_ROAD_PORT)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    // Default to WARN level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let app = router(Arc::new(Relay::new()));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(target = "relay", %addr, "beach-call-road listening");

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
