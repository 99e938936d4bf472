use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use beach_call::config::{Config, normalize_localhost};
use beach_call::connection::rtc::RtcSessionFactory;
use beach_call::media::{LoggingSink, SampleTrackCapture};
use beach_call::{CallOrchestrator, Collaborators, UserDirectory, console};
use call_signaling::{PeerId, WsSignaling};
use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "beach-call", about = "Peer-to-peer video calls through a beach-call-road relay")]
struct Cli {
    /// Rendezvous server, e.g. ws://127.0.0.1:881 or just host:port
    #[arg(long)]
    signaling_url: Option<String>,

    /// STUN/TURN url; repeat to add more
    #[arg(long = "ice-server")]
    ice_servers: Vec<String>,

    /// Skip STUN/TURN and gather host candidates only
    #[arg(long)]
    localhost_only: bool,

    /// Call this user as soon as it comes online
    #[arg(long)]
    call: Option<String>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if let Some(url) = self.signaling_url {
            config.signaling_url = normalize_localhost(&url);
        }
        if !self.ice_servers.is_empty() {
            config.ice_servers = self.ice_servers;
        }
        if self.localhost_only {
            config.ice_servers.clear();
        }
        if let Some(peer) = self.call {
            config.call_on_join = Some(PeerId::new(peer));
        }
        config
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;
    let config = Cli::parse().apply(Config::from_env());
    info!(
        target = "call",
        signaling_url = %config.signaling_url,
        ice_servers = ?config.ice_servers,
        "starting beach-call"
    );

    let (signaling, inbound) = WsSignaling::connect(&config.signaling_url)
        .await
        .context("connecting to signaling server")?
        .into_parts();
    let sessions =
        RtcSessionFactory::new(&config.ice_servers).context("building webrtc api")?;
    let directory = UserDirectory::new();

    let mut orchestrator = CallOrchestrator::new(Collaborators {
        signaling,
        capture: Arc::new(SampleTrackCapture::new()),
        sessions: Arc::new(sessions),
        directory: directory.clone(),
        local_sink: Arc::new(LoggingSink::new("local")),
        remote_sink: Arc::new(LoggingSink::new("remote")),
    });
    if let Some(peer) = config.call_on_join.clone() {
        orchestrator = orchestrator.with_auto_call(peer);
    }
    orchestrator.start().await.context("starting local media")?;

    let calls = tokio::spawn(orchestrator.run(inbound));
    let console = tokio::spawn(console::run(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        directory,
    ));

    tokio::select! {
        result = calls => {
            result.context("call task panicked")?.context("call loop failed")?;
        }
        result = console => {
            result.context("console task panicked")?.context("console failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target = "call", "interrupted");
        }
    }
    Ok(())
}
