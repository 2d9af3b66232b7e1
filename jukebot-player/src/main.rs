//! jukebot - queue-driven audio playback controller
//!
//! Loads the bootstrap config, wires the yt-dlp resolver and the local
//! speaker output into one session, and serves the HTTP command surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jukebot_common::config::{find_config_file, resolve_scratch_dir};
use jukebot_common::events::EventBus;
use jukebot_player::api::{self, auth, AppContext};
use jukebot_player::audio::LocalSpeakerGateway;
use jukebot_player::config::TomlConfig;
use jukebot_player::output::LogSink;
use jukebot_player::playback::{Session, SessionDeps};
use jukebot_player::resolver::YtDlpResolver;
use jukebot_player::scratch::ScratchDir;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SCRATCH_ENV: &str = "JUKEBOT_SCRATCH_DIR";

/// Command-line arguments for jukebot
#[derive(Parser, Debug)]
#[command(name = "jukebot")]
#[command(about = "Queue-driven audio playback controller")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "JUKEBOT_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "JUKEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Scratch directory for downloaded audio
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Audio output device name
    #[arg(long)]
    device: Option<String>,

    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match find_config_file(args.config.as_deref())
        .context("Failed to locate config file")?
    {
        Some(path) => TomlConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&config.logging.level);

    if args.list_devices {
        for name in LocalSpeakerGateway::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let port = args.port.unwrap_or(config.port);
    info!("Starting jukebot v{} on port {}", env!("CARGO_PKG_VERSION"), port);

    // Files left behind by a previous run are never reused
    let scratch = ScratchDir::new(resolve_scratch_dir(
        args.scratch_dir.as_deref(),
        SCRATCH_ENV,
        config.scratch_dir.as_deref(),
    ));
    let purged = scratch
        .purge()
        .await
        .with_context(|| format!("Failed to purge {}", scratch.path().display()))?;
    scratch.ensure().await.context("Failed to create scratch directory")?;
    info!(path = %scratch.path().display(), purged, "Scratch directory ready");

    let device = args.device.or_else(|| config.audio.device.clone());
    let deps = SessionDeps {
        gateway: Arc::new(LocalSpeakerGateway::new(device)),
        resolver: Arc::new(YtDlpResolver::new(config.resolver.clone())),
        sink: Arc::new(LogSink),
        events: EventBus::new(config.session.event_capacity),
    };
    let session = Session::new(deps, config.session.clone(), &scratch);

    let token = auth::token_from_env();
    if token.is_none() {
        warn!("{} not set; HTTP API is unauthenticated", auth::TOKEN_ENV);
    }

    let ctx = AppContext {
        session: session.clone(),
        token,
    };
    api::run(ctx, port, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    session.stop().await;
    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(configured_level: &str) {
    let default_filter = format!(
        "jukebot_player={level},jukebot_common={level},tower_http={level}",
        level = configured_level
    );
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
