//! Voxstream Audio Pipeline (voxstream-ap) - Main entry point
//!
//! Loads the bootstrap configuration, wires the concrete collaborators
//! (symphonia decoder, µ-law encoder, UDP audience, file/HTTP byte source),
//! then runs the tick driver and the HTTP control API until shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxstream_ap::api::{self, AppContext};
use voxstream_ap::audio::{MuLawEncoderFactory, SymphoniaDecoderFactory};
use voxstream_ap::config::Config;
use voxstream_ap::delivery::UdpAudience;
use voxstream_ap::playback::driver::run_tick_driver;
use voxstream_ap::playback::{DefaultByteSource, PipelineContext, SessionManager, TrackHooks};
use voxstream_common::EventBus;

/// Command-line arguments for voxstream-ap
#[derive(Parser, Debug)]
#[command(name = "voxstream-ap")]
#[command(about = "Paced voice-transport audio streaming service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "VOXSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Control API listen address (overrides config)
    #[arg(short, long, env = "VOXSTREAM_BIND")]
    bind: Option<SocketAddr>,

    /// Tick interval in milliseconds (overrides config)
    #[arg(long)]
    tick_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = voxstream_common::config::resolve_config_path(
        args.config.as_deref(),
        "VOXSTREAM_CONFIG",
    );
    let mut config =
        Config::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(tick_ms) = args.tick_ms {
        config.server.tick_interval_ms = tick_ms;
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting voxstream-ap {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("VOXSTREAM_GIT_HASH")
    );

    let audience = Arc::new(
        UdpAudience::bind(config.server.udp_bind_addr, &config.recipients)
            .context("Failed to bind UDP audience socket")?,
    );
    info!(
        "UDP audience on {} with {} configured recipients",
        audience.local_addr()?,
        config.recipients.len()
    );

    let context = PipelineContext {
        decoders: Arc::new(SymphoniaDecoderFactory),
        encoders: Arc::new(MuLawEncoderFactory),
        bytes: Arc::new(
            DefaultByteSource::new(config.server.fetch_timeout())
                .context("Failed to build HTTP client")?,
        ),
        registry: audience.clone(),
        sink: audience.clone(),
        hooks: Arc::new(TrackHooks::new()),
        events: EventBus::new(config.stream.event_capacity),
        stream: config.stream.clone(),
    };
    let manager = Arc::new(SessionManager::new(context, config.defaults.clone()));

    let shutdown = CancellationToken::new();

    let ticker = tokio::spawn(run_tick_driver(
        Arc::clone(&manager),
        config.server.tick_interval(),
        shutdown.clone(),
    ));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    api::run(
        config.server.bind_addr,
        AppContext {
            manager: Arc::clone(&manager),
            audience,
        },
        shutdown.clone(),
    )
    .await
    .context("Server error")?;

    shutdown.cancel();
    manager.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(1), ticker).await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
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
