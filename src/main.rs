//! apigate - sidecar decision proxy.
//!
//! Stands between an application and a remote decision service, answering
//! allow/deny checks from a windowed local cache and bulk-shipping
//! pseudonymized activity logs.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use apigate::config::Config;
use apigate::engine::DecisionEngine;
use apigate::server::{AppState, serve};
use apigate::shipper::LogShipper;
use apigate::upstream::UpstreamClient;

/// Listener configuration for the proxy surface.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Observability first, so startup problems are visible.
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());

    info!(
        port = cli.port,
        upstream = %config.upstream_base_url,
        window_secs = config.window().as_secs(),
        log_flush_secs = config.flush_interval().as_secs(),
        log_batch_size = config.log_batch_size,
        api_key_configured = config.upstream_api_key.is_some(),
        email_pseudonymization = !config.email_encryption_key.is_empty(),
        "apigate starting"
    );

    let upstream = UpstreamClient::new(&config)?;

    let engine = Arc::new(DecisionEngine::new(config.clone(), upstream.clone()));
    engine.start();

    let shipper = LogShipper::new(&config, upstream);
    let shutdown = CancellationToken::new();
    shipper.start(shutdown.clone());

    let state = AppState {
        engine,
        shipper: shipper.clone(),
    };

    let addr = format!("{}:{}", cli.bind, cli.port);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        server_shutdown.cancel();
    });

    if let Err(e) = serve(state, &addr, shutdown.clone()).await {
        error!(error = %e, "server error");
    }

    // The ticker is already cancelled; one final synchronous flush drains
    // whatever is still buffered.
    shipper.stop().await;
    info!("apigate exited");

    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
