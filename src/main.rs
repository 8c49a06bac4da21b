//! Bounty Platform Server
//!
//! Listens for GitHub comment web hooks and keeps repositories and bounties in
//! sync with GitHub and the ledger.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bounty_platform::{
    config::Config,
    server::{self, AppState},
    Platform,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bounty-server", version, about = "Bounty platform web hook server")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "BOUNTY_CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load_from(&args.config)?;

    // Initialize logging
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting {}", config.name);

    let platform = Platform::from_config(&config)?;

    match platform.tracker.current_user().await {
        Ok(user) => info!("Connected to GitHub as {}", user.login),
        Err(e) => warn!("GitHub connectivity check failed: {}", e),
    }

    let webhook = &config.github.webhook;
    let listener = server::bind(&webhook.listen_address)
        .await
        .with_context(|| format!("Failed to start web hook listener on {}", webhook.listen_address))?;

    let reconciler = platform.reconciler.clone();
    let sync = tokio::spawn(async move { reconciler.run().await });
    info!(
        "Background sync started (every {} seconds)",
        config.sync_interval().as_secs()
    );

    let state = Arc::new(AppState {
        processor: platform.processor.clone(),
        lock: platform.lock.clone(),
        started_at: std::time::Instant::now(),
    });
    let router = server::create_router(state, &webhook.route(), config.server.log_requests);
    info!("Receiving web hooks at {}", webhook.target_url());

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut serving = tokio::spawn(server::run_server(listener, router, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        result = &mut serving => {
            sync.abort();
            return result.context("Web hook listener panicked")?;
        }
        _ = shutdown_signal() => {}
    }

    info!("Shutting down, waiting up to {:?} for in-flight requests", config.shutdown_grace());
    let _ = stop_tx.send(());
    match tokio::time::timeout(config.shutdown_grace(), &mut serving).await {
        Ok(Ok(Ok(()))) => info!("Web hook listener stopped"),
        Ok(Ok(Err(e))) => error!("Web hook listener failed during shutdown: {}", e),
        Ok(Err(e)) => error!("Web hook listener panicked: {}", e),
        Err(_) => {
            warn!("Grace period elapsed, closing remaining connections");
            serving.abort();
        }
    }
    sync.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
