//! # Checkstand API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Checkstand Server                               │
//! │                                                                         │
//! │  Storefront ──► HTTP (8080) ──► services ──► SQLite                    │
//! │                                    │                                    │
//! │  Stripe / PayPal ──► /webhooks ────┘──► provider APIs                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! checkstand-api [--config <path>]
//! ```

use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use checkstand_api::{router, AppConfig, AppState};
use checkstand_db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,checkstand=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Checkstand API server...");

    let config = AppConfig::load(config_path()).context("loading configuration")?;
    let addr = config.bind_addr()?;
    info!(
        %addr,
        database = %config.database.path.display(),
        stripe = config.stripe.is_some(),
        paypal = config.paypal.is_some(),
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("opening database")?;
    info!("Database ready");

    let state = AppState::from_config(&config, db.clone()).context("configuring payment providers")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>` wins over `CHECKSTAND_CONFIG`.
fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
    }
    std::env::var_os("CHECKSTAND_CONFIG").map(PathBuf::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
