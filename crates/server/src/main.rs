use anyhow::Result;
use axum::Router;
use ipdb_common::AppConfig;
use ipdb_rate_limit::{AdmissionConfig, AdmissionController};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .json()
        .init();

    // Parse command-line args for config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/ipdb.yaml".to_string());

    info!(config_path = %config_path, version = env!("CARGO_PKG_VERSION"), "starting ipdb");

    let config = AppConfig::load(&config_path)?;
    info!(
        listen = %config.server.listen,
        env = %config.server.env,
        "configuration loaded"
    );

    let admission = AdmissionController::new(AdmissionConfig::from(&config.limiter))?;
    admission.start()?;

    let state = ipdb_api::new_shared_state(config, admission.clone())?;

    // Catalog, account and token routes are mounted here by their owning crates.
    let served = ipdb_api::run_server(state, Router::new(), shutdown_signal()).await;

    admission.stop().await;
    info!(
        remaining_clients = admission.registry().len(),
        "ipdb stopped"
    );

    served
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
