pub mod client_id;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;

use crate::state::SharedState;

pub use client_id::{resolve_client_id, ClientIdError};
pub use state::{ApiMetrics, AppState, SharedState as SharedStateType};

/// Build the `/v1` router with the built-in routes, the caller's application
/// routes and the admission and panic-recovery middleware.
///
/// `app_routes` are mounted under `/v1` next to the built-in routes and are
/// subject to the same admission control.
pub fn build_router(state: SharedState, app_routes: Router) -> Router {
    let v1 = Router::new()
        .route("/healthcheck", get(routes::health::healthcheck))
        .route("/metrics", get(routes::metrics::get_metrics))
        .route("/stats", get(routes::stats::get_stats))
        .with_state(Arc::clone(&state))
        .merge(app_routes);

    Router::new()
        .nest("/v1", v1)
        .fallback(errors::fallback)
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::admission,
        ))
        .layer(CatchPanicLayer::custom(middleware::recover_panic))
}

/// Serve the API on the configured listen address until `shutdown`
/// resolves, then drain in-flight requests.
pub async fn run_server<F>(state: SharedState, app_routes: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listen_addr = state.config.server.listen.clone();
    let app = build_router(state, app_routes);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("API server listening on {}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Convenience function to create a SharedState from its parts.
pub fn new_shared_state(
    config: ipdb_common::AppConfig,
    admission: ipdb_rate_limit::AdmissionController,
) -> anyhow::Result<SharedState> {
    Ok(Arc::new(AppState::new(config, admission)?))
}
