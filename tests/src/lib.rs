//! Shared helpers for the integration tests.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use ipdb_common::AppConfig;
use ipdb_rate_limit::{AdmissionConfig, AdmissionController};
use tokio::time::Duration;

/// Controller with the given rate and burst and the default idle settings
/// (3 minute threshold, 1 minute sweep).
pub fn controller(rps: f64, burst: u32) -> AdmissionController {
    AdmissionController::new(AdmissionConfig {
        rps,
        burst,
        idle_threshold: Duration::from_secs(180),
        sweep_interval: Duration::from_secs(60),
        enabled: true,
    })
    .expect("valid admission config")
}

/// Shared API state built from `config`.
pub fn api_state(config: AppConfig) -> ipdb_api::state::SharedState {
    let admission = AdmissionController::new(AdmissionConfig::from(&config.limiter))
        .expect("valid admission config");
    ipdb_api::new_shared_state(config, admission).expect("metrics register")
}

/// GET request arriving from `peer` ("ip:port").
pub fn get_from(path: &str, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().expect("valid socket address");
    Request::builder()
        .uri(path)
        .extension(ConnectInfo(addr))
        .body(Body::empty())
        .expect("valid request")
}
