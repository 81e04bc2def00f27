use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /v1/stats
///
/// Summarizes admission control: request and rejection counts, clients
/// currently tracked and clients reclaimed since startup.
pub async fn get_stats(State(state): State<SharedState>) -> Json<Value> {
    state.metrics.observe(&state.admission);
    let uptime_secs = state.start_time.elapsed().as_secs();
    let admission = state.admission.stats();
    let config = state.admission.config();

    Json(json!({
        "total_requests": state.metrics.requests_total.get(),
        "rate_limited_requests": state.metrics.requests_rate_limited.get(),
        "client_resolution_failures": state.metrics.client_resolution_failures.get(),
        "tracked_clients": admission.tracked_clients,
        "evicted_clients": admission.evicted_clients,
        "reaper_running": admission.reaper_running,
        "uptime_secs": uptime_secs,
        "limiter": {
            "enabled": config.enabled,
            "rps": config.rps,
            "burst": config.burst,
            "idle_threshold_secs": config.idle_threshold.as_secs(),
            "sweep_interval_secs": config.sweep_interval.as_secs()
        }
    }))
}
