use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::SharedState;

/// GET /v1/healthcheck
///
/// Reports availability, the configured environment and the build version.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "env": state.config.server.env,
        "version": env!("CARGO_PKG_VERSION")
    }))
}
