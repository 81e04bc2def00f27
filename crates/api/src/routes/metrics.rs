use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use prometheus::{Encoder, TextEncoder};

use crate::errors::server_error_response;
use crate::state::SharedState;

/// GET /v1/metrics
pub async fn get_metrics(State(state): State<SharedState>) -> Response {
    state.metrics.observe(&state.admission);

    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut body) {
        tracing::error!(error = %e, "metrics exposition failed");
        return server_error_response(e);
    }

    let mut response = body.into_response();
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response
}
