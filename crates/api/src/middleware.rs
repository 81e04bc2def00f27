use std::any::Any;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use ipdb_rate_limit::Admission;
use tracing::{error, info, warn};

use crate::client_id::{resolve_client_id, ClientIdError};
use crate::errors::{bad_request_response, rate_limit_exceeded_response, server_error_response};
use crate::state::SharedState;

/// Per-client admission control for every request.
///
/// Resolves the caller's identity, asks the admission controller for a
/// decision and either forwards the request or answers 429. An unresolvable
/// identity is a request failure, not a rate-limit decision.
pub async fn admission(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    state.metrics.requests_total.inc();

    let controller = &state.admission;
    if !controller.config().enabled {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let client_id = match resolve_client_id(
        req.headers(),
        peer,
        state.config.limiter.trust_forwarded_for,
    ) {
        Ok(id) => id,
        Err(e) => {
            state.metrics.client_resolution_failures.inc();
            warn!(error = %e, uri = %req.uri(), "could not resolve client identity");
            return match e {
                ClientIdError::MissingPeerAddress => server_error_response(e),
                ClientIdError::MalformedForwardedFor(_) => bad_request_response(e),
            };
        }
    };

    match controller.check(&client_id) {
        Admission::Allowed => next.run(req).await,
        Admission::Denied { retry_after } => {
            state.metrics.requests_rate_limited.inc();
            info!(
                client_id = %client_id,
                retry_after_ms = retry_after.as_millis() as u64,
                "request rate limited"
            );
            rate_limit_exceeded_response(retry_after)
        }
    }
}

/// Turn a panicking handler into a 500 envelope and close the connection.
pub fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    error!(panic = %detail, "recovered from handler panic");

    let mut response = server_error_response(&detail);
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
