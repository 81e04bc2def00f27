use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use ipdb_api::build_router;
use ipdb_common::AppConfig;
use ipdb_integration_tests::{api_state, get_from};
use tower::ServiceExt;

fn podcast_routes() -> Router {
    Router::new().route("/podcasts/{id}", get(|| async { "podcast" }))
}

#[tokio::test]
async fn test_application_routes_share_admission() {
    let mut config = AppConfig::default();
    config.limiter.burst = 3;
    let app = build_router(api_state(config), podcast_routes());

    let mut statuses = Vec::new();
    for path in ["/v1/podcasts/1", "/v1/healthcheck", "/v1/podcasts/2", "/v1/podcasts/3"] {
        let response = app
            .clone()
            .oneshot(get_from(path, "192.0.2.10:40000"))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS
        ]
    );
}

#[tokio::test]
async fn test_ports_of_one_host_share_a_bucket() {
    let mut config = AppConfig::default();
    config.limiter.burst = 1;
    let app = build_router(api_state(config), podcast_routes());

    let first = app
        .clone()
        .oneshot(get_from("/v1/podcasts/1", "192.0.2.10:40000"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .clone()
        .oneshot(get_from("/v1/podcasts/1", "192.0.2.10:40001"))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_host = app
        .oneshot(get_from("/v1/podcasts/1", "192.0.2.11:40000"))
        .await
        .unwrap();
    assert_eq!(other_host.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_trusted_forwarded_for_identity() {
    let mut config = AppConfig::default();
    config.limiter.burst = 1;
    config.limiter.trust_forwarded_for = true;
    let state = api_state(config);
    let app = build_router(Arc::clone(&state), podcast_routes());

    let mut request = get_from("/v1/podcasts/1", "10.0.0.1:1");
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.admission.registry().contains("203.0.113.5"));

    let mut request = get_from("/v1/podcasts/1", "10.0.0.1:1");
    request
        .headers_mut()
        .insert("x-forwarded-for", "garbage".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(state.metrics.client_resolution_failures.get(), 1);
}

#[tokio::test]
async fn test_rejection_carries_retry_after() {
    let mut config = AppConfig::default();
    config.limiter.rps = 0.25;
    config.limiter.burst = 1;
    let app = build_router(api_state(config), podcast_routes());

    let _ = app
        .clone()
        .oneshot(get_from("/v1/podcasts/1", "192.0.2.1:1"))
        .await
        .unwrap();
    let response = app
        .oneshot(get_from("/v1/podcasts/1", "192.0.2.1:1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    // One token every 4 seconds.
    assert_eq!(response.headers()[header::RETRY_AFTER], "4");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "IPDB-005 - Rate limit exceeded");
}
