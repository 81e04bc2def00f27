use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ipdb_common::AppConfig;
use ipdb_rate_limit::AdmissionController;
use prometheus::{IntCounter, IntGauge, Registry};

/// Shared state type alias used across all route handlers.
pub type SharedState = Arc<AppState>;

/// Central application state: configuration, the admission controller and
/// request metrics.
pub struct AppState {
    pub config: AppConfig,
    pub admission: AdmissionController,
    pub metrics: ApiMetrics,
    pub start_time: std::time::Instant,
}

/// Prometheus metrics collected at the API boundary.
pub struct ApiMetrics {
    pub registry: Registry,
    pub requests_total: IntCounter,
    pub requests_rate_limited: IntCounter,
    pub client_resolution_failures: IntCounter,
    pub tracked_clients: IntGauge,
    pub clients_evicted: IntCounter,
    evictions_reported: AtomicU64,
}

impl ApiMetrics {
    /// Create and register every metric under the `ipdb_` prefix.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::new(
            "ipdb_requests_total",
            "Total requests seen by admission control",
        )?;
        let requests_rate_limited = IntCounter::new(
            "ipdb_requests_rate_limited_total",
            "Requests rejected for exceeding the per-client rate",
        )?;
        let client_resolution_failures = IntCounter::new(
            "ipdb_client_resolution_failures_total",
            "Requests whose client identity could not be resolved",
        )?;
        let tracked_clients = IntGauge::new(
            "ipdb_tracked_clients",
            "Clients currently held by the admission registry",
        )?;
        let clients_evicted = IntCounter::new(
            "ipdb_clients_evicted_total",
            "Idle clients reclaimed by the reaper since startup",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_rate_limited.clone()))?;
        registry.register(Box::new(client_resolution_failures.clone()))?;
        registry.register(Box::new(tracked_clients.clone()))?;
        registry.register(Box::new(clients_evicted.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_rate_limited,
            client_resolution_failures,
            tracked_clients,
            clients_evicted,
            evictions_reported: AtomicU64::new(0),
        })
    }

    /// Bring the registry-derived metrics up to date with the admission
    /// controller. Called on every metrics or stats read.
    pub fn observe(&self, admission: &AdmissionController) {
        let stats = admission.stats();
        self.tracked_clients.set(stats.tracked_clients as i64);

        // The reaper keeps its own running total. Concurrent readers each
        // claim a disjoint range of it, so no eviction is counted twice.
        let total = stats.evicted_clients;
        let reported = self.evictions_reported.fetch_max(total, Ordering::Relaxed);
        if total > reported {
            self.clients_evicted.inc_by(total - reported);
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig, admission: AdmissionController) -> prometheus::Result<Self> {
        Ok(Self {
            config,
            admission,
            metrics: ApiMetrics::new()?,
            start_time: std::time::Instant::now(),
        })
    }
}
