//! Per-client admission control for the ipdb API.
//!
//! Every distinct caller gets a [`TokenBucket`] that refills at a steady rate
//! up to a burst capacity. Client state lives in a [`ClientRegistry`], which
//! keeps its lookup table and a [`RecencyIndex`] in lockstep under one lock.
//! A background [`Reaper`] walks the recency index from the stalest end and
//! drops clients that have gone idle, so memory stays bounded by the number
//! of recently active clients.
//!
//! [`AdmissionController`] ties these together behind a single
//! [`check`](AdmissionController::check) call and an explicit
//! [`start`](AdmissionController::start) / [`stop`](AdmissionController::stop)
//! lifecycle for the reaper.

pub mod error;
pub mod reaper;
pub mod recency;
pub mod registry;
pub mod token_bucket;

use std::sync::Arc;

use ipdb_common::{LimiterConfig, MAX_LIMITER_DURATION_SECS};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::{Duration, Instant};

pub use error::AdmissionError;
pub use reaper::{Reaper, ReaperHandle};
pub use recency::RecencyIndex;
pub use registry::{ClientRecord, ClientRegistry};
pub use token_bucket::TokenBucket;

/// Settings for an [`AdmissionController`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub enabled: bool,
    /// Refill rate per client, in tokens per second.
    pub rps: f64,
    /// Bucket capacity per client.
    pub burst: u32,
    pub idle_threshold: Duration,
    pub sweep_interval: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            idle_threshold: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl From<&LimiterConfig> for AdmissionConfig {
    fn from(config: &LimiterConfig) -> Self {
        Self {
            enabled: config.enabled,
            rps: config.rps,
            burst: config.burst,
            idle_threshold: Duration::from_secs(config.idle_threshold_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }
}

impl AdmissionConfig {
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if !self.rps.is_finite() || self.rps <= 0.0 {
            return Err(AdmissionError::InvalidRate(self.rps));
        }
        if self.burst == 0 {
            return Err(AdmissionError::InvalidBurst);
        }
        if self.idle_threshold.is_zero() {
            return Err(AdmissionError::ZeroDuration("idle threshold"));
        }
        if self.sweep_interval.is_zero() {
            return Err(AdmissionError::ZeroDuration("sweep interval"));
        }

        let max = Duration::from_secs(MAX_LIMITER_DURATION_SECS);
        if self.idle_threshold > max {
            return Err(AdmissionError::DurationTooLarge("idle threshold", max));
        }
        if self.sweep_interval > max {
            return Err(AdmissionError::DurationTooLarge("sweep interval", max));
        }
        Ok(())
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The client is over its rate. `retry_after` is the time until its
    /// bucket holds a whole token again.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Point-in-time view of the controller's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionStats {
    pub tracked_clients: usize,
    pub evicted_clients: u64,
    pub reaper_running: bool,
}

/// Per-client rate limiting with idle-client reclamation.
///
/// Cheaply cloneable (backed by `Arc`) and safe to share across tasks and
/// threads. The composition root constructs one, calls
/// [`start`](Self::start) inside a Tokio runtime and [`stop`](Self::stop) on
/// shutdown.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: AdmissionConfig,
    registry: Arc<ClientRegistry>,
    reaper: Reaper,
    running: Mutex<Option<ReaperHandle>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Result<Self, AdmissionError> {
        config.validate()?;

        let registry = Arc::new(ClientRegistry::new(config.burst, config.rps));
        let reaper = Reaper::new(
            Arc::clone(&registry),
            config.idle_threshold,
            config.sweep_interval,
        );

        tracing::info!(
            enabled = config.enabled,
            rps = config.rps,
            burst = config.burst,
            "creating admission controller"
        );

        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                registry,
                reaper,
                running: Mutex::new(None),
            }),
        })
    }

    /// Decide whether the next request from `client_id` may proceed.
    pub fn check(&self, client_id: &str) -> Admission {
        self.check_at(client_id, Instant::now())
    }

    /// Decide whether a request from `client_id` arriving at `now` may
    /// proceed. When admission control is disabled every request is allowed
    /// and no client state is recorded.
    pub fn check_at(&self, client_id: &str, now: Instant) -> Admission {
        if !self.inner.config.enabled {
            return Admission::Allowed;
        }

        let record = self.inner.registry.touch_or_create_at(client_id, now);
        match record.try_acquire_at(now) {
            Ok(()) => Admission::Allowed,
            Err(retry_after) => Admission::Denied { retry_after },
        }
    }

    /// Spawn the idle-client reaper on the current Tokio runtime.
    ///
    /// Does nothing when admission control is disabled, since no client
    /// state is ever recorded.
    pub fn start(&self) -> Result<(), AdmissionError> {
        if !self.inner.config.enabled {
            tracing::info!("admission control disabled, reaper not started");
            return Ok(());
        }

        let handle = Handle::try_current().map_err(|_| AdmissionError::NoRuntime)?;

        let mut running = self.inner.running.lock();
        if running.is_some() {
            return Err(AdmissionError::AlreadyStarted);
        }
        *running = Some(self.inner.reaper.clone().spawn_on(&handle));
        Ok(())
    }

    /// Stop the reaper and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let handle = self.inner.running.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .running
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one eviction sweep immediately, outside the periodic schedule.
    pub fn sweep_at(&self, now: Instant) -> usize {
        self.inner.reaper.sweep_at(now)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            tracked_clients: self.inner.registry.len(),
            evicted_clients: self.inner.reaper.evicted_total(),
            reaper_running: self.is_running(),
        }
    }
}
