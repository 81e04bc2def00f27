use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::registry::ClientRegistry;

/// Periodic eviction of idle clients.
///
/// Each sweep pops the stalest clients off the recency index one at a time,
/// stopping at the first client seen within `idle_threshold`. The registry
/// lock is held only for each individual pop, never for a whole sweep.
#[derive(Clone)]
pub struct Reaper {
    registry: Arc<ClientRegistry>,
    idle_threshold: Duration,
    sweep_interval: Duration,
    evicted: Arc<AtomicU64>,
}

impl Reaper {
    pub fn new(registry: Arc<ClientRegistry>, idle_threshold: Duration, sweep_interval: Duration) -> Self {
        Self {
            registry,
            idle_threshold,
            sweep_interval,
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Evict every client idle for longer than the threshold right now.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict every client idle for longer than the threshold as of `now`.
    /// Returns the number of clients evicted.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut evicted = 0;
        while let Some(record) = self.registry.pop_stale_at(self.idle_threshold, now) {
            trace!(
                client_id = %record.id(),
                idle_ms = now.saturating_duration_since(record.last_seen()).as_millis() as u64,
                "evicting idle client"
            );
            evicted += 1;
        }

        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        debug!(
            evicted,
            remaining = self.registry.len(),
            "admission reaper sweep complete"
        );
        evicted
    }

    /// Total clients evicted by this reaper and its clones.
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Run sweeps on `handle` every `sweep_interval` until stopped.
    ///
    /// The first sweep happens one full interval after spawning.
    pub fn spawn_on(self, handle: &Handle) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = handle.spawn(self.run(shutdown_rx));
        ReaperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.sweep_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            sweep_interval_ms = period.as_millis() as u64,
            idle_threshold_ms = self.idle_threshold.as_millis() as u64,
            "admission reaper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                changed = shutdown.changed() => {
                    // A dropped sender also means shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(remaining = self.registry.len(), "admission reaper stopped");
    }
}

/// Handle to a running [`Reaper`] task.
pub struct ReaperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper to stop and wait for its loop to exit.
    pub async fn stop(self) {
        // The task may already be gone, in which case there is no receiver.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "admission reaper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
