use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};

use crate::recency::RecencyIndex;
use crate::token_bucket::TokenBucket;

/// State tracked for one calling client.
///
/// The bucket has its own lock so admission arithmetic for one client never
/// holds up the registry. `last_seen` is only written while the registry
/// lock is held, keeping it in step with the recency index.
#[derive(Debug)]
pub struct ClientRecord {
    id: Arc<str>,
    bucket: Mutex<TokenBucket>,
    last_seen: Mutex<Instant>,
}

impl ClientRecord {
    fn new(id: Arc<str>, bucket: TokenBucket, now: Instant) -> Self {
        Self {
            id,
            bucket: Mutex::new(bucket),
            last_seen: Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn last_seen(&self) -> Instant {
        *self.last_seen.lock()
    }

    /// Try to consume one token as of `now`, reporting the wait until the
    /// next token on denial.
    pub fn try_acquire_at(&self, now: Instant) -> Result<(), Duration> {
        self.bucket.lock().try_acquire_at(now)
    }

    /// Tokens left in the bucket as of its last check.
    pub fn tokens(&self) -> f64 {
        self.bucket.lock().tokens()
    }
}

struct RegistryState {
    records: HashMap<Arc<str>, Arc<ClientRecord>>,
    recency: RecencyIndex,
}

/// Concurrent map from client id to [`ClientRecord`].
///
/// A single lock guards both the id lookup table and the [`RecencyIndex`], so
/// every insert, reposition and removal lands in both structures at once and
/// no reader ever sees an id in one but not the other.
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    burst: u32,
    rate: f64,
}

impl ClientRegistry {
    /// Create an empty registry whose new clients start with a full bucket
    /// of `burst` tokens refilling at `rate` tokens per second.
    pub fn new(burst: u32, rate: f64) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                records: HashMap::new(),
                recency: RecencyIndex::new(),
            }),
            burst,
            rate,
        }
    }

    /// Return the record for `id`, creating it if this is the first sighting.
    pub fn get_or_create(&self, id: &str) -> Arc<ClientRecord> {
        self.get_or_create_at(id, Instant::now())
    }

    /// Return the record for `id`, creating it with `last_seen = now` if it
    /// does not exist. Lookup and insert happen under one lock, so concurrent
    /// first requests for the same id all receive the same record.
    pub fn get_or_create_at(&self, id: &str, now: Instant) -> Arc<ClientRecord> {
        let mut state = self.state.lock();
        if let Some(record) = state.records.get(id) {
            return Arc::clone(record);
        }
        self.insert_locked(&mut state, id, now)
    }

    /// Get-or-create `id` and mark it as seen at `now`, as one atomic step.
    ///
    /// A record returned here is live in the registry at the moment of
    /// return; the reaper cannot evict it between lookup and refresh.
    pub fn touch_or_create_at(&self, id: &str, now: Instant) -> Arc<ClientRecord> {
        let mut state = self.state.lock();
        match state.records.get(id).map(Arc::clone) {
            Some(record) => {
                Self::touch_locked(&mut state, &record, now);
                record
            }
            None => self.insert_locked(&mut state, id, now),
        }
    }

    /// Refresh `last_seen` for `id` and reposition it in recency order.
    ///
    /// Returns `false` if the client is not tracked.
    pub fn touch(&self, id: &str) -> bool {
        self.touch_at(id, Instant::now())
    }

    pub fn touch_at(&self, id: &str, now: Instant) -> bool {
        let mut state = self.state.lock();
        match state.records.get(id).map(Arc::clone) {
            Some(record) => {
                Self::touch_locked(&mut state, &record, now);
                true
            }
            None => false,
        }
    }

    /// Forget `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<ClientRecord>> {
        let mut state = self.state.lock();
        let record = state.records.remove(id);
        let indexed = state.recency.remove(id);
        assert_eq!(
            record.is_some(),
            indexed.is_some(),
            "client {id} present in only one of registry and recency index"
        );
        record
    }

    /// Evict the least recently seen client if it has been idle for longer
    /// than `threshold` as of `now`.
    ///
    /// The index pop and the registry removal form one critical section.
    pub fn pop_stale_at(&self, threshold: Duration, now: Instant) -> Option<Arc<ClientRecord>> {
        let mut state = self.state.lock();
        let (id, _) = state.recency.pop_if_stale(threshold, now)?;
        let record = state.records.remove(&id);
        assert!(
            record.is_some(),
            "client {id} indexed for eviction but missing from the registry"
        );
        record
    }

    pub fn get(&self, id: &str) -> Option<Arc<ClientRecord>> {
        self.state.lock().records.get(id).map(Arc::clone)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the lookup table and the recency index hold exactly the same
    /// ids with matching last-seen times.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        state.records.len() == state.recency.len()
            && state
                .records
                .iter()
                .all(|(id, record)| state.recency.last_seen(id) == Some(record.last_seen()))
    }

    fn insert_locked(&self, state: &mut RegistryState, id: &str, now: Instant) -> Arc<ClientRecord> {
        let id: Arc<str> = Arc::from(id);
        let bucket = TokenBucket::new(self.burst, self.rate, now);
        let record = Arc::new(ClientRecord::new(Arc::clone(&id), bucket, now));

        state.records.insert(Arc::clone(&id), Arc::clone(&record));
        state.recency.insert(id, now);
        debug_assert_eq!(state.records.len(), state.recency.len());

        tracing::trace!(client_id = %record.id(), clients = state.records.len(), "tracking new client");
        record
    }

    fn touch_locked(state: &mut RegistryState, record: &ClientRecord, now: Instant) {
        let mut last_seen = record.last_seen.lock();
        // Requests can reach the lock out of clock order; never move backwards.
        if now > *last_seen {
            *last_seen = now;
        }
        let indexed = state.recency.touch(&record.id, *last_seen);
        debug_assert!(indexed, "tracked client missing from recency index");
    }
}
