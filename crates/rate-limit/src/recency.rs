use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{Duration, Instant};

/// One heap slot: a client id and the last time it was seen.
#[derive(Debug)]
struct Slot {
    last_seen: Instant,
    id: Arc<str>,
}

/// Recency ordering of live clients, stalest first.
///
/// An indexed binary min-heap keyed by `last_seen`. A side table maps every
/// id to its slot position, so an entry can be repositioned in place when the
/// client is seen again instead of leaving a stale entry behind. Insert,
/// reposition and remove are `O(log n)`; peeking at the stalest client is
/// `O(1)`.
///
/// Holds at most one slot per id.
#[derive(Debug, Default)]
pub struct RecencyIndex {
    heap: Vec<Slot>,
    positions: HashMap<Arc<str>, usize>,
}

impl RecencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Last-seen time recorded for `id`.
    pub fn last_seen(&self, id: &str) -> Option<Instant> {
        self.positions.get(id).map(|&pos| self.heap[pos].last_seen)
    }

    /// Insert `id`, or reposition it if already present.
    pub fn insert(&mut self, id: Arc<str>, last_seen: Instant) {
        if let Some(&pos) = self.positions.get(&id) {
            self.reposition(pos, last_seen);
            return;
        }

        let pos = self.heap.len();
        self.positions.insert(Arc::clone(&id), pos);
        self.heap.push(Slot { last_seen, id });
        self.sift_up(pos);
    }

    /// Move `id` to its new place in recency order.
    ///
    /// Returns `false` if `id` is not indexed.
    pub fn touch(&mut self, id: &str, last_seen: Instant) -> bool {
        match self.positions.get(id) {
            Some(&pos) => {
                self.reposition(pos, last_seen);
                true
            }
            None => false,
        }
    }

    /// Remove `id`, returning its last-seen time if it was indexed.
    pub fn remove(&mut self, id: &str) -> Option<Instant> {
        let pos = *self.positions.get(id)?;
        Some(self.remove_at(pos).last_seen)
    }

    /// The least recently seen client.
    pub fn peek(&self) -> Option<(&str, Instant)> {
        self.heap.first().map(|slot| (&*slot.id, slot.last_seen))
    }

    /// Remove and return the stalest client if it has been idle for longer
    /// than `threshold` as of `now`. Leaves the index untouched otherwise.
    pub fn pop_if_stale(&mut self, threshold: Duration, now: Instant) -> Option<(Arc<str>, Instant)> {
        let oldest = self.heap.first()?;
        if now.saturating_duration_since(oldest.last_seen) <= threshold {
            return None;
        }

        let slot = self.remove_at(0);
        Some((slot.id, slot.last_seen))
    }

    fn reposition(&mut self, pos: usize, last_seen: Instant) {
        let previous = std::mem::replace(&mut self.heap[pos].last_seen, last_seen);
        if last_seen < previous {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }
    }

    fn remove_at(&mut self, pos: usize) -> Slot {
        let last = self.heap.len() - 1;
        self.swap(pos, last);

        let slot = match self.heap.pop() {
            Some(slot) => slot,
            None => unreachable!("remove_at called on an empty recency index"),
        };
        self.positions.remove(&slot.id);

        if pos < self.heap.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
        slot
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].last_seen >= self.heap[parent].last_seen {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.heap[left].last_seen < self.heap[smallest].last_seen {
                smallest = left;
            }
            if right < len && self.heap[right].last_seen < self.heap[smallest].last_seen {
                smallest = right;
            }
            if smallest == pos {
                break;
            }

            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        for pos in [a, b] {
            if let Some(slot_pos) = self.positions.get_mut(&*self.heap[pos].id) {
                *slot_pos = pos;
            }
        }
    }

    /// Verify heap order and that the position table agrees with the heap.
    #[cfg(test)]
    fn assert_well_formed(&self) {
        assert_eq!(self.heap.len(), self.positions.len());
        for (pos, slot) in self.heap.iter().enumerate() {
            assert_eq!(self.positions.get(&slot.id), Some(&pos));
            if pos > 0 {
                let parent = (pos - 1) / 2;
                assert!(self.heap[parent].last_seen <= slot.last_seen);
            }
        }
    }
}
