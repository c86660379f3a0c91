//! Bounded set of recently seen inbound message ids.

use crosschat_core::PlatformMessageId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

struct Inner {
    seen: HashMap<PlatformMessageId, Instant>,
    order: VecDeque<(PlatformMessageId, Instant)>,
}

/// Concurrent insert-if-absent set with eviction by count and age.
pub struct DedupSet {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl DedupSet {
    /// Remember at most `capacity` ids, each for at most `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                seen: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Insert `id` unless present. Returns true if this call inserted it.
    ///
    /// Linearizable: of any number of concurrent calls for the same id,
    /// exactly one observes `true`.
    pub fn check_and_insert(&self, id: &PlatformMessageId) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, now, self.ttl);

        if inner.seen.contains_key(id) {
            return false;
        }

        while inner.order.len() >= self.capacity {
            if let Some((oldest, stamp)) = inner.order.pop_front() {
                if inner.seen.get(&oldest) == Some(&stamp) {
                    inner.seen.remove(&oldest);
                }
            }
        }

        inner.seen.insert(id.clone(), now);
        inner.order.push_back((id.clone(), now));
        true
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &PlatformMessageId) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Self::evict_expired(&mut inner, now, self.ttl);
        inner.seen.contains_key(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.inner.lock().seen.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(inner: &mut Inner, now: Instant, ttl: Duration) {
        while let Some((_, stamp)) = inner.order.front() {
            if now.duration_since(*stamp) < ttl {
                break;
            }
            if let Some((id, stamp)) = inner.order.pop_front() {
                if inner.seen.get(&id) == Some(&stamp) {
                    inner.seen.remove(&id);
                }
            }
        }
    }
}
