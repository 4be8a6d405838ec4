use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// Process-local record of event ids already accepted. Losing it on restart costs at
/// most one duplicate reply.
#[derive(Debug)]
pub struct Deduplicator {
    ttl: Duration,
    state: Mutex<DedupState>,
}

#[derive(Debug)]
struct DedupState {
    first_seen: HashMap<String, Instant>,
    last_purge: Instant,
}

impl Deduplicator {
    pub fn new(ttl: Duration) -> Self {
        let state = DedupState { first_seen: HashMap::new(), last_purge: Instant::now() };
        Self { ttl, state: Mutex::new(state) }
    }

    /// Returns `false` the first time an id is offered within the TTL and records it;
    /// every later call inside the window returns `true`.
    pub fn seen(&self, event_id: &str) -> bool {
        let now = Instant::now();
        let mut state = self.lock();

        if now.duration_since(state.last_purge) >= self.purge_interval() {
            let ttl = self.ttl;
            state.first_seen.retain(|_, first_seen| now.duration_since(*first_seen) < ttl);
            state.last_purge = now;
        }

        match state.first_seen.get(event_id) {
            Some(first_seen) if now.duration_since(*first_seen) < self.ttl => true,
            _ => {
                state.first_seen.insert(event_id.to_string(), now);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_interval(&self) -> Duration {
        (self.ttl / 5).max(Duration::from_secs(1))
    }

    fn lock(&self) -> MutexGuard<'_, DedupState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
