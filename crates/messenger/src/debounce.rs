//! Per-conversation quiet-window coalescing.
//!
//! Each conversation key owns one slot: the texts buffered so far, the generation of the
//! most recent arrival and the timer armed for it. Every arrival bumps the generation and
//! re-arms the timer; a timer that wakes for an older generation does nothing. When the
//! current timer fires the buffer is drained under the shard lock before the handler runs,
//! so messages that arrive mid-turn start a fresh buffer. A per-key turn lock keeps turns
//! for the same conversation strictly sequential.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dokan_core::domain::conversation::{CoalescedTurn, ConversationKey, InboundEvent};
use tokio::task::JoinHandle;
use tracing::debug;

const SHARD_COUNT: usize = 16;

#[async_trait]
pub trait TurnHandler: Send + Sync {
    /// Failures are the handler's to log; the coalescer returns to idle either way.
    async fn handle_turn(&self, turn: CoalescedTurn);
}

type Shard = Mutex<HashMap<ConversationKey, Slot>>;

struct Slot {
    texts: Vec<String>,
    event_ids: Vec<String>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    turn_lock: Arc<tokio::sync::Mutex<()>>,
    in_flight: usize,
}

impl Slot {
    fn new() -> Self {
        Self {
            texts: Vec::new(),
            event_ids: Vec::new(),
            generation: 0,
            timer: None,
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
            in_flight: 0,
        }
    }

    fn is_idle(&self) -> bool {
        self.texts.is_empty() && self.timer.is_none() && self.in_flight == 0
    }
}

struct Inner {
    quiet_window: Duration,
    shards: Vec<Shard>,
    handler: Arc<dyn TurnHandler>,
}

#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

impl Coalescer {
    pub fn new(quiet_window: Duration, handler: Arc<dyn TurnHandler>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self { inner: Arc::new(Inner { quiet_window, shards, handler }) }
    }

    pub fn quiet_window(&self) -> Duration {
        self.inner.quiet_window
    }

    /// Buffers the event and (re)starts its conversation's quiet-window timer. Must be
    /// called from within a tokio runtime.
    pub fn push(&self, event: InboundEvent) {
        let InboundEvent { key, event_id, text, .. } = event;
        let mut slots = self.inner.shard(&key);
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);

        slot.texts.push(text);
        slot.event_ids.push(event_id);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(previous) = slot.timer.take() {
            previous.abort();
        }

        let generation = slot.generation;
        let buffered = slot.texts.len();
        let inner = Arc::clone(&self.inner);
        let timer_key = key.clone();
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_window).await;
            Inner::fire(inner, timer_key, generation).await;
        }));
        drop(slots);

        debug!(
            event_name = "ingress.debounce.buffered",
            merchant_id = %key.merchant_id.0,
            customer_id = %key.customer_id.0,
            buffered,
            "message buffered; quiet window restarted"
        );
    }

    /// Conversations with buffered text, an armed timer or a turn in progress.
    pub fn active_conversations(&self) -> usize {
        self.inner.shards.iter().map(|shard| lock(shard).len()).sum()
    }
}

impl Inner {
    fn shard(&self, key: &ConversationKey) -> MutexGuard<'_, HashMap<ConversationKey, Slot>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % SHARD_COUNT as u64) as usize;
        lock(&self.shards[index])
    }

    async fn fire(inner: Arc<Inner>, key: ConversationKey, generation: u64) {
        let (turn, turn_lock) = {
            let mut slots = inner.shard(&key);
            let Some(slot) = slots.get_mut(&key) else {
                return;
            };
            if slot.generation != generation || slot.texts.is_empty() {
                return;
            }

            slot.timer = None;
            slot.in_flight += 1;
            let turn = CoalescedTurn {
                key: key.clone(),
                event_ids: std::mem::take(&mut slot.event_ids),
                texts: std::mem::take(&mut slot.texts),
            };
            (turn, Arc::clone(&slot.turn_lock))
        };

        let _in_flight = InFlight { inner: Arc::clone(&inner), key };
        let _turn_guard = turn_lock.lock().await;
        debug!(
            event_name = "ingress.debounce.drained",
            correlation_id = %turn.correlation_id(),
            merchant_id = %turn.key.merchant_id.0,
            customer_id = %turn.key.customer_id.0,
            messages = turn.texts.len(),
            "quiet window elapsed; dispatching coalesced turn"
        );
        inner.handler.handle_turn(turn).await;
    }
}

/// Releases the slot once its turn is over, even if the handler panicked.
struct InFlight {
    inner: Arc<Inner>,
    key: ConversationKey,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut slots = self.inner.shard(&self.key);
        let Some(slot) = slots.get_mut(&self.key) else {
            return;
        };
        slot.in_flight = slot.in_flight.saturating_sub(1);
        if slot.is_idle() {
            slots.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
