use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use safepath_core::domain::conversation::{ConversationState, ThreadId};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;

/// One conversation. The async mutex serialises turns on the same thread.
pub struct ConversationSlot {
    state: Mutex<ConversationState>,
    last_active: StdMutex<Instant>,
}

impl ConversationSlot {
    fn new(thread_id: ThreadId) -> Self {
        Self {
            state: Mutex::new(ConversationState::new(thread_id)),
            last_active: StdMutex::new(Instant::now()),
        }
    }

    /// Waits for any running turn on this thread, then marks it active.
    /// The thread is marked active again when the guard is released.
    pub async fn lock(&self) -> ConversationGuard<'_> {
        let state = self.state.lock().await;
        self.touch();
        ConversationGuard { state, slot: self }
    }

    fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    pub async fn snapshot(&self) -> ConversationState {
        self.state.lock().await.clone()
    }

    fn touch(&self) {
        let mut last_active = self.last_active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *last_active = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_active = self.last_active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        now.saturating_duration_since(*last_active)
    }
}

/// Exclusive access to one conversation for the length of a turn.
pub struct ConversationGuard<'a> {
    state: MutexGuard<'a, ConversationState>,
    slot: &'a ConversationSlot,
}

impl Deref for ConversationGuard<'_> {
    type Target = ConversationState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for ConversationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Drop for ConversationGuard<'_> {
    fn drop(&mut self) {
        self.slot.touch();
    }
}

pub type ConversationHandle = Arc<ConversationSlot>;

/// In-memory conversation states keyed by thread id.
#[derive(Clone, Default)]
pub struct ConversationStore {
    threads: Arc<RwLock<HashMap<ThreadId, ConversationHandle>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> ThreadId {
        let thread_id = ThreadId::generate();
        self.get_or_create(&thread_id).await;
        thread_id
    }

    pub async fn get_or_create(&self, thread_id: &ThreadId) -> ConversationHandle {
        if let Some(existing) = self.threads.read().await.get(thread_id) {
            existing.touch();
            return existing.clone();
        }

        let mut threads = self.threads.write().await;
        threads
            .entry(thread_id.clone())
            .or_insert_with(|| {
                debug!(
                    event_name = "agent.store.thread_created",
                    thread_id = %thread_id,
                    "conversation thread created"
                );
                Arc::new(ConversationSlot::new(thread_id.clone()))
            })
            .clone()
    }

    pub async fn get(&self, thread_id: &ThreadId) -> Option<ConversationHandle> {
        self.threads.read().await.get(thread_id).cloned()
    }

    /// Returns whether the thread existed. A turn already holding the handle
    /// finishes against the detached state.
    pub async fn evict(&self, thread_id: &ThreadId) -> bool {
        let removed = self.threads.write().await.remove(thread_id).is_some();
        if removed {
            debug!(
                event_name = "agent.store.thread_evicted",
                thread_id = %thread_id,
                "conversation thread evicted"
            );
        }
        removed
    }

    /// Drops every thread idle for longer than `max_idle`. Threads with a turn
    /// in flight are never idle. Returns the evicted ids.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<ThreadId> {
        let now = Instant::now();
        let mut threads = self.threads.write().await;
        let stale = threads
            .iter()
            .filter(|(_, slot)| !slot.is_busy() && slot.idle_for(now) > max_idle)
            .map(|(thread_id, _)| thread_id.clone())
            .collect::<Vec<_>>();

        for thread_id in &stale {
            threads.remove(thread_id);
        }
        stale
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}
