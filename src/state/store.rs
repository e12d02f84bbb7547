/// Observable store for the current UI state
///
/// Holds the single current [`UiState`] and notifies subscribers of real changes.
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use super::ui_state::UiState;

/// Callback invoked with `(previous, next)` on every real change
pub type StateObserver = Arc<dyn Fn(UiState, UiState) + Send + Sync>;

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

/// A state change as delivered to channel subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub previous: UiState,
    pub next: UiState,
    pub at: Instant,
}

#[derive(Clone)]
enum Target {
    Callback(StateObserver),
    Channel(Sender<StateChange>),
}

struct Subscriber {
    id: SubscriberId,
    target: Target,
}

struct StoreInner {
    current: RwLock<UiState>,
    // Serializes transitions so notifications for two changes never interleave.
    transition_lock: Mutex<()>,
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicUsize,
    change_count: AtomicU64,
}

/// Owned UI state with a single mutation path
///
/// Clones share the same state and subscriber list. Observers run
/// synchronously on the thread that called [`StateStore::transition`], in
/// registration order. They may read [`StateStore::current`] but must not
/// call `transition` themselves.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl StateStore {
    /// Create a new store in the Neutral state
    pub fn new() -> Self {
        Self::with_initial(UiState::Neutral)
    }

    pub fn with_initial(initial: UiState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                current: RwLock::new(initial),
                transition_lock: Mutex::new(()),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicUsize::new(0),
                change_count: AtomicU64::new(0),
            }),
        }
    }

    /// Current UI state
    pub fn current(&self) -> UiState {
        *self.inner.current.read()
    }

    /// Apply a new state.
    ///
    /// Returns `false` without notifying anyone when `next` equals the current state.
    pub fn transition(&self, next: UiState) -> bool {
        let _guard = self.inner.transition_lock.lock();

        let previous = {
            let mut current = self.inner.current.write();
            if *current == next {
                return false;
            }
            std::mem::replace(&mut *current, next)
        };
        self.inner.change_count.fetch_add(1, Ordering::Relaxed);

        tracing::debug!("UI state: {} -> {}", previous, next);

        let change = StateChange {
            previous,
            next,
            at: Instant::now(),
        };

        // Snapshot so observers can subscribe/unsubscribe without deadlocking.
        let targets: Vec<(SubscriberId, Target)> = self
            .inner
            .subscribers
            .read()
            .iter()
            .map(|s| (s.id, s.target.clone()))
            .collect();

        let mut disconnected = Vec::new();
        for (id, target) in targets {
            match target {
                Target::Callback(observer) => observer(previous, next),
                Target::Channel(sender) => {
                    if sender.send(change).is_err() {
                        disconnected.push(id);
                    }
                }
            }
        }

        if !disconnected.is_empty() {
            tracing::debug!("Dropping {} disconnected subscriber(s)", disconnected.len());
            self.inner
                .subscribers
                .write()
                .retain(|s| !disconnected.contains(&s.id));
        }

        true
    }

    /// Register a callback observer
    pub fn subscribe<F>(&self, observer: F) -> SubscriberId
    where
        F: Fn(UiState, UiState) + Send + Sync + 'static,
    {
        self.push(Target::Callback(Arc::new(observer)))
    }

    /// Subscribe through a channel, for observers living on another thread
    pub fn subscribe_channel(&self) -> (Receiver<StateChange>, SubscriberId) {
        let (tx, rx) = unbounded();
        let id = self.push(Target::Channel(tx));
        (rx, id)
    }

    /// Remove a subscription. Unknown IDs are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.subscribers.write().retain(|s| s.id != id);
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Number of real changes applied since creation
    pub fn change_count(&self) -> u64 {
        self.inner.change_count.load(Ordering::Relaxed)
    }

    fn push(&self, target: Target) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push(Subscriber { id, target });
        id
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("current", &self.current())
            .field("subscribers", &self.subscriber_count())
            .field("changes", &self.change_count())
            .finish()
    }
}
