//! Subscription registry and event broadcast.
//!
//! [`Fanout`] owns the history buffer and the set of connected viewers behind
//! a single lock. Recording an event and broadcasting it happen under that
//! lock, and so does handing a new viewer its history snapshot, so every
//! viewer sees one global order with no gap or duplicate between its
//! snapshot and its first live event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use monitor_core::events::{LogEvent, LogKind};
use monitor_core::history::HistoryBuffer;

// ── Messages ──────────────────────────────────────────────────────────────────

/// A live notification pushed to connected viewers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum FanoutMessage {
    #[serde(rename = "log")]
    Log(LogEvent),
    /// The shared shell's working directory changed. Not kept in history.
    #[serde(rename = "path-update")]
    PathUpdate(String),
}

pub type SubscriberId = u64;

// ── Fanout ────────────────────────────────────────────────────────────────────

struct FanoutState {
    history: HistoryBuffer,
    subscribers: HashMap<SubscriberId, mpsc::UnboundedSender<FanoutMessage>>,
    next_id: SubscriberId,
}

impl FanoutState {
    /// Send to every subscriber, dropping the ones whose receiver is gone.
    fn broadcast(&mut self, message: &FanoutMessage) {
        self.subscribers.retain(|id, tx| {
            let delivered = tx.send(message.clone()).is_ok();
            if !delivered {
                debug!(subscriber = id, "pruning disconnected subscriber");
            }
            delivered
        });
    }
}

/// Process-wide history and viewer registry. Cheap to clone.
#[derive(Clone)]
pub struct Fanout {
    state: Arc<Mutex<FanoutState>>,
}

impl Fanout {
    pub fn new(history: HistoryBuffer) -> Self {
        Self {
            state: Arc::new(Mutex::new(FanoutState {
                history,
                subscribers: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FanoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a viewer and hand it the current history.
    ///
    /// The returned [`Subscription`] yields only events recorded after its
    /// snapshot was taken. Dropping it unregisters the viewer.
    pub fn connect(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();

        let id = state.next_id;
        state.next_id += 1;
        let snapshot = state.history.snapshot();
        state.subscribers.insert(id, tx);

        debug!(
            subscriber = id,
            history = snapshot.len(),
            viewers = state.subscribers.len(),
            "viewer connected"
        );

        Subscription {
            id,
            snapshot: Some(snapshot),
            rx,
            registry: Arc::downgrade(&self.state),
        }
    }

    /// Record an event and broadcast it as one step.
    ///
    /// Blank messages are dropped and yield `None`.
    pub fn publish(&self, kind: LogKind, message: &str) -> Option<LogEvent> {
        if message.trim().is_empty() {
            return None;
        }

        let mut state = self.lock();
        let event = state.history.append(kind, message);
        state.broadcast(&FanoutMessage::Log(event.clone()));
        Some(event)
    }

    /// Broadcast a working-directory change. Nothing is recorded.
    pub fn publish_path(&self, path: &str) {
        self.lock()
            .broadcast(&FanoutMessage::PathUpdate(path.to_string()));
    }

    /// Current history, oldest first.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.lock().history.snapshot()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// One connected viewer's view of the event stream.
pub struct Subscription {
    id: SubscriberId,
    snapshot: Option<Vec<LogEvent>>,
    rx: mpsc::UnboundedReceiver<FanoutMessage>,
    registry: Weak<Mutex<FanoutState>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// History as it stood at connect time. Returns it once; later calls
    /// return an empty list.
    pub fn take_snapshot(&mut self) -> Vec<LogEvent> {
        self.snapshot.take().unwrap_or_default()
    }

    /// Next live message. `None` once the fan-out itself is gone.
    pub async fn recv(&mut self) -> Option<FanoutMessage> {
        self.rx.recv().await
    }

    /// Next live message if one is already queued.
    pub fn try_recv(&mut self) -> Option<FanoutMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            state.subscribers.remove(&self.id);
            debug!(subscriber = self.id, "viewer disconnected");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
