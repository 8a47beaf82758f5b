//! Fan-out of published tracker snapshots.

use crate::state::TrackerSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::debug;
use uuid::Uuid;

/// Callback invoked with every published snapshot.
pub type ChangeListener = Arc<dyn Fn(&TrackerSnapshot) + Send + Sync>;

/// Publishes snapshots to watch receivers and registered callbacks.
pub struct StatePublisher {
    sender: watch::Sender<Arc<TrackerSnapshot>>,
    listeners: RwLock<HashMap<Uuid, ChangeListener>>,
}

impl StatePublisher {
    /// Creates a publisher holding `initial` as the current snapshot.
    #[must_use]
    pub fn new(initial: TrackerSnapshot) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the current snapshot and notifies everyone.
    pub async fn publish(&self, snapshot: TrackerSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.sender.send_replace(snapshot.clone());

        let listeners: Vec<ChangeListener> =
            self.listeners.read().await.values().cloned().collect();
        for listener in listeners {
            listener(&snapshot);
        }
        debug!(revision = snapshot.revision, "Published snapshot");
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<TrackerSnapshot> {
        self.sender.borrow().clone()
    }

    /// Receiver that observes every subsequent publication.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<TrackerSnapshot>> {
        self.sender.subscribe()
    }

    /// Registers a callback and returns its id.
    pub async fn on_change<F>(&self, listener: F) -> Uuid
    where
        F: Fn(&TrackerSnapshot) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.listeners.write().await.insert(id, Arc::new(listener));
        id
    }

    /// Removes a callback. Returns whether it was registered.
    pub async fn unsubscribe(&self, id: Uuid) -> bool {
        self.listeners.write().await.remove(&id).is_some()
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}
