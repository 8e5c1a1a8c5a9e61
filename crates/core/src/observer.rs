use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ledger_feed_protocol::LaneId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedEvent {
    /// Something on the lane changed; re-read its state.
    LaneChanged(LaneId),
    /// The visible tab changed.
    TabSelected(LaneId),
    LaneAdded(LaneId),
    LaneRemoved(LaneId),
}

impl FeedEvent {
    pub fn lane(&self) -> &LaneId {
        match self {
            FeedEvent::LaneChanged(id)
            | FeedEvent::TabSelected(id)
            | FeedEvent::LaneAdded(id)
            | FeedEvent::LaneRemoved(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

/// Subscriber list.
///
/// Callbacks are invoked on a copy of the list, outside the lock, so a
/// callback may subscribe, unsubscribe or read controller state freely.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, event: &FeedEvent) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}
