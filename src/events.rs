// Playback events and the subscriber registry
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Events delivered to playback subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A clip has begun (or resumed) producing sound
    Started,
    /// Playback was paused; the position is frozen until resume
    Paused,
    /// The transport has fully stopped and the clip was released
    Stopped,
    /// Periodic progress update while playing
    PositionChanged {
        position: Duration,
        duration: Duration,
    },
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Callback = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

/// Insertion-ordered list of event callbacks.
///
/// Notification iterates over a snapshot taken under a short lock, so
/// subscribing or unsubscribing (from another thread, or from inside a
/// callback) never deadlocks and never tears a notification pass.
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriberId, Callback)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback; it is invoked after all earlier subscribers
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback; returns false if the id was not subscribed
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Deliver an event to every subscriber in insertion order
    pub fn notify(&self, event: &PlaybackEvent) {
        let snapshot: Vec<Callback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}
