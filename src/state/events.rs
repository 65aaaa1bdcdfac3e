//! Event bus for pushes received over the reverse channel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::protocol::body::DecodedBody;
use crate::protocol::plist::PlistValue;
use crate::types::PlaybackState;

/// A push received from the device on `POST /event`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    /// Declared `Content-Type` of the push
    pub content_type: Option<String>,
    /// Body exactly as received
    pub raw: Vec<u8>,
    /// Decoded body; [`DecodedBody::Raw`] when the type is not an XML plist
    pub payload: DecodedBody,
}

impl DeviceEvent {
    /// The `state` field of a decoded event, if it carries one
    #[must_use]
    pub fn state(&self) -> Option<PlaybackState> {
        self.payload
            .get("state")
            .and_then(PlistValue::as_str)
            .filter(|s| !s.is_empty())
            .map(PlaybackState::from)
    }

    /// The `category` field (`video`, `photo`, ...)
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.payload.get("category").and_then(PlistValue::as_str)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for every event
pub type EventHandler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Event bus for distributing device events
///
/// Handlers registered with [`subscribe`](Self::subscribe) run
/// synchronously, in registration order, on the task that received the
/// event. Async consumers can take a broadcast [`receiver`](Self::receiver)
/// instead.
pub struct EventBus {
    handlers: Mutex<Vec<(SubscriptionId, EventHandler)>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Create a new event bus
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register a handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Async receiver of every event emitted after this call
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Deliver an event to every handler, then to async receivers
    pub fn emit(&self, event: &DeviceEvent) {
        // Handlers may subscribe or unsubscribe from inside a callback
        let snapshot: Vec<EventHandler> = self.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in snapshot {
            handler(event);
        }

        // Ignore error if no receivers
        let _ = self.tx.send(event.clone());
    }

    /// Number of registered handlers
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriptionId, EventHandler)>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
