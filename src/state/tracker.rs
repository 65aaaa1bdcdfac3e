use tokio::sync::watch;
use tracing::debug;

use super::DeviceEvent;
use crate::types::PlaybackState;

/// Last playback state reported by the device
pub struct StateTracker {
    tx: watch::Sender<PlaybackState>,
}

impl StateTracker {
    /// Create a tracker in the [`PlaybackState::UNKNOWN`] state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PlaybackState::UNKNOWN);
        Self { tx }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PlaybackState> {
        self.tx.subscribe()
    }

    /// Fold an event into the state
    ///
    /// Returns `true` when the event reports `stopped` and the client must
    /// be torn down. Events without a `state` field leave it untouched.
    pub fn apply(&self, event: &DeviceEvent) -> bool {
        let Some(state) = event.state() else {
            return false;
        };

        let stopped = state.is_stopped();
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Playback state {} -> {}", current, state);
            *current = state;
            true
        });
        stopped
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
