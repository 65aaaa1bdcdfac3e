//! Device events and playback state

mod events;
mod tracker;

pub use events::{DeviceEvent, EventBus, EventHandler, SubscriptionId};
pub use tracker::StateTracker;
