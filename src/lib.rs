//! # airplay-video
//!
//! A pure Rust client for the `AirPlay` video protocol: tell a receiver on
//! the local network to play a media URL, then seek, change rate, stop and
//! read or write its properties.
//!
//! ## Features
//!
//! - Playback control over a single persistent HTTP connection
//! - Property-list and `text/parameters` bodies encoded and decoded by
//!   content type
//! - Reverse event channel for device-initiated state reports
//! - Mock receiver for testing without hardware
//!
//! ## Example
//!
//! ```rust,no_run
//! use airplay_video::{AirPlayClient, PlaybackState};
//!
//! # async fn example() -> Result<(), airplay_video::AirPlayError> {
//! let client = AirPlayClient::new("192.168.1.20");
//!
//! client.play("http://example.com/movie.mp4", None).await?;
//! client.scrub(Some(120.0)).await?;
//!
//! let mut state = client.watch_state();
//! state.wait_for(|s| *s == PlaybackState::PAUSED).await.ok();
//!
//! client.stop().await?;
//! client.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Client**: [`AirPlayClient`] maps each control call to one request
//! - **Connection**: the control socket and the reverse event channel
//! - **Protocol**: sans-IO HTTP framing, plist codecs and body encoding

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
/// Error types
pub mod error;
/// Device events and playback state
pub mod state;
/// Core types
pub mod types;

/// Testing utilities
pub mod testing;

// Internal modules
mod client;
pub mod connection;
pub mod control;
pub mod protocol;

// Re-exports
pub use client::AirPlayClient;
pub use connection::{ConnectionStats, Reply};
pub use control::Command;
pub use error::{AirPlayError, Result};
pub use protocol::body::{DecodedBody, RequestBody};
pub use protocol::plist::PlistValue;
pub use state::{DeviceEvent, SubscriptionId};
pub use types::{
    ClientConfig, ClientConfigBuilder, PlaybackInfo, PlaybackState, ScrubPosition, ServerInfo,
    TimeRange,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
///
/// Convenient re-exports
pub mod prelude {
    pub use crate::{
        AirPlayClient, AirPlayError, ClientConfig, DecodedBody, DeviceEvent, PlaybackInfo,
        PlaybackState, PlistValue, Reply, RequestBody, plist_dict,
    };
}
