//! Core types module

mod config;
mod info;
mod state;


pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_PORT, DEFAULT_USER_AGENT};
pub use info::{PlaybackInfo, ScrubPosition, ServerInfo, TimeRange};
pub use state::PlaybackState;
