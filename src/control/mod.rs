//! Playback control commands

pub mod commands;


pub use commands::{Command, validate_property_name};
