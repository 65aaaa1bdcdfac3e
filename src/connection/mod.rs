//! Connection management
//!
//! Two sockets per device: the persistent control connection every command
//! goes through, and the reversed event connection the device pushes on.

mod manager;
mod reverse;
mod stats;

pub use manager::{ConnectionManager, Reply};
pub use reverse::ReverseChannel;
pub use stats::ConnectionStats;

#[cfg(test)]
mod tests;
