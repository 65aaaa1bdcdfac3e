//! Connection statistics

use std::time::Instant;

/// Traffic counters for one client
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Control requests written
    pub requests_sent: u64,
    /// Bytes written on the control connection
    pub bytes_sent: u64,
    /// Bytes read on the control connection
    pub bytes_received: u64,
    /// Control sockets opened, including reconnects after the device hung up
    pub connects: u64,
    /// When the current control socket was opened
    pub connected_at: Option<Instant>,
}

impl ConnectionStats {
    /// Record a request write
    pub fn record_sent(&mut self, bytes: usize) {
        self.requests_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Record received bytes
    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    /// Record a fresh socket
    pub fn record_connect(&mut self) {
        self.connects += 1;
        self.connected_at = Some(Instant::now());
    }

    /// Age of the current control socket
    #[must_use]
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.connected_at.map(|t| t.elapsed())
    }
}
