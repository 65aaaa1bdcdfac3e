//! Testing utilities
//!
//! [`MockDevice`](mock_device::MockDevice) stands in for a receiver on
//! loopback so the client can be exercised end to end without hardware.

pub mod mock_device;

pub use mock_device::{CannedReply, MockDevice, MockDeviceConfig, RecordedRequest};
