// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cached device model: streams, options, filters and calibration.

pub mod extrinsics;
pub mod filter;
pub mod intrinsics;
pub mod option;
pub mod profile;
pub mod stream;

pub use extrinsics::Extrinsics;
pub use filter::EmbeddedFilter;
pub use intrinsics::{MotionIntrinsics, StreamIntrinsics, VideoIntrinsics};
pub use option::{DeviceOption, Owner};
pub use profile::{MotionProfile, OpenProfile, StreamProfile, VideoProfile};
pub use stream::{Stream, StreamKind};

use serde::{Deserialize, Serialize};

/// Identification of a remote device, as advertised on discovery.
///
/// ```json
/// { "name": "Depth Camera 455", "topic-root": "realsense/D455_0123", "serial": "0123" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceInfo {
    pub name: String,
    /// Prefix of every topic this device publishes or listens on
    pub topic_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, topic_root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic_root: topic_root.into(),
            serial: None,
        }
    }

    /// Builder: set serial number
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Short name for log lines: the serial number when known
    pub fn debug_name(&self) -> &str {
        self.serial.as_deref().unwrap_or(&self.name)
    }

    /// Full topic name for a topic relative to the root (e.g. `/control`)
    pub fn topic(&self, relative: &str) -> String {
        format!("{}{}", self.topic_root, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_info() {
        let info: DeviceInfo = serde_json::from_value(json!({
            "name": "Depth Camera 455",
            "topic-root": "realsense/D455_0123",
            "serial": "0123"
        }))
        .unwrap();
        assert_eq!(info.debug_name(), "0123");
        assert_eq!(info.topic("/control"), "realsense/D455_0123/control");

        let info = DeviceInfo::new("Cam", "root");
        assert_eq!(info.debug_name(), "Cam");
    }
}
