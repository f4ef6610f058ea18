// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streams: one sensor-data channel of a device.

use super::filter::{find_filter, find_filter_mut, EmbeddedFilter};
use super::intrinsics::StreamIntrinsics;
use super::option::{find_option, DeviceOption};
use super::profile::StreamProfile;
use crate::error::{Error, Result};
use crate::topics::notification::stream_header as header;
use crate::topics::{bool_field, field, str_field, u64_field};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declared stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Depth,
    Ir,
    Color,
    Confidence,
    Motion,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::Ir => "ir",
            Self::Color => "color",
            Self::Confidence => "confidence",
            Self::Motion => "motion",
        }
    }

    /// Video streams carry video profiles and lens intrinsics
    pub fn is_video(&self) -> bool {
        !matches!(self, Self::Motion)
    }
}

impl FromStr for StreamKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "depth" => Ok(Self::Depth),
            "ir" => Ok(Self::Ir),
            "color" => Ok(Self::Color),
            "confidence" => Ok(Self::Confidence),
            "motion" => Ok(Self::Motion),
            other => Err(Error::malformed(format!("unknown stream type '{}'", other))),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    name: String,
    sensor_name: String,
    kind: StreamKind,
    profiles: Vec<StreamProfile>,
    default_profile_index: usize,
    options: Vec<DeviceOption>,
    filters: Vec<EmbeddedFilter>,
    intrinsics: Option<StreamIntrinsics>,
    metadata_enabled: bool,
}

impl Stream {
    /// Build a stream from its `stream-header` fragment.
    ///
    /// Fails on an unknown type, a malformed profile or a default profile
    /// index outside the profile list.
    pub fn from_header(j: &Value) -> Result<Self> {
        let name = str_field(j, header::NAME)?;
        if name.is_empty() {
            return Err(Error::malformed("stream name is empty"));
        }
        let kind: StreamKind = str_field(j, header::TYPE)?.parse()?;
        let sensor_name = str_field(j, header::SENSOR_NAME)?.to_string();

        let profiles_j = field(j, header::PROFILES)?
            .as_array()
            .ok_or_else(|| Error::malformed(format!("stream '{}' profiles are not an array", name)))?;
        let profiles = profiles_j
            .iter()
            .map(|p| {
                if kind.is_video() {
                    StreamProfile::video_from_json(p)
                } else {
                    StreamProfile::motion_from_json(p)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let default_profile_index = u64_field(j, header::DEFAULT_PROFILE_INDEX)? as usize;
        if default_profile_index >= profiles.len() {
            return Err(Error::malformed(format!(
                "stream '{}' default profile index {} is out of bounds",
                name, default_profile_index
            )));
        }

        Ok(Self {
            name: name.to_string(),
            sensor_name,
            kind,
            profiles,
            default_profile_index,
            options: Vec::new(),
            filters: Vec::new(),
            intrinsics: None,
            metadata_enabled: bool_field(j, header::METADATA_ENABLED)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn profiles(&self) -> &[StreamProfile] {
        &self.profiles
    }

    pub fn default_profile(&self) -> &StreamProfile {
        &self.profiles[self.default_profile_index]
    }

    pub fn default_profile_index(&self) -> usize {
        self.default_profile_index
    }

    pub fn has_profile(&self, profile: &StreamProfile) -> bool {
        self.profiles.contains(profile)
    }

    pub fn metadata_enabled(&self) -> bool {
        self.metadata_enabled
    }

    pub fn options(&self) -> &[DeviceOption] {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&DeviceOption> {
        find_option(&self.options, name)
    }

    pub(crate) fn options_mut(&mut self) -> &mut [DeviceOption] {
        &mut self.options
    }

    pub fn filters(&self) -> &[EmbeddedFilter] {
        &self.filters
    }

    pub fn filter(&self, name: &str) -> Option<&EmbeddedFilter> {
        find_filter(&self.filters, name)
    }

    pub(crate) fn filter_mut(&mut self, name: &str) -> Option<&mut EmbeddedFilter> {
        find_filter_mut(&mut self.filters, name)
    }

    pub fn intrinsics(&self) -> Option<&StreamIntrinsics> {
        self.intrinsics.as_ref()
    }

    pub(crate) fn init_options(&mut self, options: Vec<DeviceOption>) {
        self.options = options;
    }

    pub(crate) fn init_filters(&mut self, filters: Vec<EmbeddedFilter>) {
        self.filters = filters;
    }

    /// Parse and cache intrinsics according to the stream type
    pub(crate) fn init_intrinsics(&mut self, j: &Value) -> Result<()> {
        let intrinsics = if self.kind.is_video() {
            StreamIntrinsics::video_from_json(j)?
        } else {
            StreamIntrinsics::motion_from_json(j)?
        };
        self.intrinsics = Some(intrinsics);
        Ok(())
    }

    pub(crate) fn set_intrinsics(&mut self, intrinsics: StreamIntrinsics) {
        self.intrinsics = Some(intrinsics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn depth_header() -> Value {
        json!({
            "id": "stream-header",
            "type": "depth",
            "name": "Depth",
            "sensor-name": "Stereo Module",
            "profiles": [[30, "Z16", 1280, 720], [15, "Z16", 640, 480]],
            "default-profile-index": 1,
            "metadata-enabled": true
        })
    }

    #[test]
    fn test_from_header() {
        let stream = Stream::from_header(&depth_header()).unwrap();
        assert_eq!(stream.name(), "Depth");
        assert_eq!(stream.sensor_name(), "Stereo Module");
        assert_eq!(stream.kind(), StreamKind::Depth);
        assert_eq!(stream.profiles().len(), 2);
        assert_eq!(stream.default_profile().frequency(), 15);
        assert!(stream.metadata_enabled());
        assert!(stream.intrinsics().is_none());
    }

    #[test]
    fn test_default_profile_index_out_of_range() {
        let mut j = depth_header();
        j["default-profile-index"] = json!(2);
        assert!(matches!(Stream::from_header(&j), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_unknown_type() {
        let mut j = depth_header();
        j["type"] = json!("thermal");
        assert!(Stream::from_header(&j).is_err());
    }

    #[test]
    fn test_motion_stream() {
        let j = json!({
            "type": "motion",
            "name": "Motion",
            "sensor-name": "Motion Module",
            "profiles": [[100], [200]],
            "default-profile-index": 0,
            "metadata-enabled": false
        });
        let mut stream = Stream::from_header(&j).unwrap();
        assert!(!stream.kind().is_video());

        let m = json!({ "data": [[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0]] });
        stream
            .init_intrinsics(&json!({ "accel": m, "gyro": m }))
            .unwrap();
        assert!(matches!(
            stream.intrinsics(),
            Some(StreamIntrinsics::Motion { .. })
        ));
        // Video intrinsics on a motion stream are rejected
        assert!(stream
            .init_intrinsics(&json!({ "width": 1, "height": 1, "principal-point": [0, 0], "focal-length": [1, 1] }))
            .is_err());
    }
}
