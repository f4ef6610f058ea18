// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream profiles.
//!
//! Video: `[frequency, "encoding", width, height]`; motion: `[frequency]`.

use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoProfile {
    pub frequency: u32,
    pub encoding: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionProfile {
    pub frequency: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamProfile {
    Video(VideoProfile),
    Motion(MotionProfile),
}

fn u32_at(arr: &[Value], idx: usize, what: &str) -> Result<u32> {
    arr.get(idx)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::malformed(format!("profile {} invalid: {:?}", what, arr.get(idx))))
}

impl StreamProfile {
    /// Parse a video profile
    pub fn video_from_json(j: &Value) -> Result<Self> {
        let arr = j
            .as_array()
            .filter(|a| a.len() == 4)
            .ok_or_else(|| Error::malformed(format!("video profile must be a 4-array: {}", j)))?;
        let encoding = arr[1]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::malformed(format!("video profile encoding invalid: {}", j)))?;
        Ok(Self::Video(VideoProfile {
            frequency: u32_at(arr, 0, "frequency")?,
            encoding: encoding.to_string(),
            width: u32_at(arr, 2, "width")?,
            height: u32_at(arr, 3, "height")?,
        }))
    }

    /// Parse a motion profile
    pub fn motion_from_json(j: &Value) -> Result<Self> {
        let arr = j
            .as_array()
            .filter(|a| a.len() == 1)
            .ok_or_else(|| Error::malformed(format!("motion profile must be a 1-array: {}", j)))?;
        Ok(Self::Motion(MotionProfile {
            frequency: u32_at(arr, 0, "frequency")?,
        }))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Video(v) => json!([v.frequency, v.encoding, v.width, v.height]),
            Self::Motion(m) => json!([m.frequency]),
        }
    }

    pub fn frequency(&self) -> u32 {
        match self {
            Self::Video(v) => v.frequency,
            Self::Motion(m) => m.frequency,
        }
    }
}

impl fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video(v) => write!(
                f,
                "{} {}x{} @ {} Hz",
                v.encoding, v.width, v.height, v.frequency
            ),
            Self::Motion(m) => write!(f, "motion @ {} Hz", m.frequency),
        }
    }
}

/// A profile of a named stream, as opened or closed on the device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenProfile {
    pub stream: String,
    pub profile: StreamProfile,
}

impl OpenProfile {
    pub fn new(stream: impl Into<String>, profile: StreamProfile) -> Self {
        Self {
            stream: stream.into(),
            profile,
        }
    }
}

impl fmt::Display for OpenProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.stream, self.profile)
    }
}
