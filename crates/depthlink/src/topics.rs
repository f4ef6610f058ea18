// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic names, message identifiers and message keys.
//!
//! Every message is a JSON document with a mandatory `id`. Replies carry the
//! original request under `control` and the request's `[guid, sequence]`
//! under `sample`; for a reply, the logical identifier is `control.id`.

use crate::error::{Error, Result};
use serde_json::{Map, Value};

/// Notification topic, relative to the device topic root
pub const NOTIFICATION_TOPIC_NAME: &str = "/notification";
/// Control topic, relative to the device topic root
pub const CONTROL_TOPIC_NAME: &str = "/control";
/// Metadata topic, relative to the device topic root
pub const METADATA_TOPIC_NAME: &str = "/metadata";

/// Logical identifier key, present in every message
pub const ID: &str = "id";

/// Unsolicited notifications published by the device.
pub mod notification {
    pub mod device_header {
        pub const ID: &str = "device-header";
        pub const N_STREAMS: &str = "n-streams";
        pub const EXTRINSICS: &str = "extrinsics";
    }

    pub mod device_options {
        pub const ID: &str = "device-options";
        pub const OPTIONS: &str = "options";
    }

    pub mod stream_header {
        pub const ID: &str = "stream-header";
        pub const TYPE: &str = "type";
        pub const NAME: &str = "name";
        pub const SENSOR_NAME: &str = "sensor-name";
        pub const PROFILES: &str = "profiles";
        pub const DEFAULT_PROFILE_INDEX: &str = "default-profile-index";
        pub const METADATA_ENABLED: &str = "metadata-enabled";
    }

    pub mod stream_options {
        pub const ID: &str = "stream-options";
        pub const STREAM_NAME: &str = "stream-name";
        pub const OPTIONS: &str = "options";
        pub const EMBEDDED_FILTERS: &str = "embedded-filters";
        pub const INTRINSICS: &str = "intrinsics";
    }

    pub mod log {
        pub const ID: &str = "log";
        pub const ENTRIES: &str = "entries";
    }

    pub mod calibration_changed {
        pub const ID: &str = "calibration-changed";
        pub const INTRINSICS: &str = "intrinsics";
    }
}

/// Control requests sent by the session.
pub mod control {
    pub mod open_streams {
        pub const ID: &str = "open-streams";
        pub const RESET: &str = "reset";
        pub const STREAM_PROFILES: &str = "stream-profiles";
    }

    pub mod set_option {
        pub const ID: &str = "set-option";
        pub const OPTION_NAME: &str = "option-name";
        pub const STREAM_NAME: &str = "stream-name";
        pub const VALUE: &str = "value";
    }

    pub mod query_option {
        pub const ID: &str = "query-option";
        pub const OPTION_NAME: &str = "option-name";
        pub const STREAM_NAME: &str = "stream-name";
    }

    pub mod query_options {
        pub const ID: &str = "query-options";
    }

    pub mod set_filter {
        pub const ID: &str = "set-filter";
        pub const NAME: &str = "name";
        pub const STREAM_NAME: &str = "stream-name";
        pub const OPTIONS: &str = "options";
    }

    pub mod query_filter {
        pub const ID: &str = "query-filter";
        pub const NAME: &str = "name";
        pub const STREAM_NAME: &str = "stream-name";
    }
}

/// Reply keys, common to all replies, plus per-reply payload keys.
pub mod reply {
    pub const CONTROL: &str = "control";
    pub const SAMPLE: &str = "sample";
    pub const STATUS: &str = "status";
    pub const EXPLANATION: &str = "explanation";
    pub const STATUS_OK: &str = "ok";

    pub mod set_option {
        pub const VALUE: &str = "value";
    }

    pub mod query_option {
        pub const VALUE: &str = "value";
    }

    pub mod query_options {
        pub const OPTION_VALUES: &str = "option-values";
    }

    pub mod set_filter {
        pub const NAME: &str = "name";
        pub const OPTIONS: &str = "options";
    }

    pub mod query_filter {
        pub const NAME: &str = "name";
        pub const STREAM_NAME: &str = "stream-name";
        pub const OPTIONS: &str = "options";
    }
}

/// Check a reply's status.
///
/// A missing status means success. Any status other than `"ok"` yields
/// [`Error::DeviceReported`] carrying the explanation verbatim.
pub fn check_reply(response: &Value) -> Result<()> {
    let Some(status) = response.get(reply::STATUS) else {
        return Ok(());
    };
    let status = status
        .as_str()
        .ok_or_else(|| Error::malformed(format!("reply status is not a string: {}", status)))?;
    if status == reply::STATUS_OK {
        return Ok(());
    }
    match response.get(reply::EXPLANATION).and_then(Value::as_str) {
        Some(explanation) if !explanation.is_empty() => {
            Err(Error::DeviceReported(explanation.to_string()))
        }
        _ => Err(Error::DeviceReported(format!("failed ({})", status))),
    }
}

// ============================================================================
// Field access helpers (missing or mistyped fields are malformed messages)
// ============================================================================

pub(crate) fn field<'a>(j: &'a Value, key: &str) -> Result<&'a Value> {
    j.get(key)
        .ok_or_else(|| Error::malformed(format!("missing '{}'", key)))
}

pub(crate) fn str_field<'a>(j: &'a Value, key: &str) -> Result<&'a str> {
    field(j, key)?
        .as_str()
        .ok_or_else(|| Error::malformed(format!("'{}' is not a string", key)))
}

pub(crate) fn u64_field(j: &Value, key: &str) -> Result<u64> {
    field(j, key)?
        .as_u64()
        .ok_or_else(|| Error::malformed(format!("'{}' is not an unsigned integer", key)))
}

pub(crate) fn bool_field(j: &Value, key: &str) -> Result<bool> {
    field(j, key)?
        .as_bool()
        .ok_or_else(|| Error::malformed(format!("'{}' is not a boolean", key)))
}

pub(crate) fn object_field<'a>(j: &'a Value, key: &str) -> Result<&'a Map<String, Value>> {
    field(j, key)?
        .as_object()
        .ok_or_else(|| Error::malformed(format!("'{}' is not an object", key)))
}

/// Optional string field; empty strings read as absent
pub(crate) fn opt_str<'a>(j: &'a Value, key: &str) -> Option<&'a str> {
    j.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub(crate) fn as_f32(v: &Value, what: &str) -> Result<f32> {
    v.as_f64()
        .map(|f| f as f32)
        .ok_or_else(|| Error::malformed(format!("{} is not a number: {}", what, v)))
}

pub(crate) fn f32_array<const N: usize>(v: &Value, what: &str) -> Result<[f32; N]> {
    let arr = v
        .as_array()
        .filter(|a| a.len() == N)
        .ok_or_else(|| Error::malformed(format!("{} must be an array of {}: {}", what, N, v)))?;
    let mut out = [0f32; N];
    for (slot, x) in out.iter_mut().zip(arr) {
        *slot = as_f32(x, what)?;
    }
    Ok(out)
}
