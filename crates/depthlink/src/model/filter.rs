// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Embedded (on-device) processing filters.
//!
//! A filter is always stream-scoped and exposes named parameters shaped like
//! options. Parameter updates arrive as an object of `name -> value` and are
//! applied all-or-nothing.
//!
//! ```json
//! {
//!   "name": "Decimation Filter",
//!   "stream-name": "Depth",
//!   "options": [
//!     ["Toggle", 0, 0, 1, 1, 0, "Enable filter", ["int"]],
//!     ["Magnitude", 2, 1, 8, 1, 2, "Pixel grouping", ["int", "read-only"]]
//!   ]
//! }
//! ```

use super::option::{find_option, find_option_mut, DeviceOption, Owner};
use crate::error::{Error, Result};
use serde_json::{json, Map, Value};

/// Parameter enabling/disabling a filter; only 0 and 1 are valid
pub const TOGGLE_PARAM: &str = "Toggle";

const KEY_NAME: &str = "name";
const KEY_STREAM_NAME: &str = "stream-name";
const KEY_OPTIONS: &str = "options";

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedFilter {
    name: String,
    stream_name: String,
    params: Vec<DeviceOption>,
}

impl EmbeddedFilter {
    /// Parse a filter descriptor belonging to `stream_name`
    pub fn from_json(j: &Value, stream_name: &str) -> Result<Self> {
        let name = j
            .get(KEY_NAME)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::malformed(format!("embedded filter name missing: {}", j)))?
            .to_string();
        if let Some(declared) = j.get(KEY_STREAM_NAME).and_then(Value::as_str) {
            if declared != stream_name {
                return Err(Error::malformed(format!(
                    "embedded filter '{}' declares stream '{}' inside stream '{}'",
                    name, declared, stream_name
                )));
            }
        }

        let owner = Owner::Filter {
            stream: stream_name.to_string(),
            filter: name.clone(),
        };
        let mut params: Vec<DeviceOption> = Vec::new();
        if let Some(options_j) = j.get(KEY_OPTIONS) {
            let options_j = options_j.as_array().ok_or_else(|| {
                Error::malformed(format!("embedded filter '{}' options are not an array", name))
            })?;
            for option_j in options_j {
                let param = DeviceOption::from_json(option_j, owner.clone())?;
                if find_option(&params, param.name()).is_some() {
                    return Err(Error::malformed(format!(
                        "embedded filter '{}' parameter '{}' declared twice",
                        name,
                        param.name()
                    )));
                }
                params.push(param);
            }
        }

        Ok(Self {
            name,
            stream_name: stream_name.to_string(),
            params,
        })
    }

    /// Descriptor form, as accepted by [`EmbeddedFilter::from_json`]
    pub fn to_json(&self) -> Value {
        json!({
            KEY_NAME: self.name,
            KEY_STREAM_NAME: self.stream_name,
            KEY_OPTIONS: self.params.iter().map(DeviceOption::to_json).collect::<Vec<_>>(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn params(&self) -> &[DeviceOption] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&DeviceOption> {
        find_option(&self.params, name)
    }

    /// Current parameter values as `name -> value`
    pub fn param_values(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    /// Check a caller-supplied parameter set without committing it
    pub fn check_params(&self, params: &Map<String, Value>) -> Result<()> {
        if params.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "no parameters given for filter '{}'",
                self.name
            )));
        }
        for (name, value) in params {
            let param = self.param(name).ok_or_else(|| {
                Error::not_found(format!("parameter '{}' of filter '{}'", name, self.name))
            })?;
            if param.is_read_only() {
                return Err(Error::InvalidArgument(format!(
                    "parameter '{}' of filter '{}' is read-only",
                    name, self.name
                )));
            }
            param.check_value(value)?;
            check_toggle(name, value)?;
        }
        Ok(())
    }

    /// Commit a parameter set reported by the device
    ///
    /// Every parameter is validated before any is changed.
    pub fn set_params(&mut self, params: &Value) -> Result<()> {
        let params = params.as_object().ok_or_else(|| {
            Error::malformed(format!("filter '{}' parameters are not an object", self.name))
        })?;
        for (name, value) in params {
            let param = self.param(name).ok_or_else(|| {
                Error::not_found(format!("parameter '{}' of filter '{}'", name, self.name))
            })?;
            // Validation only: a scratch copy keeps the cache untouched on failure
            param.clone().set_value(value.clone())?;
            check_toggle(name, value).map_err(|e| Error::malformed(e.to_string()))?;
        }
        for (name, value) in params {
            if let Some(param) = find_option_mut(&mut self.params, name) {
                param.set_value(value.clone())?;
            }
        }
        Ok(())
    }
}

fn check_toggle(name: &str, value: &Value) -> Result<()> {
    if name == TOGGLE_PARAM && !matches!(value.as_i64(), Some(0 | 1)) {
        return Err(Error::InvalidArgument(format!(
            "{} must be 0 (off) or 1 (on), got {}",
            TOGGLE_PARAM, value
        )));
    }
    Ok(())
}

/// Find a filter by name
pub fn find_filter<'a>(filters: &'a [EmbeddedFilter], name: &str) -> Option<&'a EmbeddedFilter> {
    filters.iter().find(|f| f.name() == name)
}

/// Find a filter by name, mutably
pub fn find_filter_mut<'a>(
    filters: &'a mut [EmbeddedFilter],
    name: &str,
) -> Option<&'a mut EmbeddedFilter> {
    filters.iter_mut().find(|f| f.name() == name)
}
