// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device, stream and filter options.
//!
//! # Descriptor Format
//!
//! ```text
//! [name, value, default, description, properties?]
//! [name, value, min, max, step, default, description, properties?]
//! ```
//!
//! `properties` is an array of strings; `"read-only"` and `"optional"` are
//! understood, anything else is kept for callers.

use crate::error::{Error, Result};
use serde_json::{json, Value};

pub const PROPERTY_READ_ONLY: &str = "read-only";
pub const PROPERTY_OPTIONAL: &str = "optional";

/// Owner of an option
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Device-level option
    Device,
    /// Option scoped to a stream
    Stream(String),
    /// Parameter of an embedded filter on a stream
    Filter { stream: String, filter: String },
}

impl Owner {
    /// Stream this option belongs to, if any
    pub fn stream_name(&self) -> Option<&str> {
        match self {
            Self::Device => None,
            Self::Stream(stream) | Self::Filter { stream, .. } => Some(stream),
        }
    }
}

/// A named, typed value cached from the device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceOption {
    name: String,
    value: Value,
    minimum: Option<Value>,
    maximum: Option<Value>,
    step: Option<Value>,
    default_value: Value,
    description: String,
    properties: Vec<String>,
    owner: Owner,
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DeviceOption {
    /// Parse an option descriptor
    pub fn from_json(j: &Value, owner: Owner) -> Result<Self> {
        let arr = j
            .as_array()
            .ok_or_else(|| Error::malformed(format!("option is not an array: {}", j)))?;
        let name = arr
            .first()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::malformed(format!("option name missing: {}", j)))?
            .to_string();

        let (mut option, consumed) = match arr.len() {
            4 | 5 => (
                Self {
                    name,
                    value: arr[1].clone(),
                    minimum: None,
                    maximum: None,
                    step: None,
                    default_value: arr[2].clone(),
                    description: String::new(),
                    properties: Vec::new(),
                    owner,
                },
                3,
            ),
            7 | 8 => {
                for (idx, what) in [(2, "minimum"), (3, "maximum"), (4, "step")] {
                    if !arr[idx].is_number() {
                        return Err(Error::malformed(format!(
                            "option '{}' {} is not a number",
                            name, what
                        )));
                    }
                }
                (
                    Self {
                        name,
                        value: arr[1].clone(),
                        minimum: Some(arr[2].clone()),
                        maximum: Some(arr[3].clone()),
                        step: Some(arr[4].clone()),
                        default_value: arr[5].clone(),
                        description: String::new(),
                        properties: Vec::new(),
                        owner,
                    },
                    6,
                )
            }
            n => {
                return Err(Error::malformed(format!(
                    "option '{}' has unexpected length {}",
                    name, n
                )))
            }
        };

        option.description = arr[consumed]
            .as_str()
            .ok_or_else(|| {
                Error::malformed(format!("option '{}' description is not a string", option.name))
            })?
            .to_string();
        if let Some(props) = arr.get(consumed + 1) {
            let props = props.as_array().ok_or_else(|| {
                Error::malformed(format!("option '{}' properties are not an array", option.name))
            })?;
            for prop in props {
                let prop = prop.as_str().ok_or_else(|| {
                    Error::malformed(format!("option '{}' property is not a string", option.name))
                })?;
                option.properties.push(prop.to_string());
            }
        }

        if let (Some(min), Some(max)) = (option.min_f64(), option.max_f64()) {
            if min > max {
                return Err(Error::malformed(format!(
                    "option '{}' minimum {} above maximum {}",
                    option.name, min, max
                )));
            }
        }
        let initial = option.value.clone();
        option
            .validate(&initial)
            .map_err(|reason| Error::malformed(format!("option '{}': {}", option.name, reason)))?;
        Ok(option)
    }

    /// Descriptor form, as accepted by [`DeviceOption::from_json`]
    pub fn to_json(&self) -> Value {
        let mut arr = vec![json!(self.name), self.value.clone()];
        if let (Some(min), Some(max), Some(step)) = (&self.minimum, &self.maximum, &self.step) {
            arr.extend([min.clone(), max.clone(), step.clone()]);
        }
        arr.push(self.default_value.clone());
        arr.push(json!(self.description));
        if !self.properties.is_empty() {
            arr.push(json!(self.properties));
        }
        Value::Array(arr)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current cached value
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn minimum(&self) -> Option<&Value> {
        self.minimum.as_ref()
    }

    pub fn maximum(&self) -> Option<&Value> {
        self.maximum.as_ref()
    }

    pub fn step(&self) -> Option<&Value> {
        self.step.as_ref()
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn is_read_only(&self) -> bool {
        self.properties.iter().any(|p| p == PROPERTY_READ_ONLY)
    }

    /// Null is an acceptable value
    pub fn is_optional(&self) -> bool {
        self.properties.iter().any(|p| p == PROPERTY_OPTIONAL)
    }

    fn min_f64(&self) -> Option<f64> {
        self.minimum.as_ref().and_then(Value::as_f64)
    }

    fn max_f64(&self) -> Option<f64> {
        self.maximum.as_ref().and_then(Value::as_f64)
    }

    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        if value.is_null() {
            return if self.is_optional() {
                Ok(())
            } else {
                Err("value cannot be null".to_string())
            };
        }

        // The default is the most stable type reference; fall back to the current value
        let reference = if self.default_value.is_null() {
            &self.value
        } else {
            &self.default_value
        };
        if !reference.is_null() && kind_of(reference) != kind_of(value) {
            return Err(format!(
                "expected a {} value, got {}",
                kind_of(reference),
                value
            ));
        }

        if let Some(v) = value.as_f64() {
            if let Some(min) = self.min_f64() {
                if v < min {
                    return Err(format!("value {} is below minimum {}", v, min));
                }
            }
            if let Some(max) = self.max_f64() {
                if v > max {
                    return Err(format!("value {} is above maximum {}", v, max));
                }
            }
        }
        Ok(())
    }

    /// Check a value a caller wants to set
    pub fn check_value(&self, value: &Value) -> Result<()> {
        self.validate(value)
            .map_err(|reason| Error::InvalidArgument(format!("option '{}': {}", self.name, reason)))
    }

    /// Commit a value reported by the device
    ///
    /// The value still goes through validation; an invalid one leaves the
    /// cached value untouched.
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        self.validate(&value)
            .map_err(|reason| Error::malformed(format!("option '{}': {}", self.name, reason)))?;
        self.value = value;
        Ok(())
    }
}

/// Find an option by name
pub fn find_option<'a>(options: &'a [DeviceOption], name: &str) -> Option<&'a DeviceOption> {
    options.iter().find(|o| o.name() == name)
}

/// Find an option by name, mutably
pub fn find_option_mut<'a>(
    options: &'a mut [DeviceOption],
    name: &str,
) -> Option<&'a mut DeviceOption> {
    options.iter_mut().find(|o| o.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exposure() -> DeviceOption {
        DeviceOption::from_json(
            &json!(["Exposure", 33000, 1, 165000, 1, 33000, "Depth exposure (usec)"]),
            Owner::Stream("Depth".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_range_option() {
        let opt = exposure();
        assert_eq!(opt.name(), "Exposure");
        assert_eq!(opt.value(), &json!(33000));
        assert_eq!(opt.minimum(), Some(&json!(1)));
        assert_eq!(opt.maximum(), Some(&json!(165000)));
        assert_eq!(opt.owner().stream_name(), Some("Depth"));
        assert!(!opt.is_read_only());
    }

    #[test]
    fn test_parse_simple_option_with_properties() {
        let opt = DeviceOption::from_json(
            &json!(["IP Address", "1.2.3.4", null, "IP", ["optional", "IPv4"]]),
            Owner::Device,
        )
        .unwrap();
        assert_eq!(opt.value(), &json!("1.2.3.4"));
        assert!(opt.is_optional());
        assert!(opt.minimum().is_none());
        assert_eq!(opt.properties(), &["optional".to_string(), "IPv4".to_string()]);
        assert_eq!(opt.owner(), &Owner::Device);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            json!("Exposure"),
            json!([]),
            json!(["", 1, 1, "d"]),
            json!(["X", 1, 1]),
            json!(["X", 1, "lo", 10, 1, 1, "d"]),
            json!(["X", 1, 10, 1, 1, 1, "d"]),
            json!(["X", 50, 1, 10, 1, 1, "d"]),
            json!(["X", 1, 1, 7]),
            json!(["X", 1, 1, "d", "read-only"]),
        ] {
            assert!(
                DeviceOption::from_json(&bad, Owner::Device).is_err(),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn test_set_value_validates() {
        let mut opt = exposure();
        opt.set_value(json!(480)).unwrap();
        assert_eq!(opt.value(), &json!(480));

        assert!(opt.set_value(json!(200000)).is_err());
        assert!(opt.set_value(json!("fast")).is_err());
        assert!(opt.set_value(Value::Null).is_err());
        assert_eq!(opt.value(), &json!(480));
    }

    #[test]
    fn test_check_value_is_invalid_argument() {
        let opt = exposure();
        assert!(matches!(
            opt.check_value(&json!(0)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(opt.check_value(&json!(500)).is_ok());
    }

    #[test]
    fn test_read_only() {
        let opt = DeviceOption::from_json(
            &json!(["Magnitude", 2, 1, 8, 1, 2, "Grouping", ["int", "read-only"]]),
            Owner::Device,
        )
        .unwrap();
        assert!(opt.is_read_only());
    }

    #[test]
    fn test_to_json_parses_back() {
        let opt = exposure();
        let again = DeviceOption::from_json(&opt.to_json(), opt.owner().clone()).unwrap();
        assert_eq!(opt, again);
    }
}
