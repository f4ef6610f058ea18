// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Option and filter control.
//!
//! Control calls send a request, block on its reply and never touch the
//! cache themselves: the reply is routed through the notification handlers
//! below, which commit the value the device reports (possibly clamped)
//! before the caller wakes up. A failed or missing reply leaves the cache as
//! it was.
//!
//! All calls fail fast with [`Error::NotReady`] unless the session is ready.

use super::{DeviceSession, Effects, SessionCore, SessionState, Shared};
use crate::error::{Error, Result};
use crate::model::option::find_option_mut;
use crate::model::{DeviceOption, OpenProfile};
use crate::topics::{self, check_reply, control, object_field, opt_str, reply, str_field};
use crate::transport::SampleInfo;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Option addressed by a control call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OptionTarget {
    /// Device-level option
    Device(String),
    /// Option of a stream
    Stream { stream: String, option: String },
}

impl OptionTarget {
    pub fn device(option: impl Into<String>) -> Self {
        Self::Device(option.into())
    }

    pub fn stream(stream: impl Into<String>, option: impl Into<String>) -> Self {
        Self::Stream {
            stream: stream.into(),
            option: option.into(),
        }
    }

    pub fn option_name(&self) -> &str {
        match self {
            Self::Device(option) | Self::Stream { option, .. } => option,
        }
    }

    pub fn stream_name(&self) -> Option<&str> {
        match self {
            Self::Device(_) => None,
            Self::Stream { stream, .. } => Some(stream),
        }
    }
}

impl fmt::Display for OptionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(option) => write!(f, "option '{}'", option),
            Self::Stream { stream, option } => write!(f, "option '{}' of stream '{}'", option, stream),
        }
    }
}

/// All option values reported by a `query-options` reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionValues {
    pub device: BTreeMap<String, Value>,
    /// stream name -> option name -> value
    pub streams: BTreeMap<String, BTreeMap<String, Value>>,
}

impl OptionValues {
    fn from_json(option_values: &Map<String, Value>) -> Self {
        let mut values = Self::default();
        for (key, value) in option_values {
            match value {
                Value::Object(stream_values) => {
                    values.streams.insert(
                        key.clone(),
                        stream_values
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    );
                }
                value => {
                    values.device.insert(key.clone(), value.clone());
                }
            }
        }
        values
    }

    /// Value of a target, if reported
    pub fn get(&self, target: &OptionTarget) -> Option<&Value> {
        match target {
            OptionTarget::Device(option) => self.device.get(option),
            OptionTarget::Stream { stream, option } => {
                self.streams.get(stream).and_then(|s| s.get(option))
            }
        }
    }
}

fn ensure_ready(core: &SessionCore) -> Result<()> {
    if core.state != SessionState::Ready {
        return Err(Error::NotReady { state: core.state });
    }
    Ok(())
}

fn resolve_option<'a>(core: &'a SessionCore, target: &OptionTarget) -> Result<&'a DeviceOption> {
    let options = match target.stream_name() {
        None => core.options.as_slice(),
        Some(stream) => core
            .streams
            .get(stream)
            .ok_or_else(|| Error::not_found(format!("stream '{}'", stream)))?
            .options(),
    };
    crate::model::option::find_option(options, target.option_name())
        .ok_or_else(|| Error::not_found(target.to_string()))
}

fn value_field(response: &Value) -> Result<Value> {
    response
        .get(reply::set_option::VALUE)
        .cloned()
        .ok_or_else(|| Error::malformed("reply is missing a value"))
}

impl Shared {
    /// Send a request and wait for its reply; an error status fails the call
    fn request(&self, request: &Value) -> Result<Value> {
        let ticket = self.correlator.send(request)?;
        let sequence = ticket.sequence();
        let response = self.correlator.wait(ticket, self.reply_timeout).map_err(|e| {
            log::debug!(
                "[DeviceSession {}] no reply to #{}: {}",
                self.name,
                sequence,
                request
            );
            e
        })?;
        check_reply(&response)?;
        Ok(response)
    }

    /// The reply's value, provided the cached descriptor accepts it
    fn committed_value(&self, target: &OptionTarget, response: &Value) -> Result<Value> {
        let value = value_field(response)?;
        let core = self.core.lock();
        ensure_ready(&core)?;
        resolve_option(&core, target)?
            .clone()
            .set_value(value.clone())?;
        Ok(value)
    }

    /// Check preconditions under the session lock, then send without it
    fn checked_request<F>(&self, prepare: F) -> Result<Value>
    where
        F: FnOnce(&SessionCore) -> Result<Value>,
    {
        let request = {
            let core = self.core.lock();
            ensure_ready(&core)?;
            prepare(&core)?
        };
        self.request(&request)
    }
}

impl DeviceSession {
    /// Set an option and return the value the device committed.
    ///
    /// The value is checked locally against the cached descriptor first
    /// (read-only, type, range). The device may still adjust it, e.g. clamp
    /// it to a supported step; the returned value is the device's. A device
    /// value outside the cached range is not committed and fails the call
    /// with [`Error::Malformed`].
    pub fn set_option(&self, target: &OptionTarget, value: Value) -> Result<Value> {
        let response = self.shared.checked_request(|core| {
            let option = resolve_option(core, target)?;
            if option.is_read_only() {
                return Err(Error::InvalidArgument(format!("{} is read-only", target)));
            }
            option.check_value(&value)?;
            let mut request = json!({
                topics::ID: control::set_option::ID,
                control::set_option::OPTION_NAME: target.option_name(),
                control::set_option::VALUE: value,
            });
            if let Some(stream) = target.stream_name() {
                request[control::set_option::STREAM_NAME] = json!(stream);
            }
            Ok(request)
        })?;
        self.shared.committed_value(target, &response)
    }

    /// Ask the device for an option's current value
    pub fn query_option(&self, target: &OptionTarget) -> Result<Value> {
        let response = self.shared.checked_request(|core| {
            resolve_option(core, target)?;
            let mut request = json!({
                topics::ID: control::query_option::ID,
                control::query_option::OPTION_NAME: target.option_name(),
            });
            if let Some(stream) = target.stream_name() {
                request[control::query_option::STREAM_NAME] = json!(stream);
            }
            Ok(request)
        })?;
        self.shared.committed_value(target, &response)
    }

    /// Ask the device for every option value at once
    pub fn query_all_options(&self) -> Result<OptionValues> {
        let response = self
            .shared
            .checked_request(|_| Ok(json!({ topics::ID: control::query_options::ID })))?;
        Ok(OptionValues::from_json(object_field(
            &response,
            reply::query_options::OPTION_VALUES,
        )?))
    }

    /// Set some parameters of an embedded filter.
    ///
    /// `params` is an object of parameter name to value, validated locally
    /// first. Returns the filter's parameters as cached after the reply.
    pub fn set_filter_params(
        &self,
        stream: &str,
        filter: &str,
        params: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        self.shared.checked_request(|core| {
            let embedded = core
                .streams
                .get(stream)
                .ok_or_else(|| Error::not_found(format!("stream '{}'", stream)))?
                .filter(filter)
                .ok_or_else(|| {
                    Error::not_found(format!("filter '{}' of stream '{}'", filter, stream))
                })?;
            embedded.check_params(params)?;
            Ok(json!({
                topics::ID: control::set_filter::ID,
                control::set_filter::NAME: filter,
                control::set_filter::STREAM_NAME: stream,
                control::set_filter::OPTIONS: params,
            }))
        })?;

        let core = self.shared.core.lock();
        core.streams
            .get(stream)
            .and_then(|s| s.filter(filter))
            .map(|f| f.param_values())
            .ok_or_else(|| Error::not_found(format!("filter '{}' of stream '{}'", filter, stream)))
    }

    /// Ask the device for an embedded filter's parameters
    pub fn query_filter_params(&self, stream: &str, filter: &str) -> Result<Map<String, Value>> {
        let response = self.shared.checked_request(|core| {
            core.streams
                .get(stream)
                .ok_or_else(|| Error::not_found(format!("stream '{}'", stream)))?
                .filter(filter)
                .ok_or_else(|| {
                    Error::not_found(format!("filter '{}' of stream '{}'", filter, stream))
                })?;
            Ok(json!({
                topics::ID: control::query_filter::ID,
                control::query_filter::NAME: filter,
                control::query_filter::STREAM_NAME: stream,
            }))
        })?;
        Ok(object_field(&response, reply::query_filter::OPTIONS)?.clone())
    }

    /// Open stream profiles, at most one per stream.
    ///
    /// Streams already open stay open; on success the profiles are added to
    /// [`DeviceSession::open_profiles`], unless the session was reset while
    /// waiting for the reply.
    pub fn open(&self, profiles: &[OpenProfile]) -> Result<()> {
        if profiles.is_empty() {
            return Err(Error::InvalidArgument(
                "must provide at least one profile".to_string(),
            ));
        }
        let mut epoch = 0;
        self.shared.checked_request(|core| {
            epoch = core.epoch;
            Ok(json!({
                topics::ID: control::open_streams::ID,
                control::open_streams::RESET: false,
                control::open_streams::STREAM_PROFILES: profiles_to_json(core, profiles)?,
            }))
        })?;

        let mut core = self.shared.core.lock();
        if core.epoch != epoch {
            log::debug!(
                "[DeviceSession {}] session was reset while opening; profiles not recorded",
                self.shared.name
            );
            return Ok(());
        }
        core.open_profiles.extend(profiles.iter().cloned());
        Ok(())
    }

    /// Close stream profiles; the rest of the open profiles stay open
    pub fn close(&self, profiles: &[OpenProfile]) -> Result<()> {
        let request = {
            let mut core = self.shared.core.lock();
            ensure_ready(&core)?;
            for profile in profiles {
                if let Some(pos) = core.open_profiles.iter().position(|p| p == profile) {
                    core.open_profiles.remove(pos);
                }
            }
            let mut request = json!({
                topics::ID: control::open_streams::ID,
                control::open_streams::RESET: true,
            });
            if !core.open_profiles.is_empty() {
                request[control::open_streams::STREAM_PROFILES] =
                    profiles_to_json(&core, &core.open_profiles)?;
            }
            request
        };
        self.shared.request(&request)?;
        Ok(())
    }

    /// Send a raw control message.
    ///
    /// With `wait_reply`, blocks for the reply (subject to the same rules as
    /// the other control calls) and returns it.
    pub fn send_control(&self, message: &Value, wait_reply: bool) -> Result<Option<Value>> {
        if opt_str(message, topics::ID).is_none() {
            return Err(Error::InvalidArgument(format!(
                "control message must be an object with an id: {}",
                message
            )));
        }
        if !wait_reply {
            self.shared.correlator.post(message)?;
            return Ok(None);
        }
        let message = message.clone();
        self.shared.checked_request(|_| Ok(message)).map(Some)
    }
}

fn profiles_to_json(core: &SessionCore, profiles: &[OpenProfile]) -> Result<Value> {
    let mut by_stream = Map::new();
    for open in profiles {
        let stream = core
            .streams
            .get(&open.stream)
            .ok_or_else(|| Error::not_found(format!("stream '{}'", open.stream)))?;
        if !stream.has_profile(&open.profile) {
            return Err(Error::InvalidArgument(format!(
                "profile '{}' is not part of stream '{}'",
                open.profile, open.stream
            )));
        }
        if by_stream.contains_key(&open.stream) {
            return Err(Error::InvalidArgument(format!(
                "more than one profile found for stream '{}'",
                open.stream
            )));
        }
        by_stream.insert(open.stream.clone(), open.profile.to_json());
    }
    Ok(Value::Object(by_stream))
}

// ============================================================================
// Reply handlers (run by the notification router)
// ============================================================================

/// `set-option` / `query-option` reply: commit the returned value
pub(super) fn on_set_option(
    _shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    _fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Ready {
        return Ok(());
    }
    // Errors are for the caller; nothing to commit
    if check_reply(j).is_err() {
        return Ok(());
    }

    // The original request tells which option this is
    let request = j
        .get(reply::CONTROL)
        .filter(|c| c.is_object())
        .ok_or_else(|| Error::malformed("missing control object"))?;
    let value = j
        .get(reply::set_option::VALUE)
        .ok_or_else(|| Error::malformed("missing value"))?;
    let option_name = str_field(request, control::set_option::OPTION_NAME)?;

    let options = match opt_str(request, control::set_option::STREAM_NAME) {
        None => core.options.as_mut_slice(),
        Some(stream) => core
            .streams
            .get_mut(stream)
            .ok_or_else(|| Error::not_found(format!("stream '{}'", stream)))?
            .options_mut(),
    };
    find_option_mut(options, option_name)
        .ok_or_else(|| Error::not_found(format!("option '{}'", option_name)))?
        .set_value(value.clone())
}

/// `query-options`, replied or unsolicited: update every named option
pub(super) fn on_query_options(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    _fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Ready {
        return Ok(());
    }
    check_reply(j)?;

    let option_values = object_field(j, reply::query_options::OPTION_VALUES)?;
    for (key, value) in option_values {
        let result = match value {
            // One level of nesting: a stream's options
            Value::Object(stream_values) => match core.streams.get_mut(key) {
                Some(stream) => {
                    for (option_name, value) in stream_values {
                        let result = find_option_mut(stream.options_mut(), option_name)
                            .ok_or_else(|| {
                                Error::not_found(format!(
                                    "option '{}' of stream '{}'",
                                    option_name, key
                                ))
                            })
                            .and_then(|option| option.set_value(value.clone()));
                        if let Err(e) = result {
                            log::error!("[DeviceSession {}] query-options: {}", shared.name, e);
                        }
                    }
                    Ok(())
                }
                None => Err(Error::not_found(format!("stream '{}'", key))),
            },
            value => find_option_mut(&mut core.options, key)
                .ok_or_else(|| Error::not_found(format!("option '{}'", key)))
                .and_then(|option| option.set_value(value.clone())),
        };
        if let Err(e) = result {
            log::error!("[DeviceSession {}] query-options: {}", shared.name, e);
        }
    }
    Ok(())
}

/// `set-filter` reply: commit the returned parameters
pub(super) fn on_set_filter(
    _shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    _fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Ready {
        return Ok(());
    }
    if check_reply(j).is_err() {
        return Ok(());
    }

    let request = j
        .get(reply::CONTROL)
        .filter(|c| c.is_object())
        .ok_or_else(|| Error::malformed("missing control object"))?;
    let stream_name = str_field(request, control::set_filter::STREAM_NAME)?;
    let filter_name = str_field(j, reply::set_filter::NAME)?;
    let params = j
        .get(reply::set_filter::OPTIONS)
        .ok_or_else(|| Error::malformed("missing filter parameters"))?;
    update_filter(core, stream_name, filter_name, params)
}

/// `query-filter`, replied or unsolicited: commit the reported parameters
pub(super) fn on_query_filter(
    _shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    _fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Ready {
        return Ok(());
    }
    if check_reply(j).is_err() {
        return Ok(());
    }

    let stream_name = str_field(j, reply::query_filter::STREAM_NAME)?;
    let filter_name = str_field(j, reply::query_filter::NAME)?;
    let params = j
        .get(reply::query_filter::OPTIONS)
        .ok_or_else(|| Error::malformed("missing filter parameters"))?;
    update_filter(core, stream_name, filter_name, params)
}

fn update_filter(
    core: &mut SessionCore,
    stream_name: &str,
    filter_name: &str,
    params: &Value,
) -> Result<()> {
    core.streams
        .get_mut(stream_name)
        .ok_or_else(|| Error::not_found(format!("stream '{}'", stream_name)))?
        .filter_mut(filter_name)
        .ok_or_else(|| Error::not_found(format!("embedded filter '{}'", filter_name)))?
        .set_params(params)
}
