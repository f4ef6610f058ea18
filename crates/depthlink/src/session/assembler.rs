// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Initialization assembler.
//!
//! On discovery the device publishes its description as a burst of
//! independent fragments, in no guaranteed order:
//!
//! - `device-header`: expected stream count, extrinsics
//! - `device-options`: device-level options
//! - `stream-header` (one per stream): type, sensor, profiles
//! - `stream-options` (one per stream): options, embedded filters, intrinsics
//!
//! A stream exists only once its header is processed. `stream-options` that
//! arrive first are parked under the stream name and applied by the header
//! handler. The session becomes READY once every fragment is in.

use super::{Effects, SessionCore, SessionState, Shared};
use crate::error::{Error, Result};
use crate::model::extrinsics::triple_from_json;
use crate::model::option::find_option;
use crate::model::{DeviceOption, EmbeddedFilter, Owner, Stream};
use crate::topics::notification::{device_header, device_options, stream_header, stream_options};
use crate::topics::{str_field, u64_field};
use crate::transport::SampleInfo;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Parsed payload of a `stream-options` fragment
#[derive(Debug, Clone, Default)]
pub(super) struct StreamOptionsPayload {
    options: Option<Vec<DeviceOption>>,
    filters: Option<Vec<EmbeddedFilter>>,
    intrinsics: Option<Value>,
}

/// Outcome of checking a stream header against what was already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeaderCheck {
    New,
    Duplicate,
}

/// Bookkeeping for the fragments received during INITIALIZING
#[derive(Debug, Default)]
pub(crate) struct Assembler {
    device_header_received: bool,
    device_options_received: bool,
    expected_streams: usize,
    headers: HashSet<String>,
    options: HashSet<String>,
    deferred: HashMap<String, StreamOptionsPayload>,
}

impl Assembler {
    pub(super) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Every fragment has been received
    pub(super) fn is_complete(&self) -> bool {
        self.device_header_received
            && self.device_options_received
            && self.headers.len() == self.expected_streams
            && self.headers.iter().all(|name| self.options.contains(name))
    }

    pub(super) fn expected_streams(&self) -> usize {
        self.expected_streams
    }

    fn device_header(&mut self, expected_streams: usize) {
        self.device_header_received = true;
        self.expected_streams = expected_streams;
    }

    fn device_options(&mut self) {
        self.device_options_received = true;
    }

    fn check_header(&self, name: &str) -> Result<HeaderCheck> {
        if self.headers.contains(name) {
            return Ok(HeaderCheck::Duplicate);
        }
        // Before the device header the count is unknown
        if self.device_header_received && self.headers.len() >= self.expected_streams {
            return Err(Error::malformed(format!(
                "more streams than expected ({}) received",
                self.expected_streams
            )));
        }
        Ok(HeaderCheck::New)
    }

    fn header_received(&mut self, name: &str) -> Option<StreamOptionsPayload> {
        self.headers.insert(name.to_string());
        self.deferred.remove(name)
    }

    fn options_already_received(&self, name: &str) -> bool {
        self.options.contains(name)
    }

    fn options_received(&mut self, name: &str) {
        self.options.insert(name.to_string());
    }

    fn defer(&mut self, name: &str, payload: StreamOptionsPayload) {
        self.deferred.insert(name.to_string(), payload);
    }

    /// Drop whatever is still parked; returns the stream names dropped
    pub(super) fn finish(&mut self) -> Vec<String> {
        let mut dangling: Vec<String> = self.deferred.drain().map(|(name, _)| name).collect();
        dangling.sort();
        dangling
    }
}

/// Parse a list of option descriptors, skipping (and logging) bad entries
fn parse_options(shared: &Shared, list: &Value, owner: &Owner) -> Result<Vec<DeviceOption>> {
    let list = list
        .as_array()
        .ok_or_else(|| Error::malformed(format!("options are not an array: {}", list)))?;
    let mut options: Vec<DeviceOption> = Vec::with_capacity(list.len());
    for option_j in list {
        match DeviceOption::from_json(option_j, owner.clone()) {
            Ok(option) if find_option(&options, option.name()).is_some() => {
                log::warn!(
                    "[DeviceSession {}] option '{}' declared twice; keeping the first",
                    shared.name,
                    option.name()
                );
            }
            Ok(option) => options.push(option),
            Err(e) => {
                log::error!(
                    "[DeviceSession {}] Invalid option for {:?}. Error: {}, reading {}",
                    shared.name,
                    owner,
                    e,
                    option_j
                );
            }
        }
    }
    Ok(options)
}

fn parse_filters(shared: &Shared, list: &Value, stream_name: &str) -> Result<Vec<EmbeddedFilter>> {
    let list = list
        .as_array()
        .ok_or_else(|| Error::malformed(format!("embedded filters are not an array: {}", list)))?;
    let mut filters: Vec<EmbeddedFilter> = Vec::with_capacity(list.len());
    for filter_j in list {
        match EmbeddedFilter::from_json(filter_j, stream_name) {
            Ok(filter) => filters.push(filter),
            Err(e) => {
                log::error!(
                    "[DeviceSession {}] Invalid embedded filter for stream '{}'. Error: {}, reading {}",
                    shared.name,
                    stream_name,
                    e,
                    filter_j
                );
            }
        }
    }
    Ok(filters)
}

fn apply_stream_options(shared: &Shared, stream: &mut Stream, payload: StreamOptionsPayload) {
    if let Some(options) = payload.options {
        stream.init_options(options);
    }
    if let Some(filters) = payload.filters {
        stream.init_filters(filters);
    }
    if let Some(intrinsics) = payload.intrinsics {
        if let Err(e) = stream.init_intrinsics(&intrinsics) {
            log::error!(
                "[DeviceSession {}] Invalid intrinsics for stream '{}'. Error: {}, reading {}",
                shared.name,
                stream.name(),
                e,
                intrinsics
            );
        }
    }
}

pub(super) fn on_device_header(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Initializing {
        return Ok(());
    }

    let n_streams = u64_field(j, device_header::N_STREAMS)? as usize;
    core.assembler.device_header(n_streams);
    // The server's notification writer identifies the device from now on
    if core.server_guid.is_none() {
        core.server_guid = Some(info.publication_guid);
    }
    log::debug!(
        "[DeviceSession {}] ... {}: {} streams expected",
        shared.name,
        device_header::ID,
        n_streams
    );

    if let Some(list) = j.get(device_header::EXTRINSICS) {
        let list = list
            .as_array()
            .ok_or_else(|| Error::malformed("extrinsics are not an array"))?;
        for entry in list {
            match triple_from_json(entry) {
                Ok((from, to, extrinsics)) => {
                    core.extrinsics.insert((from, to), extrinsics);
                }
                Err(e) => {
                    log::error!(
                        "[DeviceSession {}] Invalid extrinsics. Error: {}, reading {}",
                        shared.name,
                        e,
                        entry
                    );
                }
            }
        }
    }

    shared.check_ready(core, fx)
}

pub(super) fn on_device_options(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Initializing {
        return Ok(());
    }

    if let Some(list) = j.get(device_options::OPTIONS) {
        let options = parse_options(shared, list, &Owner::Device)?;
        log::debug!(
            "[DeviceSession {}] ... {}: {} options received",
            shared.name,
            device_options::ID,
            options.len()
        );
        for option in options {
            if find_option(&core.options, option.name()).is_some() {
                log::warn!(
                    "[DeviceSession {}] device option '{}' already received. Ignoring...",
                    shared.name,
                    option.name()
                );
            } else {
                core.options.push(option);
            }
        }
    }
    core.assembler.device_options();

    shared.check_ready(core, fx)
}

pub(super) fn on_stream_header(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Initializing {
        return Ok(());
    }

    let name = str_field(j, stream_header::NAME)?;
    if core.assembler.check_header(name)? == HeaderCheck::Duplicate {
        log::warn!(
            "[DeviceSession {}] stream header for stream '{}' already received. Ignoring...",
            shared.name,
            name
        );
        return Ok(());
    }

    let mut stream = Stream::from_header(j)?;
    if stream.metadata_enabled() {
        core.metadata_available = true;
    }
    // Apply a stream-options fragment that arrived first
    if let Some(payload) = core.assembler.header_received(name) {
        apply_stream_options(shared, &mut stream, payload);
    }
    log::debug!(
        "[DeviceSession {}] ... stream {}/{} '{}' received with {} profiles{}",
        shared.name,
        core.streams.len() + 1,
        core.assembler.expected_streams(),
        name,
        stream.profiles().len(),
        if stream.metadata_enabled() {
            " and metadata"
        } else {
            ""
        }
    );
    core.streams.insert(name.to_string(), stream);

    shared.check_ready(core, fx)
}

pub(super) fn on_stream_options(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    if core.state != SessionState::Initializing {
        return Ok(());
    }

    let name = str_field(j, stream_options::STREAM_NAME)?;
    if core.assembler.options_already_received(name) {
        log::warn!(
            "[DeviceSession {}] stream options for stream '{}' already received. Ignoring...",
            shared.name,
            name
        );
        return Ok(());
    }

    let owner = Owner::Stream(name.to_string());
    let payload = StreamOptionsPayload {
        options: j
            .get(stream_options::OPTIONS)
            .map(|list| parse_options(shared, list, &owner))
            .transpose()?,
        filters: j
            .get(stream_options::EMBEDDED_FILTERS)
            .map(|list| parse_filters(shared, list, name))
            .transpose()?,
        intrinsics: j
            .get(stream_options::INTRINSICS)
            .filter(|i| !i.is_null())
            .cloned(),
    };
    let n_options = payload.options.as_ref().map_or(0, Vec::len);

    match core.streams.get_mut(name) {
        Some(stream) => apply_stream_options(shared, stream, payload),
        None => core.assembler.defer(name, payload),
    }
    core.assembler.options_received(name);
    log::debug!(
        "[DeviceSession {}] ... stream '{}' received {} options",
        shared.name,
        name,
        n_options
    );

    shared.check_ready(core, fx)
}
