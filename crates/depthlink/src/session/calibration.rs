// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Calibration-change handler.
//!
//! `calibration-changed` carries new intrinsics for any number of streams,
//! keyed by stream name. Each stream is recalibrated on its own: a bad entry
//! leaves that stream untouched and does not stop the others.

use super::{Effects, SessionCore, Shared};
use crate::error::{Error, Result};
use crate::model::{Stream, StreamIntrinsics, VideoIntrinsics};
use crate::topics::notification::calibration_changed as key;
use crate::transport::SampleInfo;
use serde_json::Value;
use std::collections::BTreeMap;

pub(super) fn on_calibration_changed(
    shared: &Shared,
    core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    let mut names: Vec<&String> = core.streams.keys().collect();
    names.sort();
    let names: Vec<String> = names.into_iter().cloned().collect();

    for name in names {
        let Some(j_int) = j.get(&name).and_then(|s| s.get(key::INTRINSICS)) else {
            continue;
        };
        let Some(stream) = core.streams.get_mut(&name) else {
            continue;
        };
        match recalibrate(stream, j_int) {
            Ok(intrinsics) => {
                log::debug!(
                    "[DeviceSession {}] calibration-changed '{}': changing {}",
                    shared.name,
                    name,
                    j_int
                );
                stream.set_intrinsics(intrinsics);
                fx.calibrated.push(stream.clone());
            }
            Err(e) => {
                log::error!(
                    "[DeviceSession {}] calibration-changed '{}': {}",
                    shared.name,
                    name,
                    e
                );
            }
        }
    }
    Ok(())
}

/// New intrinsics for `stream`, shaped like the ones it already has
fn recalibrate(stream: &Stream, j: &Value) -> Result<StreamIntrinsics> {
    if !stream.kind().is_video() {
        return Err(Error::malformed("not a video stream"));
    }
    let old = match stream.intrinsics() {
        Some(StreamIntrinsics::Video(set)) if !set.is_empty() => set,
        _ => return Err(Error::malformed("no intrinsics to change")),
    };

    let mut new = BTreeMap::new();
    if let Some(arr) = j.as_array() {
        // One set per resolution, as sent for legacy devices
        if arr.len() != old.len() {
            return Err(Error::malformed(format!(
                "expecting {} intrinsics; got: {}",
                old.len(),
                j
            )));
        }
        for ij in arr {
            let intr = VideoIntrinsics::from_json(ij)?;
            if !old.contains_key(&intr.resolution()) {
                return Err(Error::malformed(format!("intrinsics not found: {}", ij)));
            }
            if new.insert(intr.resolution(), intr).is_some() {
                return Err(Error::malformed(format!(
                    "width & height specified twice: {}",
                    ij
                )));
            }
        }
    } else {
        // A single set that gets scaled to every profile
        if old.len() != 1 {
            return Err(Error::malformed(format!(
                "expecting {} intrinsics; got a single set: {}",
                old.len(),
                j
            )));
        }
        let Some(mut intr) = old.values().next().copied() else {
            return Err(Error::malformed("no intrinsics to change"));
        };
        intr.override_from_json(j)?;
        new.insert(intr.resolution(), intr);
    }
    Ok(StreamIntrinsics::Video(new))
}
