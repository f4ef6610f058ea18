// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Simulated device server on the loopback bus.
//!
//! Publishes the description burst on `<root>/notification` and answers
//! requests arriving on `<root>/control`, echoing `sample` and `control` the
//! way a real device does.

#![allow(dead_code)]

use depthlink::transport::{TopicQos, Transport};
use depthlink::{DeviceInfo, DeviceSession, Guid, LoopbackBus, SessionConfig, Subscription, TopicWriter};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const ROOT: &str = "realsense/D455_0123";

/// Knobs and recorded traffic of the simulated device
#[derive(Default)]
pub struct DeviceState {
    /// option name -> value the device commits instead of the requested one
    pub clamp: HashMap<String, Value>,
    /// Reply to every request with this error
    pub error: Option<String>,
    /// Never reply
    pub drop_replies: bool,
    /// Delay before replying
    pub reply_delay: Option<Duration>,
    /// Every control received, in order
    pub controls: Vec<Value>,
    /// "<stream>/<option>" or "<option>" -> current value
    pub values: HashMap<String, Value>,
    /// "<stream>/<filter>" -> parameters
    pub filters: HashMap<String, Map<String, Value>>,
}

pub struct FakeDevice {
    notifier: Arc<dyn TopicWriter>,
    state: Arc<Mutex<DeviceState>>,
    _control: Box<dyn Subscription>,
}

fn option_key(request: &Value) -> String {
    let option = request["option-name"].as_str().unwrap_or_default();
    match request.get("stream-name").and_then(Value::as_str) {
        Some(stream) => format!("{}/{}", stream, option),
        None => option.to_string(),
    }
}

fn filter_key(request: &Value) -> String {
    format!(
        "{}/{}",
        request["stream-name"].as_str().unwrap_or_default(),
        request["name"].as_str().unwrap_or_default()
    )
}

fn answer(state: &mut DeviceState, request: &Value, reply: &mut Value) {
    if let Some(explanation) = &state.error {
        reply["status"] = json!("error");
        reply["explanation"] = json!(explanation);
        return;
    }
    match request["id"].as_str().unwrap_or_default() {
        "set-option" => {
            let key = option_key(request);
            let option = request["option-name"].as_str().unwrap_or_default();
            let value = state
                .clamp
                .get(option)
                .cloned()
                .unwrap_or_else(|| request["value"].clone());
            state.values.insert(key, value.clone());
            reply["value"] = value;
        }
        "query-option" => {
            reply["value"] = state
                .values
                .get(&option_key(request))
                .cloned()
                .unwrap_or(Value::Null);
        }
        "query-options" => {
            let mut values = Map::new();
            for (key, value) in &state.values {
                match key.split_once('/') {
                    Some((stream, option)) => {
                        let entry = values
                            .entry(stream.to_string())
                            .or_insert_with(|| json!({}));
                        entry[option] = value.clone();
                    }
                    None => {
                        values.insert(key.clone(), value.clone());
                    }
                }
            }
            reply["option-values"] = Value::Object(values);
        }
        "set-filter" => {
            let params = state.filters.entry(filter_key(request)).or_default();
            if let Some(requested) = request["options"].as_object() {
                for (name, value) in requested {
                    params.insert(name.clone(), value.clone());
                }
            }
            reply["name"] = request["name"].clone();
            reply["options"] = Value::Object(params.clone());
        }
        "query-filter" => {
            let params = state
                .filters
                .get(&filter_key(request))
                .cloned()
                .unwrap_or_default();
            reply["name"] = request["name"].clone();
            reply["stream-name"] = request["stream-name"].clone();
            reply["options"] = Value::Object(params);
        }
        _ => {}
    }
}

impl FakeDevice {
    pub fn new(bus: &LoopbackBus) -> Self {
        let notifier = bus
            .create_writer(&format!("{}/notification", ROOT), TopicQos::reliable())
            .expect("Failed to create notification writer");

        let mut initial = DeviceState::default();
        initial.values.insert("Visual Preset".into(), json!(0));
        initial.values.insert("Depth/Exposure".into(), json!(8500));
        initial.values.insert("Color/Gain".into(), json!(64));
        initial.filters.insert(
            "Depth/Decimation".into(),
            json!({ "Toggle": 0, "Magnitude": 2 })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        );
        let state = Arc::new(Mutex::new(initial));

        let replier = notifier.clone();
        let device_state = state.clone();
        let control = bus
            .subscribe(
                &format!("{}/control", ROOT),
                TopicQos::reliable(),
                Box::new(move |request, info| {
                    let mut reply = json!({
                        "id": request["id"].clone(),
                        "sample": [info.publication_guid.to_string(), info.sequence_number],
                        "control": request.clone(),
                    });
                    let (drop_reply, delay) = {
                        let mut state = device_state.lock();
                        state.controls.push(request.clone());
                        answer(&mut state, &request, &mut reply);
                        (state.drop_replies, state.reply_delay)
                    };
                    if drop_reply {
                        return;
                    }
                    if let Some(delay) = delay {
                        std::thread::sleep(delay);
                    }
                    replier.write(&reply).expect("Failed to publish reply");
                }),
            )
            .expect("Failed to subscribe to control");

        Self {
            notifier,
            state,
            _control: control,
        }
    }

    /// Identity of the device's notification writer
    pub fn guid(&self) -> Guid {
        self.notifier.guid()
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    pub fn publish(&self, message: &Value) {
        self.notifier
            .write(message)
            .expect("Failed to publish notification");
    }

    /// Publish the whole description, in the given order
    pub fn announce(&self, fragments: &[Value]) {
        for fragment in fragments {
            self.publish(fragment);
        }
    }

    /// Controls received with the given id
    pub fn controls(&self, id: &str) -> Vec<Value> {
        self.state
            .lock()
            .controls
            .iter()
            .filter(|c| c["id"] == id)
            .cloned()
            .collect()
    }
}

/// Short reply timeout so timeout paths stay quick
pub fn test_config() -> SessionConfig {
    SessionConfig::from_json(&json!({ "control": { "reply-timeout-ms": 300 } }))
        .expect("Failed to build config")
}

pub fn new_session(bus: &LoopbackBus, config: SessionConfig) -> DeviceSession {
    let info = DeviceInfo::new("Depth Camera 455", ROOT).with_serial("0123");
    DeviceSession::new(Arc::new(bus.clone()), info, config).expect("Failed to create session")
}

/// A session that went through the whole description burst
pub fn ready_pair(bus: &LoopbackBus) -> (FakeDevice, DeviceSession) {
    let device = FakeDevice::new(bus);
    let session = new_session(bus, test_config());
    session.set_reachable(true).expect("Failed to go online");
    device.announce(&fragments());
    assert!(
        session.wait_until_ready(Duration::from_secs(5)),
        "session never became ready"
    );
    (device, session)
}

// ============================================================================
// Description fragments
// ============================================================================

pub fn intrinsics(w: u32, h: u32, f: f32) -> Value {
    json!({
        "width": w,
        "height": h,
        "principal-point": [w as f32 / 2.0, h as f32 / 2.0],
        "focal-length": [f, f]
    })
}

pub fn device_header(n_streams: usize) -> Value {
    json!({
        "id": "device-header",
        "n-streams": n_streams,
        "extrinsics": [
            ["Depth", "Color", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0.015, 0, 0]]
        ]
    })
}

pub fn device_options() -> Value {
    json!({
        "id": "device-options",
        "options": [
            ["Visual Preset", 0, 0, 5, 1, 0, "Advanced-mode preset"],
            ["Serial Number", "0123", "0123", "Serial", ["read-only"]]
        ]
    })
}

pub fn depth_header() -> Value {
    json!({
        "id": "stream-header",
        "type": "depth",
        "name": "Depth",
        "sensor-name": "Stereo Module",
        "profiles": [[30, "Z16", 1280, 720], [15, "Z16", 640, 480]],
        "default-profile-index": 0,
        "metadata-enabled": true
    })
}

pub fn depth_options() -> Value {
    json!({
        "id": "stream-options",
        "stream-name": "Depth",
        "options": [["Exposure", 8500, 1, 165000, 1, 8500, "Depth exposure (usec)"]],
        "embedded-filters": [{
            "name": "Decimation",
            "options": [
                ["Toggle", 0, 0, 1, 1, 0, "on/off"],
                ["Magnitude", 2, 2, 8, 2, 2, "Decimation factor"]
            ]
        }],
        "intrinsics": intrinsics(1280, 720, 640.0)
    })
}

pub fn color_header() -> Value {
    json!({
        "id": "stream-header",
        "type": "color",
        "name": "Color",
        "sensor-name": "RGB Camera",
        "profiles": [[30, "RGB8", 1280, 720], [30, "RGB8", 640, 480]],
        "default-profile-index": 1,
        "metadata-enabled": false
    })
}

pub fn color_options() -> Value {
    json!({
        "id": "stream-options",
        "stream-name": "Color",
        "options": [["Gain", 64, 0, 128, 1, 64, "Gain"]],
        "intrinsics": [intrinsics(1280, 720, 900.0), intrinsics(640, 480, 450.0)]
    })
}

pub fn fragments() -> Vec<Value> {
    vec![
        device_header(2),
        device_options(),
        depth_header(),
        depth_options(),
        color_header(),
        color_options(),
    ]
}
