// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # depthlink - Depth-camera device sessions
//!
//! Turns a network-reachable depth camera, reachable only through
//! topic-based publish/subscribe messaging, into a locally consistent device
//! model with blocking control calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use depthlink::{DeviceInfo, DeviceSession, LoopbackBus, OptionTarget, Result, SessionConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let bus = LoopbackBus::new();
//!     let info = DeviceInfo::new("Depth Camera 455", "realsense/D455_0123").with_serial("0123");
//!     let session = DeviceSession::new(Arc::new(bus), info, SessionConfig::default())?;
//!
//!     // Discovery saw the device
//!     session.set_reachable(true)?;
//!     if session.wait_until_ready(Duration::from_secs(5)) {
//!         let value = session.set_option(
//!             &OptionTarget::stream("Depth", "Exposure"),
//!             serde_json::json!(500),
//!         )?;
//!         println!("device committed {}", value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          DeviceSession                              |
//! |   open/close | set/query option | set/query filter | snapshots      |
//! +---------------------------------------------------------------------+
//! |  State machine | Notification router | Assembler | Reply correlator |
//! +---------------------------------------------------------------------+
//! |             Cached model: streams, options, calibration             |
//! +---------------------------------------------------------------------+
//! |          Transport: control writer, notification/metadata           |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`DeviceSession`] | Session with one remote device |
//! | [`SessionState`] | OFFLINE / INITIALIZING / READY |
//! | [`SessionConfig`] | Reply timeout and topic QoS |
//! | [`Stream`] | Stream description with options, filters and intrinsics |
//! | [`Transport`] | Publish/subscribe collaborator consumed by sessions |
//!
//! ## Modules Overview
//!
//! - [`session`] - Device sessions (start here)
//! - [`model`] - Cached device model
//! - [`transport`] - Transport traits and the in-process loopback bus
//! - [`topics`] - Message identifiers and keys
//! - [`events`] - Session events

pub mod config;
pub mod error;
pub mod events;
pub mod guid;
pub mod model;
pub mod session;
pub mod topics;
pub mod transport;

pub use config::{ConfigError, SessionConfig};
pub use error::{Error, Result};
pub use events::{LogEntry, LogSeverity, Notification, SessionEvents, Signal, SubscriptionId};
pub use guid::Guid;
pub use model::{
    DeviceInfo, DeviceOption, EmbeddedFilter, Extrinsics, OpenProfile, Stream, StreamIntrinsics,
    StreamKind, StreamProfile, VideoIntrinsics,
};
pub use session::{DeviceSession, OptionTarget, OptionValues, SessionState};
pub use transport::loopback::LoopbackBus;
pub use transport::{SampleInfo, Subscription, TopicQos, TopicWriter, Transport};
