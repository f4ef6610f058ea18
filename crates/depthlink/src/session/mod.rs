// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device sessions.
//!
//! A [`DeviceSession`] tracks one remote device over the message bus. It
//! assembles the device description from the notification burst the device
//! publishes on discovery, keeps the cached model (streams, options,
//! extrinsics) current as notifications arrive, and offers blocking control
//! calls on top of fire-and-forget messaging.
//!
//! # Threads
//!
//! Notifications are handled on the transport's subscription thread, under a
//! single session-wide lock. Control calls run on the caller's thread and
//! only block on their reply ticket, never on the session lock. Events are
//! raised after the lock is released.
//!
//! # Cancellation
//!
//! Losing the device does not wake callers blocked on a reply; they return
//! with [`Error::Timeout`](crate::Error::Timeout) once the reply timeout
//! expires.

mod assembler;
mod calibration;
mod control;
mod correlator;
mod dispatch;
mod state;


pub use control::{OptionTarget, OptionValues};
pub use state::SessionState;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::{LogEntry, Notification, SessionEvents, SubscriptionId};
use crate::guid::Guid;
use crate::model::{DeviceInfo, DeviceOption, Extrinsics, OpenProfile, Stream};
use crate::topics::CONTROL_TOPIC_NAME;
use crate::transport::{Subscription, Transport};
use assembler::Assembler;
use correlator::ReplyCorrelator;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Everything learned from the device, guarded by the session lock
pub(crate) struct SessionCore {
    state: SessionState,
    /// Bumped on every reset; feeds from an older cycle are ignored
    epoch: u64,
    server_guid: Option<Guid>,
    streams: HashMap<String, Stream>,
    options: Vec<DeviceOption>,
    extrinsics: HashMap<(String, String), Extrinsics>,
    assembler: Assembler,
    open_profiles: Vec<OpenProfile>,
    /// Some stream header declared metadata support
    metadata_available: bool,
    notification_sub: Option<Box<dyn Subscription>>,
    metadata_sub: Option<Box<dyn Subscription>>,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            state: SessionState::Offline,
            epoch: 0,
            server_guid: None,
            streams: HashMap::new(),
            options: Vec::new(),
            extrinsics: HashMap::new(),
            assembler: Assembler::default(),
            open_profiles: Vec::new(),
            metadata_available: false,
            notification_sub: None,
            metadata_sub: None,
        }
    }

    /// Forget everything learned from the device
    fn reset(&mut self) {
        self.server_guid = None;
        self.streams.clear();
        self.options.clear();
        self.extrinsics.clear();
        self.assembler.reset();
        self.open_profiles.clear();
        self.metadata_available = false;
    }
}

/// Work deferred until the session lock is released
#[derive(Default)]
pub(crate) struct Effects {
    /// Subscriptions to tear down (dropping one joins its reader thread)
    released: Vec<Box<dyn Subscription>>,
    log_entries: Vec<LogEntry>,
    calibrated: Vec<Stream>,
    notifications: Vec<Notification>,
    became_ready: bool,
    removed: bool,
}

pub(crate) struct Shared {
    weak_self: Weak<Shared>,
    name: String,
    info: DeviceInfo,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    reply_timeout: Duration,
    correlator: ReplyCorrelator,
    core: Mutex<SessionCore>,
    ready_cv: Condvar,
    events: SessionEvents,
    removed: AtomicBool,
}

impl Shared {
    /// Run `f` under the session lock, then apply its effects
    fn update<R>(&self, f: impl FnOnce(&Shared, &mut SessionCore, &mut Effects) -> R) -> R {
        let mut fx = Effects::default();
        let result = {
            let mut core = self.core.lock();
            f(self, &mut core, &mut fx)
        };
        self.release(fx);
        result
    }

    fn release(&self, fx: Effects) {
        drop(fx.released);
        if fx.became_ready {
            self.ready_cv.notify_all();
        }
        for entry in &fx.log_entries {
            if !self.events.log.raise(entry) {
                log::debug!(
                    "[DeviceSession {}][{}][{}] {}",
                    self.name,
                    entry.timestamp,
                    entry.severity.code(),
                    entry.text.trim_end_matches('\n')
                );
            }
        }
        for stream in &fx.calibrated {
            self.events.calibration_changed.raise(stream);
        }
        for notification in &fx.notifications {
            self.events.notification.raise(notification);
        }
        if fx.removed {
            self.events.device_removed.raise(&());
        }
    }
}

/// Session with one remote device.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct DeviceSession {
    shared: Arc<Shared>,
}

impl DeviceSession {
    /// Create a session for a discovered device.
    ///
    /// The control writer is created immediately and lives as long as the
    /// session, so the session's identity survives reconnects. The session
    /// starts [`SessionState::Offline`]; call [`DeviceSession::set_reachable`]
    /// to start initialization.
    pub fn new(
        transport: Arc<dyn Transport>,
        info: DeviceInfo,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let writer =
            transport.create_writer(&info.topic(CONTROL_TOPIC_NAME), config.control_qos())?;
        let name = info.debug_name().to_string();
        log::debug!(
            "[DeviceSession {}] created on '{}', control writer {}",
            name,
            info.topic_root,
            writer.guid()
        );
        let shared = Arc::new_cyclic(|weak_self| Shared {
            weak_self: weak_self.clone(),
            name,
            reply_timeout: config.reply_timeout(),
            info,
            transport,
            config,
            correlator: ReplyCorrelator::new(writer),
            core: Mutex::new(SessionCore::new()),
            ready_cv: Condvar::new(),
            events: SessionEvents::default(),
            removed: AtomicBool::new(false),
        });
        Ok(Self { shared })
    }

    /// Feed a reachability change from discovery.
    ///
    /// Regaining the device moves an offline session to
    /// [`SessionState::Initializing`]; losing it moves any session to
    /// [`SessionState::Offline`], clearing everything learned from it.
    pub fn set_reachable(&self, reachable: bool) -> Result<()> {
        if reachable && self.shared.removed.load(Ordering::Acquire) {
            log::debug!(
                "[DeviceSession {}] removed; ignoring reachability",
                self.shared.name
            );
            return Ok(());
        }
        self.shared.update(|shared, core, fx| {
            if !reachable {
                shared.set_state(core, SessionState::Offline, fx)
            } else if core.state == SessionState::Offline {
                shared.set_state(core, SessionState::Initializing, fx)
            } else {
                Ok(())
            }
        })
    }

    /// The device is gone for good: go offline and raise `device_removed` once
    pub fn remove(&self) {
        if self.shared.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.update(|shared, core, fx| {
            if let Err(e) = shared.set_state(core, SessionState::Offline, fx) {
                log::debug!("[DeviceSession {}] remove: {}", shared.name, e);
            }
            fx.removed = true;
        });
        log::debug!("[DeviceSession {}] removed", self.shared.name);
    }

    pub fn is_removed(&self) -> bool {
        self.shared.removed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SessionState {
        self.shared.core.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Block until the session is ready; false on timeout
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut core = self.shared.core.lock();
        while core.state != SessionState::Ready {
            if self
                .shared
                .ready_cv
                .wait_until(&mut core, deadline)
                .timed_out()
            {
                return core.state == SessionState::Ready;
            }
        }
        true
    }

    /// Our own identity, echoed in replies to our requests
    pub fn guid(&self) -> Guid {
        self.shared.correlator.guid()
    }

    /// Identity of the device's notification writer, once known
    pub fn server_guid(&self) -> Option<Guid> {
        self.shared.core.lock().server_guid
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.shared.info
    }

    pub fn debug_name(&self) -> &str {
        &self.shared.name
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Reply timeout, fixed at construction
    pub fn reply_timeout(&self) -> Duration {
        self.shared.reply_timeout
    }

    /// Snapshot of all streams, sorted by name
    pub fn streams(&self) -> Vec<Stream> {
        let core = self.shared.core.lock();
        let mut streams: Vec<Stream> = core.streams.values().cloned().collect();
        streams.sort_by(|a, b| a.name().cmp(b.name()));
        streams
    }

    pub fn stream(&self, name: &str) -> Option<Stream> {
        self.shared.core.lock().streams.get(name).cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.shared.core.lock().streams.len()
    }

    /// Snapshot of device-level options, in declaration order
    pub fn options(&self) -> Vec<DeviceOption> {
        self.shared.core.lock().options.clone()
    }

    pub fn option(&self, name: &str) -> Option<DeviceOption> {
        let core = self.shared.core.lock();
        crate::model::option::find_option(&core.options, name).cloned()
    }

    /// Transform from one stream's frame to another's
    pub fn extrinsics(&self, from: &str, to: &str) -> Option<Extrinsics> {
        self.shared
            .core
            .lock()
            .extrinsics
            .get(&(from.to_string(), to.to_string()))
            .copied()
    }

    /// Profiles currently open, in the order they were opened
    pub fn open_profiles(&self) -> Vec<OpenProfile> {
        self.shared.core.lock().open_profiles.clone()
    }

    pub fn events(&self) -> &SessionEvents {
        &self.shared.events
    }

    pub fn on_log<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.shared.events.log.subscribe(callback)
    }

    pub fn on_calibration_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Stream) + Send + Sync + 'static,
    {
        self.shared.events.calibration_changed.subscribe(callback)
    }

    pub fn on_device_removed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.shared.events.device_removed.subscribe(callback)
    }

    pub fn on_metadata<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Arc<Value>) + Send + Sync + 'static,
    {
        self.shared.events.metadata.subscribe(callback)
    }

    pub fn on_notification<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.events.notification.subscribe(callback)
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.shared.name)
            .field("guid", &self.guid())
            .field("state", &self.state())
            .finish()
    }
}
