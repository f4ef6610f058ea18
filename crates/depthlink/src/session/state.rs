// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection state machine.
//!
//! ```text
//!            reachable            description complete
//! OFFLINE ---------------> INITIALIZING ---------------> READY
//!    ^                          |                          |
//!    +------- unreachable ------+---------- unreachable ---+
//! ```
//!
//! The control writer survives every transition; the notification and
//! metadata subscriptions do not.

use super::{Effects, SessionCore, Shared};
use crate::error::Result;
use crate::topics::{METADATA_TOPIC_NAME, NOTIFICATION_TOPIC_NAME};
use crate::transport::Subscription;
use std::fmt;

/// Lifecycle state of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Device not reachable; nothing cached
    Offline,
    /// Subscribed, assembling the device description
    Initializing,
    /// Fully described; control calls are accepted
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Offline => "OFFLINE",
            Self::Initializing => "INITIALIZING",
            Self::Ready => "READY",
        })
    }
}

impl Shared {
    /// Enter `new_state`. Entering the current state does nothing.
    pub(super) fn set_state(
        &self,
        core: &mut SessionCore,
        new_state: SessionState,
        fx: &mut Effects,
    ) -> Result<()> {
        if core.state == new_state {
            return Ok(());
        }

        match new_state {
            SessionState::Offline => {
                // Keep the control writer: it carries our identity
                fx.released.extend(core.notification_sub.take());
                fx.released.extend(core.metadata_sub.take());
                core.epoch += 1;
                core.reset();
            }
            SessionState::Initializing => {
                if core.notification_sub.is_none() {
                    core.notification_sub = Some(self.subscribe_notifications(core.epoch)?);
                }
            }
            SessionState::Ready => {
                self.start_metadata(core);
                for dangling in core.assembler.finish() {
                    log::debug!(
                        "[DeviceSession {}] discarding stream-options for '{}': no stream-header",
                        self.name,
                        dangling
                    );
                }
                fx.became_ready = true;
                log::debug!("[DeviceSession {}] device is ready", self.name);
            }
        }

        log::debug!(
            "[DeviceSession {}] {} -> {}",
            self.name,
            core.state,
            new_state
        );
        core.state = new_state;
        Ok(())
    }

    fn subscribe_notifications(&self, epoch: u64) -> Result<Box<dyn Subscription>> {
        let weak = self.weak_self.clone();
        self.transport.subscribe(
            &self.info.topic(NOTIFICATION_TOPIC_NAME),
            self.config.notification_qos(),
            Box::new(move |message, info| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_notification(epoch, message, info);
                }
            }),
        )
    }

    fn start_metadata(&self, core: &mut SessionCore) {
        if !core.metadata_available || core.metadata_sub.is_some() {
            return;
        }
        let Some(qos) = self.config.metadata_qos() else {
            log::debug!(
                "[DeviceSession {}] ... metadata is available but device/metadata is disabled",
                self.name
            );
            return;
        };

        let weak = self.weak_self.clone();
        match self.transport.subscribe(
            &self.info.topic(METADATA_TOPIC_NAME),
            qos,
            Box::new(move |message, _| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_metadata(message);
                }
            }),
        ) {
            Ok(sub) => {
                core.metadata_sub = Some(sub);
                log::debug!("[DeviceSession {}] ... metadata is enabled", self.name);
            }
            Err(e) => {
                log::error!(
                    "[DeviceSession {}] failed to subscribe to metadata: {}",
                    self.name,
                    e
                );
            }
        }
    }

    /// Move to READY once the description is complete
    pub(super) fn check_ready(&self, core: &mut SessionCore, fx: &mut Effects) -> Result<()> {
        if core.state == SessionState::Initializing && core.assembler.is_complete() {
            self.set_state(core, SessionState::Ready, fx)?;
        }
        Ok(())
    }
}
