// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Notification router.
//!
//! Every inbound message is looked up by its logical identifier in a fixed
//! handler table; unknown identifiers are ignored. A message that is also a
//! reply to one of our requests is then handed to the reply correlator, so
//! the cached model is updated before the waiting caller wakes up.
//!
//! Handlers run under the session lock and return `Result<()>`; an error is
//! logged here and goes no further.

use super::correlator::Routed;
use super::{assembler, calibration, control, Effects, SessionCore, Shared};
use crate::error::{Error, Result};
use crate::events::{LogEntry, Notification};
use crate::topics::{self, notification, reply, str_field};
use crate::transport::SampleInfo;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

type Handler = fn(&Shared, &mut SessionCore, &Value, &SampleInfo, &mut Effects) -> Result<()>;

fn handlers() -> &'static HashMap<&'static str, Handler> {
    static HANDLERS: OnceLock<HashMap<&'static str, Handler>> = OnceLock::new();
    HANDLERS.get_or_init(|| {
        let mut table: HashMap<&'static str, Handler> = HashMap::new();
        table.insert(topics::control::set_option::ID, control::on_set_option);
        // Same handling as set-option: the reply carries the value
        table.insert(topics::control::query_option::ID, control::on_set_option);
        table.insert(topics::control::query_options::ID, control::on_query_options);
        table.insert(topics::control::set_filter::ID, control::on_set_filter);
        table.insert(topics::control::query_filter::ID, control::on_query_filter);
        table.insert(notification::device_header::ID, assembler::on_device_header);
        table.insert(notification::device_options::ID, assembler::on_device_options);
        table.insert(notification::stream_header::ID, assembler::on_stream_header);
        table.insert(notification::stream_options::ID, assembler::on_stream_options);
        table.insert(notification::log::ID, on_log);
        table.insert(
            notification::calibration_changed::ID,
            calibration::on_calibration_changed,
        );
        table
    })
}

/// Logical identifier: a reply is identified by the request it answers
fn message_id(message: &Value) -> Result<&str> {
    let source = match (message.get(reply::CONTROL), message.get(reply::SAMPLE)) {
        (Some(control), Some(_)) => control,
        _ => message,
    };
    str_field(source, topics::ID)
}

impl Shared {
    /// Entry point for the notification subscription
    pub(super) fn on_notification(&self, epoch: u64, message: Value, info: SampleInfo) {
        match message {
            Value::Array(batch) => {
                for message in batch {
                    self.on_message(epoch, message, &info);
                }
            }
            message => self.on_message(epoch, message, &info),
        }
    }

    fn on_message(&self, epoch: u64, message: Value, info: &SampleInfo) {
        match message_id(&message) {
            Ok(id) => {
                let id = id.to_string();
                self.update(|shared, core, fx| {
                    // A feed from before the last reset
                    if core.epoch != epoch {
                        return;
                    }
                    if let Some(handler) = handlers().get(id.as_str()) {
                        if let Err(e) = handler(shared, core, &message, info, fx) {
                            log::debug!(
                                "[DeviceSession {}] notification error: {}\n    {}",
                                shared.name,
                                e,
                                message
                            );
                            return;
                        }
                    }
                    // Unknown ids are republished too; failed ones are not
                    if !shared.events.notification.is_empty() {
                        fx.notifications.push(Notification {
                            id,
                            message: message.clone(),
                        });
                    }
                });
            }
            Err(e) => {
                log::debug!(
                    "[DeviceSession {}] notification error: {}\n    {}",
                    self.name,
                    e,
                    message
                );
            }
        }

        // Maybe someone's waiting on it
        match self.correlator.route(message) {
            Ok(Routed::Delivered(sequence)) => {
                log::trace!("[DeviceSession {}] reply #{} delivered", self.name, sequence);
            }
            Ok(Routed::Unclaimed(sequence)) => {
                log::debug!(
                    "[DeviceSession {}] reply #{} arrived with nobody waiting",
                    self.name,
                    sequence
                );
            }
            Ok(Routed::NotAReply | Routed::Foreign) => {}
            Err(e) => {
                log::debug!("[DeviceSession {}] reply error: {}", self.name, e);
            }
        }
    }

    /// Entry point for the metadata subscription
    pub(super) fn on_metadata(&self, message: Value) {
        if self.events.metadata.is_empty() {
            return;
        }
        self.events.metadata.raise(&Arc::new(message));
    }
}

/// `log`: a batch of entries, each validated on its own
fn on_log(
    shared: &Shared,
    _core: &mut SessionCore,
    j: &Value,
    _info: &SampleInfo,
    fx: &mut Effects,
) -> Result<()> {
    let entries = j
        .get(notification::log::ENTRIES)
        .ok_or_else(|| Error::malformed("log entries not found"))?
        .as_array()
        .ok_or_else(|| Error::malformed("log entries not an array"))?;
    for (x, entry) in entries.iter().enumerate() {
        match LogEntry::from_json(entry) {
            Ok(entry) => fx.log_entries.push(entry),
            Err(e) => {
                log::debug!(
                    "[DeviceSession {}] log entry {}: {}\n{}",
                    shared.name,
                    x,
                    e,
                    entry
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_id() {
        assert_eq!(message_id(&json!({ "id": "log" })).unwrap(), "log");
        let reply = json!({
            "id": "ignored",
            "sample": ["0102030405060708090a0b0c.00000002", 3],
            "control": { "id": "set-option" }
        });
        assert_eq!(message_id(&reply).unwrap(), "set-option");
        // Without a sample, `control` is just a field
        assert_eq!(
            message_id(&json!({ "id": "x", "control": { "id": "y" } })).unwrap(),
            "x"
        );
        assert!(message_id(&json!({ "entries": [] })).is_err());
    }

    #[test]
    fn test_table_covers_known_ids() {
        for id in [
            "device-header",
            "device-options",
            "stream-header",
            "stream-options",
            "log",
            "calibration-changed",
            "set-option",
            "query-option",
            "query-options",
            "set-filter",
            "query-filter",
        ] {
            assert!(handlers().contains_key(id), "no handler for {}", id);
        }
        assert!(!handlers().contains_key("open-streams"));
    }
}
