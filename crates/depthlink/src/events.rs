// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session events and their subscribers.
//!
//! Subscribers are closures called on the thread that raised the event
//! (usually the transport's notification thread). They are invoked outside
//! any session lock, so they may call back into the session, but they should
//! not block for long: the next notification waits for them.

use crate::error::{Error, Result};
use crate::model::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`Signal::subscribe`]
pub type SubscriptionId = u64;

type Slot<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A list of subscribers to one kind of event
pub struct Signal<T> {
    slots: Mutex<Vec<(SubscriptionId, Slot<T>)>>,
    next_id: AtomicU64,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T> Signal<T> {
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber; returns false if it was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        slots.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Call every subscriber; returns false if there were none
    pub fn raise(&self, event: &T) -> bool {
        // Callbacks run unlocked so they can (un)subscribe
        let slots: Vec<Slot<T>> = self.slots.lock().iter().map(|(_, s)| s.clone()).collect();
        for slot in &slots {
            slot(event);
        }
        !slots.is_empty()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.slots.lock().len())
            .finish()
    }
}

/// Severity of a device log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

impl LogSeverity {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "E" => Some(Self::Error),
            "W" => Some(Self::Warning),
            "I" => Some(Self::Info),
            "D" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Error => "E",
            Self::Warning => "W",
            Self::Info => "I",
            Self::Debug => "D",
        }
    }
}

/// One entry of a device `log` notification
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Device timestamp (nanoseconds since epoch)
    pub timestamp: u64,
    pub severity: LogSeverity,
    pub text: String,
    /// Optional structured data; `Null` when absent
    pub data: Value,
}

impl LogEntry {
    /// Parse `[timestamp, "E"|"W"|"I"|"D", text, data?]`
    pub fn from_json(j: &Value) -> Result<Self> {
        let arr = j
            .as_array()
            .filter(|a| a.len() == 3 || a.len() == 4)
            .ok_or_else(|| Error::malformed(format!("log entry must be a 3- or 4-array: {}", j)))?;
        let timestamp = arr[0]
            .as_u64()
            .ok_or_else(|| Error::malformed(format!("log entry timestamp invalid: {}", j)))?;
        let severity = arr[1]
            .as_str()
            .and_then(LogSeverity::from_code)
            .ok_or_else(|| Error::malformed(format!("log entry severity invalid: {}", j)))?;
        let text = arr[2]
            .as_str()
            .ok_or_else(|| Error::malformed(format!("log entry text is not a string: {}", j)))?
            .to_string();
        Ok(Self {
            timestamp,
            severity,
            text,
            data: arr.get(3).cloned().unwrap_or(Value::Null),
        })
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.code(), self.text)?;
        if !self.data.is_null() {
            write!(f, " {}", self.data)?;
        }
        Ok(())
    }
}

/// A dispatched notification, republished after its handler ran
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: String,
    pub message: Value,
}

/// Every event a session raises
#[derive(Debug, Default)]
pub struct SessionEvents {
    /// Well-formed entries of `log` notifications
    pub log: Signal<LogEntry>,
    /// A stream's intrinsics were replaced; carries a snapshot of the stream
    pub calibration_changed: Signal<Stream>,
    /// The device was permanently removed (raised once)
    pub device_removed: Signal<()>,
    /// Documents received on the metadata topic
    pub metadata: Signal<Arc<Value>>,
    /// Every notification, by logical identifier
    pub notification: Signal<Notification>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_signal_subscribe_raise() {
        let signal: Signal<u32> = Signal::default();
        assert!(!signal.raise(&1));

        let total = Arc::new(AtomicUsize::new(0));
        let t = total.clone();
        let id = signal.subscribe(move |v| {
            t.fetch_add(*v as usize, Ordering::SeqCst);
        });
        assert!(signal.raise(&5));
        assert_eq!(total.load(Ordering::SeqCst), 5);

        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        assert!(!signal.raise(&5));
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_itself() {
        let signal = Arc::new(Signal::<()>::default());
        let s = signal.clone();
        let id = Arc::new(AtomicU64::new(0));
        let my_id = id.clone();
        id.store(
            signal.subscribe(move |_| {
                s.unsubscribe(my_id.load(Ordering::SeqCst));
            }),
            Ordering::SeqCst,
        );
        assert!(signal.raise(&()));
        assert!(signal.is_empty());
    }

    #[test]
    fn test_log_entry_parse() {
        let entry =
            LogEntry::from_json(&json!([1700000000000000000u64, "W", "too hot", { "t": 71 }]))
                .unwrap();
        assert_eq!(entry.severity, LogSeverity::Warning);
        assert_eq!(entry.text, "too hot");
        assert_eq!(entry.to_string(), "[W] too hot {\"t\":71}");

        let entry = LogEntry::from_json(&json!([5, "D", "hello"])).unwrap();
        assert!(entry.data.is_null());

        assert!(LogEntry::from_json(&json!([5, "X", "bad severity"])).is_err());
        assert!(LogEntry::from_json(&json!(["now", "E", "bad ts"])).is_err());
        assert!(LogEntry::from_json(&json!([5, "E"])).is_err());
    }
}
