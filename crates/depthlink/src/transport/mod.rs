// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport collaborator interface.
//!
//! A device session never talks to the network directly. It consumes three
//! primitives from whatever publish/subscribe middleware hosts it:
//!
//! - a long-lived [`TopicWriter`] for outbound control requests (its GUID is
//!   the session's stable identity),
//! - [`Transport::subscribe`] for inbound notification and metadata feeds,
//!   each delivered on the transport's own worker thread,
//! - teardown by dropping the returned [`Subscription`].
//!
//! ```text
//! DeviceSession ---- write(control) ----> [ <root>/control ] ----> device
//! DeviceSession <--- on_message --------- [ <root>/notification ] <- device
//! DeviceSession <--- on_message --------- [ <root>/metadata ] <----- device
//! ```
//!
//! [`loopback::LoopbackBus`] implements all of it in-process.

pub mod loopback;

use crate::error::Result;
use crate::guid::Guid;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Reliability QoS policy.
///
/// Determines delivery guarantees for samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reliability {
    /// Fire-and-forget; samples may be dropped when the reader lags
    #[default]
    BestEffort,
    /// Every sample is delivered
    Reliable,
}

/// History QoS policy.
///
/// Determines how many samples to keep in queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep last N samples (bounded queue)
    KeepLast(u32),
    /// Keep all samples
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(1)
    }
}

/// QoS for one topic endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TopicQos {
    pub reliability: Reliability,
    pub history: History,
}

impl TopicQos {
    /// Reliable delivery, keep last 1
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history: History::default(),
        }
    }

    /// Best-effort delivery, keep last 1
    pub fn best_effort() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::default(),
        }
    }

    /// Builder: keep the last `depth` samples
    pub fn keep_last(mut self, depth: u32) -> Self {
        self.history = History::KeepLast(depth);
        self
    }

    /// Builder: keep all samples
    pub fn keep_all(mut self) -> Self {
        self.history = History::KeepAll;
        self
    }
}

/// Delivery information accompanying an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleInfo {
    /// GUID of the writer that published the message
    pub publication_guid: Guid,
    /// Writer-assigned sequence number of the message
    pub sequence_number: u64,
}

/// Callback invoked on the transport's worker thread for each inbound message.
pub type MessageCallback = Box<dyn Fn(Value, SampleInfo) + Send + Sync>;

/// Outbound endpoint on one topic.
pub trait TopicWriter: Send + Sync {
    /// Identity of this writer; stable for the writer's lifetime.
    fn guid(&self) -> Guid;

    /// Topic this writer publishes on.
    fn topic(&self) -> &str;

    /// Publish a message, returning its delivery sequence number.
    ///
    /// Sequence numbers increase monotonically per writer.
    fn write(&self, message: &Value) -> Result<u64>;
}

/// Active inbound subscription. Dropping it unsubscribes.
pub trait Subscription: Send {
    /// Topic this subscription listens on.
    fn topic(&self) -> &str;
}

/// Publish/subscribe middleware hosting device sessions.
pub trait Transport: Send + Sync {
    /// Create a writer on `topic`.
    fn create_writer(&self, topic: &str, qos: TopicQos) -> Result<Arc<dyn TopicWriter>>;

    /// Subscribe to `topic`; `on_message` runs on a transport-owned thread.
    fn subscribe(
        &self,
        topic: &str,
        qos: TopicQos,
        on_message: MessageCallback,
    ) -> Result<Box<dyn Subscription>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_builders() {
        let qos = TopicQos::reliable().keep_last(24);
        assert_eq!(qos.reliability, Reliability::Reliable);
        assert_eq!(qos.history, History::KeepLast(24));

        let qos = TopicQos::best_effort().keep_all();
        assert_eq!(qos.reliability, Reliability::BestEffort);
        assert_eq!(qos.history, History::KeepAll);
    }

    #[test]
    fn test_reliability_serde() {
        let r: Reliability = serde_json::from_str("\"best-effort\"").unwrap();
        assert_eq!(r, Reliability::BestEffort);
        assert_eq!(
            serde_json::to_string(&Reliability::Reliable).unwrap(),
            "\"reliable\""
        );
    }
}
