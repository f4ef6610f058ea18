// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process loopback transport.
//!
//! Writers and subscriptions created from the same [`LoopbackBus`] see each
//! other by topic name. Each subscription owns a worker thread fed through a
//! crossbeam channel, so callbacks for one subscription run in publication
//! order while different subscriptions run concurrently.
//!
//! # Delivery
//!
//! - `Reliable`: unbounded queue, nothing is dropped.
//! - `BestEffort`: bounded by the history depth; when the subscriber lags,
//!   new samples are dropped for that subscriber only.
//! - Volatile: subscribers only receive what is published after they joined.

use super::{
    History, MessageCallback, Reliability, SampleInfo, Subscription, TopicQos, TopicWriter,
    Transport,
};
use crate::error::{Error, Result};
use crate::guid::Guid;
use crossbeam::channel::{self, Sender, TrySendError};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

struct Delivery {
    message: Value,
    info: SampleInfo,
}

#[derive(Clone)]
struct SubscriberSlot {
    id: u64,
    tx: Sender<Delivery>,
    reliability: Reliability,
}

struct BusInner {
    /// Subscribers grouped by topic name
    topics: DashMap<String, Vec<SubscriberSlot>>,
    next_subscriber_id: AtomicU64,
    prefix: [u8; 12],
}

impl BusInner {
    fn remove_subscriber(&self, topic: &str, id: u64) {
        if let Some(mut slots) = self.topics.get_mut(topic) {
            slots.retain(|slot| slot.id != id);
        }
    }
}

/// In-process publish/subscribe bus.
///
/// Cheap to clone; clones share the same topic space.
#[derive(Clone)]
pub struct LoopbackBus {
    inner: Arc<BusInner>,
}

impl Default for LoopbackBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBus {
    /// Create a new, empty bus
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: DashMap::new(),
                next_subscriber_id: AtomicU64::new(1),
                prefix: Guid::local_prefix(),
            }),
        }
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics.get(topic).map_or(0, |slots| slots.len())
    }
}

impl Transport for LoopbackBus {
    fn create_writer(&self, topic: &str, _qos: TopicQos) -> Result<Arc<dyn TopicWriter>> {
        Ok(Arc::new(LoopbackWriter {
            guid: Guid::generate(self.inner.prefix),
            topic: topic.to_string(),
            sequence: AtomicU64::new(0),
            bus: Arc::downgrade(&self.inner),
        }))
    }

    fn subscribe(
        &self,
        topic: &str,
        qos: TopicQos,
        on_message: MessageCallback,
    ) -> Result<Box<dyn Subscription>> {
        let (tx, rx) = match (qos.reliability, qos.history) {
            (Reliability::BestEffort, History::KeepLast(depth)) => {
                channel::bounded::<Delivery>(depth.max(1) as usize)
            }
            _ => channel::unbounded::<Delivery>(),
        };
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let stopped = Arc::new(AtomicBool::new(false));

        let worker_stopped = stopped.clone();
        let thread = std::thread::Builder::new()
            .name(format!("loopback-sub-{}", id))
            .spawn(move || {
                // Ends when the bus drops the slot (unsubscribe) and the queue drains
                while let Ok(delivery) = rx.recv() {
                    if worker_stopped.load(Ordering::Acquire) {
                        break;
                    }
                    on_message(delivery.message, delivery.info);
                }
            })
            .map_err(|e| Error::Transport(format!("failed to spawn reader thread: {}", e)))?;

        self.inner
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(SubscriberSlot {
                id,
                tx,
                reliability: qos.reliability,
            });
        log::debug!("[LoopbackBus] subscriber #{} joined '{}'", id, topic);

        Ok(Box::new(LoopbackSubscription {
            topic: topic.to_string(),
            id,
            bus: Arc::downgrade(&self.inner),
            stopped,
            thread: Some(thread),
        }))
    }
}

/// Writer half of the loopback bus
struct LoopbackWriter {
    guid: Guid,
    topic: String,
    sequence: AtomicU64,
    bus: Weak<BusInner>,
}

impl TopicWriter for LoopbackWriter {
    fn guid(&self) -> Guid {
        self.guid
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn write(&self, message: &Value) -> Result<u64> {
        let bus = self
            .bus
            .upgrade()
            .ok_or_else(|| Error::Transport("bus has been dropped".to_string()))?;
        let sequence_number = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let info = SampleInfo {
            publication_guid: self.guid,
            sequence_number,
        };

        // Snapshot the subscriber list so no shard lock is held while sending
        let slots = bus
            .topics
            .get(&self.topic)
            .map(|slots| slots.value().clone())
            .unwrap_or_default();
        for slot in slots {
            let delivery = Delivery {
                message: message.clone(),
                info,
            };
            match slot.reliability {
                Reliability::Reliable => {
                    // Receiver only disappears while unsubscribing
                    let _ = slot.tx.send(delivery);
                }
                Reliability::BestEffort => match slot.tx.try_send(delivery) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                    Err(TrySendError::Full(_)) => {
                        log::trace!(
                            "[LoopbackBus] subscriber #{} lagging on '{}', sample #{} dropped",
                            slot.id,
                            self.topic,
                            sequence_number
                        );
                    }
                },
            }
        }
        Ok(sequence_number)
    }
}

/// Subscription handle; dropping it stops the worker thread
struct LoopbackSubscription {
    topic: String,
    id: u64,
    bus: Weak<BusInner>,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Subscription for LoopbackSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for LoopbackSubscription {
    fn drop(&mut self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(bus) = self.bus.upgrade() {
            bus.remove_subscriber(&self.topic, self.id);
        }
        if let Some(thread) = self.thread.take() {
            // Dropped from inside our own callback: the loop exits on its own
            if thread.thread().id() == std::thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                log::warn!("[LoopbackBus] subscriber #{} thread panicked", self.id);
            }
        }
        log::debug!("[LoopbackBus] subscriber #{} left '{}'", self.id, self.topic);
    }
}
