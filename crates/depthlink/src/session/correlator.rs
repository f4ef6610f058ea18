// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reply correlation.
//!
//! Requests go out on the session's control writer; the writer's GUID and the
//! delivery sequence number of each request form its identity. The device
//! echoes that identity under `sample` in its reply, which arrives on the
//! notification feed:
//!
//! ```text
//! { "id": "set-option", "sample": ["<guid>", 17], "control": { .. }, "value": 480 }
//! ```
//!
//! Each waiting request owns a ticket: a single-slot channel registered under
//! its sequence number. Tickets are removed by whoever consumes them first,
//! the routed reply or the caller's timeout.

use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::topics::{check_reply, reply};
use crate::transport::TopicWriter;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A request waiting for its reply
#[derive(Debug)]
pub(crate) struct Ticket {
    sequence: u64,
    rx: Receiver<Value>,
}

impl Ticket {
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Outcome of routing an inbound message through the correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// No `control`: an unsolicited notification
    NotAReply,
    /// A reply to another session's request
    Foreign,
    /// Handed to the waiting ticket
    Delivered(u64),
    /// Ours, but nobody is waiting (anymore)
    Unclaimed(u64),
}

pub(crate) struct ReplyCorrelator {
    writer: Arc<dyn TopicWriter>,
    /// sequence number -> reply slot
    tickets: Mutex<HashMap<u64, Sender<Value>>>,
}

impl ReplyCorrelator {
    pub(crate) fn new(writer: Arc<dyn TopicWriter>) -> Self {
        Self {
            writer,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Identity echoed back in replies to our requests
    pub(crate) fn guid(&self) -> Guid {
        self.writer.guid()
    }

    /// Publish without waiting for a reply
    pub(crate) fn post(&self, request: &Value) -> Result<u64> {
        self.writer.write(request)
    }

    /// Publish a request and register its ticket
    pub(crate) fn send(&self, request: &Value) -> Result<Ticket> {
        let (tx, rx) = channel::bounded(1);
        // Held across the write: a fast reply must find the ticket registered
        let mut tickets = self.tickets.lock();
        let sequence = self.writer.write(request)?;
        tickets.insert(sequence, tx);
        Ok(Ticket { sequence, rx })
    }

    /// Block until the ticket's reply arrives or `timeout` expires
    pub(crate) fn wait(&self, ticket: Ticket, timeout: Duration) -> Result<Value> {
        match ticket.rx.recv_timeout(timeout) {
            Ok(reply) => Ok(reply),
            Err(_) => {
                self.tickets.lock().remove(&ticket.sequence);
                // A reply may have slipped in between the timeout and the removal
                ticket.rx.try_recv().map_err(|_| Error::Timeout {
                    sequence: ticket.sequence,
                })
            }
        }
    }

    /// Number of requests still waiting
    pub(crate) fn pending(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Hand a message to its ticket if it is a reply to one of our requests
    pub(crate) fn route(&self, message: Value) -> Result<Routed> {
        if message.get(reply::CONTROL).is_none() {
            return Ok(Routed::NotAReply);
        }
        // ["<prefix>.<entity>", <sequence-number>]
        let sample = message
            .get(reply::SAMPLE)
            .and_then(Value::as_array)
            .filter(|s| s.len() == 2)
            .ok_or_else(|| Error::malformed("reply 'sample' must be [guid, sequence]"))?;
        let origin: Guid = sample[0]
            .as_str()
            .ok_or_else(|| Error::malformed("reply sample guid is not a string"))?
            .parse()
            .map_err(|e| Error::malformed(format!("reply sample guid: {}", e)))?;
        if origin != self.guid() {
            return Ok(Routed::Foreign);
        }
        let sequence = sample[1]
            .as_u64()
            .ok_or_else(|| Error::malformed("reply sample sequence is not a number"))?;

        let waiting = self.tickets.lock().remove(&sequence);
        match waiting {
            Some(tx) => {
                // Capacity 1 and a single sender: never blocks
                let _ = tx.try_send(message);
                Ok(Routed::Delivered(sequence))
            }
            None => {
                // Nobody is waiting, but errors still deserve a log line
                check_reply(&message)?;
                Ok(Routed::Unclaimed(sequence))
            }
        }
    }
}
