// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Originator identity for writers on the message bus.
//!
//! Every writer (a session's control writer, a device's notification writer)
//! has a 16-byte GUID. Replies echo the requesting writer's GUID as a string
//! so a session can tell its own replies from those addressed to other
//! sessions sharing the same transport.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

/// 16-byte writer identifier
///
/// # Structure
/// - Prefix: 12 bytes (participant unique)
/// - Entity ID: 4 bytes (writer within participant)
///
/// # String Format
/// Hex prefix, a dot, hex entity: `"010faf31ac07879500000000.00000203"`
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Guid {
    pub prefix: [u8; 12],
    pub entity_id: [u8; 4],
}

static ENTITY_COUNTER: AtomicU32 = AtomicU32::new(1);

impl Guid {
    /// Create GUID from separate prefix and entity ID
    pub fn new(prefix: [u8; 12], entity_id: [u8; 4]) -> Self {
        Self { prefix, entity_id }
    }

    /// Create GUID with all zeros (invalid/placeholder)
    pub fn zero() -> Self {
        Self::default()
    }

    /// Check if GUID is zero (invalid)
    pub fn is_zero(&self) -> bool {
        self.prefix.iter().all(|&b| b == 0) && self.entity_id.iter().all(|&b| b == 0)
    }

    /// Generate a process-unique GUID sharing `prefix`
    ///
    /// Entity IDs come from a process-wide counter, so two calls with the same
    /// prefix never collide.
    pub fn generate(prefix: [u8; 12]) -> Self {
        let entity = ENTITY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            prefix,
            entity_id: entity.to_be_bytes(),
        }
    }

    /// Derive a participant prefix from the current time and process id
    pub fn local_prefix() -> [u8; 12] {
        use std::time::{SystemTime, UNIX_EPOCH};

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut prefix = [0u8; 12];
        prefix[0..8].copy_from_slice(&(nanos as u64).to_be_bytes());
        prefix[8..12].copy_from_slice(&std::process::id().to_be_bytes());
        prefix
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.prefix {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ".")?;
        for byte in &self.entity_id {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

/// Error parsing a GUID string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGuidError(String);

impl fmt::Display for ParseGuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid GUID '{}'", self.0)
    }
}

impl std::error::Error for ParseGuidError {}

fn parse_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 || !s.is_ascii() {
        return None;
    }
    let mut out = [0u8; N];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGuidError(s.to_string());
        let (prefix, entity) = s.split_once('.').ok_or_else(err)?;
        Ok(Self {
            prefix: parse_hex::<12>(prefix).ok_or_else(err)?,
            entity_id: parse_hex::<4>(entity).ok_or_else(err)?,
        })
    }
}
