// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for device session operations.
//!
//! Caller-facing failures (`Timeout`, `DeviceReported`, `NotReady`) are
//! returned to whoever issued the request. Handler-level failures
//! (`Malformed`, `NotFound` inside a bulk update) are logged by the
//! notification router and never escape it.

use crate::config::ConfigError;
use crate::session::SessionState;
use thiserror::Error;

/// Result type for depthlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a remote device
#[derive(Debug, Error)]
pub enum Error {
    /// No correlating reply arrived within the reply timeout
    #[error("timeout waiting for reply #{sequence}")]
    Timeout {
        /// Sequence number of the unanswered request
        sequence: u64,
    },

    /// The device replied with an error status; the explanation is verbatim
    #[error("device error: {0}")]
    DeviceReported(String),

    /// A fragment or reply failed structural validation
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Control request issued while the session is not ready
    #[error("device is not ready (state {state:?})")]
    NotReady {
        /// State the session was in when the call was rejected
        state: SessionState,
    },

    /// Option, filter, parameter or stream name not present
    #[error("{0} not found")]
    NotFound(String),

    /// Caller supplied an invalid request (empty profile list, bad value...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Publish/subscribe failure reported by the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Session settings could not be loaded
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for a [`Error::Malformed`] with a formatted message
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Shorthand for a [`Error::NotFound`] with a formatted message
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True if this is a reply timeout (as opposed to a device-reported error)
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
