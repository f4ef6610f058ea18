// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session configuration.
//!
//! Supports both programmatic and file-based configuration. The same
//! structure is accepted as a JSON "device settings" object (usually nested
//! under a participant's settings) or as a TOML file:
//!
//! ```toml
//! [control]
//! reply-timeout-ms = 2500
//!
//! [notification]
//! history-depth = 32
//!
//! # Any non-table value disables the metadata subscription
//! metadata = false
//! ```

use crate::transport::{History, Reliability, TopicQos};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the outbound control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ControlSettings {
    /// How long a caller waits for a correlating reply.
    pub reply_timeout_ms: u64,

    /// Writer history depth.
    pub history_depth: u32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 2500,
            history_depth: 10,
        }
    }
}

/// Per-topic QoS overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TopicSettings {
    pub reliability: Option<Reliability>,
    pub history_depth: Option<u32>,
}

impl TopicSettings {
    fn apply(&self, mut qos: TopicQos) -> TopicQos {
        if let Some(reliability) = self.reliability {
            qos.reliability = reliability;
        }
        if let Some(depth) = self.history_depth {
            qos.history = History::KeepLast(depth);
        }
        qos
    }
}

/// The `metadata` setting: a table of QoS overrides, or anything else to
/// disable the metadata subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataSetting {
    Enabled(TopicSettings),
    Disabled(serde_json::Value),
}

/// Device session configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Control writer and reply waiting.
    pub control: ControlSettings,

    /// Unsolicited notification subscription.
    pub notification: TopicSettings,

    /// Metadata subscription; absent means enabled with defaults.
    pub metadata: Option<MetadataSetting>,
}

/// Default history depth for notifications.
///
/// On discovery the device sends a burst of initialization messages; a small
/// history could lose some of them even with reliable delivery.
pub const NOTIFICATION_HISTORY_DEPTH: u32 = 24;

/// Default history depth for metadata (several streams publish concurrently).
pub const METADATA_HISTORY_DEPTH: u32 = 10;

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from a JSON device-settings object.
    ///
    /// `null` yields the defaults; anything other than an object is invalid.
    pub fn from_json(settings: &serde_json::Value) -> Result<Self, ConfigError> {
        if settings.is_null() {
            return Ok(Self::default());
        }
        if !settings.is_object() {
            return Err(ConfigError::Invalid(format!(
                "device settings must be an object: {}",
                settings
            )));
        }
        let config: Self = serde_json::from_value(settings.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.reply_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "control.reply-timeout-ms must be positive".into(),
            ));
        }
        if self.control.history_depth == 0 {
            return Err(ConfigError::Invalid(
                "control.history-depth must be positive".into(),
            ));
        }
        if self.notification.history_depth == Some(0) {
            return Err(ConfigError::Invalid(
                "notification.history-depth must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Reply timeout, fixed for the lifetime of a session.
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.control.reply_timeout_ms)
    }

    /// QoS of the long-lived control writer.
    pub fn control_qos(&self) -> TopicQos {
        TopicQos::reliable().keep_last(self.control.history_depth)
    }

    /// QoS of the notification subscription.
    pub fn notification_qos(&self) -> TopicQos {
        self.notification
            .apply(TopicQos::reliable().keep_last(NOTIFICATION_HISTORY_DEPTH))
    }

    /// QoS of the metadata subscription, or `None` if disabled locally.
    pub fn metadata_qos(&self) -> Option<TopicQos> {
        let qos = TopicQos::best_effort().keep_last(METADATA_HISTORY_DEPTH);
        match &self.metadata {
            None => Some(qos),
            Some(MetadataSetting::Enabled(overrides)) => Some(overrides.apply(qos)),
            Some(MetadataSetting::Disabled(_)) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.reply_timeout(), Duration::from_millis(2500));
        assert_eq!(
            config.notification_qos(),
            TopicQos::reliable().keep_last(NOTIFICATION_HISTORY_DEPTH)
        );
        assert_eq!(
            config.metadata_qos(),
            Some(TopicQos::best_effort().keep_last(METADATA_HISTORY_DEPTH))
        );
    }

    #[test]
    fn test_from_json() {
        let config = SessionConfig::from_json(&json!({
            "control": { "reply-timeout-ms": 100 },
            "notification": { "history-depth": 50 },
            "metadata": { "reliability": "reliable" }
        }))
        .unwrap();
        assert_eq!(config.reply_timeout(), Duration::from_millis(100));
        assert_eq!(config.control.history_depth, 10);
        assert_eq!(config.notification_qos().history, History::KeepLast(50));
        assert_eq!(
            config.metadata_qos().map(|q| q.reliability),
            Some(Reliability::Reliable)
        );
    }

    #[test]
    fn test_metadata_disabled_by_non_object() {
        for disabled in [json!(false), json!("off"), json!(0)] {
            let config = SessionConfig::from_json(&json!({ "metadata": disabled })).unwrap();
            assert!(config.metadata_qos().is_none());
        }
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(SessionConfig::from_json(&json!(null)).is_ok());
        assert!(matches!(
            SessionConfig::from_json(&json!([1, 2])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(SessionConfig::from_json(&json!({ "control": { "reply-timeout-ms": 0 } })).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        std::fs::write(
            &path,
            "metadata = false\n\n[control]\nreply-timeout-ms = 750\n\n[notification]\nreliability = \"best-effort\"\n",
        )
        .unwrap();

        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.reply_timeout(), Duration::from_millis(750));
        assert_eq!(
            config.notification_qos().reliability,
            Reliability::BestEffort
        );
        assert!(config.metadata_qos().is_none());
    }

    #[test]
    fn test_from_file_missing() {
        let err = SessionConfig::from_file("/nonexistent/device.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
