// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport configuration
//!
//! Every field is optional in TOML and in the environment; missing values fall
//! back to the defaults below.
//!
//! | key | env | default |
//! |---|---|---|
//! | `enabled` | `GAO_E2EE_ENABLED` | `true` |
//! | `store` | `GAO_E2EE_STORE` | `memory` |
//! | `key_rotation_interval_ms` | `GAO_E2EE_KEY_ROTATION_INTERVAL_MS` | 3 600 000 |
//! | `max_requests_before_rotation` | `GAO_E2EE_MAX_REQUESTS_BEFORE_ROTATION` | 10 000 |
//! | `session_ttl_ms` | `GAO_E2EE_SESSION_TTL_MS` | 86 400 000 |
//! | `excluded_paths` | `GAO_E2EE_EXCLUDED_PATHS` (comma separated) | none |
//! | `handshake_path` | `GAO_E2EE_HANDSHAKE_PATH` | `/gao/handshake` |
//! | `enforce_encryption` | `GAO_E2EE_ENFORCE_ENCRYPTION` | `false` |
//! | `enforce_sequence` | `GAO_E2EE_ENFORCE_SEQUENCE` | `true` |
//! | `sweep_interval_ms` | `GAO_E2EE_SWEEP_INTERVAL_MS` | 60 000 |
//! | `max_body_bytes` | `GAO_E2EE_MAX_BODY_BYTES` | 2 MiB |

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HANDSHAKE_PATH: &str = "/gao/handshake";
pub const DEFAULT_KEY_ROTATION_INTERVAL_MS: u64 = 3_600_000;
pub const DEFAULT_MAX_REQUESTS_BEFORE_ROTATION: u64 = 10_000;
pub const DEFAULT_SESSION_TTL_MS: u64 = 86_400_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

const ENV_PREFIX: &str = "GAO_E2EE_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Which session store backs the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eeConfig {
    pub enabled: bool,
    pub store: StoreKind,
    #[serde(alias = "keyRotationIntervalMs")]
    pub key_rotation_interval_ms: u64,
    #[serde(alias = "maxRequestsBeforeRotation")]
    pub max_requests_before_rotation: u64,
    #[serde(alias = "sessionTtlMs")]
    pub session_ttl_ms: u64,
    #[serde(alias = "excludedPaths")]
    pub excluded_paths: Vec<String>,
    #[serde(alias = "handshakePath")]
    pub handshake_path: String,
    #[serde(alias = "enforceEncryption")]
    pub enforce_encryption: bool,
    #[serde(alias = "enforceSequence")]
    pub enforce_sequence: bool,
    #[serde(alias = "sweepIntervalMs")]
    pub sweep_interval_ms: u64,
    #[serde(alias = "maxBodyBytes")]
    pub max_body_bytes: usize,
}

impl Default for E2eeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: StoreKind::Memory,
            key_rotation_interval_ms: DEFAULT_KEY_ROTATION_INTERVAL_MS,
            max_requests_before_rotation: DEFAULT_MAX_REQUESTS_BEFORE_ROTATION,
            session_ttl_ms: DEFAULT_SESSION_TTL_MS,
            excluded_paths: Vec::new(),
            handshake_path: DEFAULT_HANDSHAKE_PATH.to_string(),
            enforce_encryption: false,
            enforce_sequence: true,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl E2eeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overlaid with `GAO_E2EE_*` variables from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Overlay values produced by `lookup` (keyed by full variable name)
    pub fn overlay_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("ENABLED") {
            self.enabled = parse_bool("ENABLED", &v)?;
        }
        if let Some(v) = get("STORE") {
            self.store = match v.to_lowercase().as_str() {
                "memory" => StoreKind::Memory,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "STORE".to_string(),
                        reason: format!("unknown store '{}'", other),
                    })
                }
            };
        }
        if let Some(v) = get("KEY_ROTATION_INTERVAL_MS") {
            self.key_rotation_interval_ms = parse_num("KEY_ROTATION_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("MAX_REQUESTS_BEFORE_ROTATION") {
            self.max_requests_before_rotation = parse_num("MAX_REQUESTS_BEFORE_ROTATION", &v)?;
        }
        if let Some(v) = get("SESSION_TTL_MS") {
            self.session_ttl_ms = parse_num("SESSION_TTL_MS", &v)?;
        }
        if let Some(v) = get("EXCLUDED_PATHS") {
            self.excluded_paths = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("HANDSHAKE_PATH") {
            self.handshake_path = v;
        }
        if let Some(v) = get("ENFORCE_ENCRYPTION") {
            self.enforce_encryption = parse_bool("ENFORCE_ENCRYPTION", &v)?;
        }
        if let Some(v) = get("ENFORCE_SEQUENCE") {
            self.enforce_sequence = parse_bool("ENFORCE_SEQUENCE", &v)?;
        }
        if let Some(v) = get("SWEEP_INTERVAL_MS") {
            self.sweep_interval_ms = parse_num("SWEEP_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("MAX_BODY_BYTES") {
            self.max_body_bytes = parse_num("MAX_BODY_BYTES", &v)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if self.key_rotation_interval_ms == 0 {
            return Err(invalid("key_rotation_interval_ms", "must be greater than zero"));
        }
        if self.max_requests_before_rotation == 0 {
            return Err(invalid("max_requests_before_rotation", "must be greater than zero"));
        }
        if self.session_ttl_ms == 0 {
            return Err(invalid("session_ttl_ms", "must be greater than zero"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(invalid("sweep_interval_ms", "must be greater than zero"));
        }
        if !self.handshake_path.starts_with('/') {
            return Err(invalid("handshake_path", "must start with '/'"));
        }
        if self.is_excluded(&self.handshake_path) {
            return Err(invalid("handshake_path", "must not be covered by excluded_paths"));
        }
        Ok(())
    }

    /// Whether `path` falls under one of the excluded prefixes
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected a number, got '{}'", value),
    })
}
