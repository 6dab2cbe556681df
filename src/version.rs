// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the GAO E2EE transport

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-e2ee-transport-2025-11-04";

/// Semantic version number
pub const VERSION_NUMBER: &str = "0.1.0";

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Build date
pub const BUILD_DATE: &str = "2025-11-04";

/// Wire protocol identifier, also the HKDF info prefix
pub const PROTOCOL_VERSION: &str = "gao-e2ee/v1";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "x25519-handshake",
    "hkdf-sha256",
    "aes-256-gcm-envelopes",
    "seq-bound-aad",
    "key-ratchet",
    "count-and-time-rotation",
    "replay-protection",
    "ttl-session-expiry",
    "per-session-locking",
    "prometheus-metrics",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("GAO E2EE {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "protocol": PROTOCOL_VERSION,
        "features": FEATURES,
    })
}
