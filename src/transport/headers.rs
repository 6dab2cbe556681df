// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Header names used by the transport. All lowercase, as `http` requires.

/// Present (value `1`) on requests and responses whose body is an envelope
pub const ENCRYPTED: &str = "x-gao-encrypted";

/// Identifies which session's keys apply to a request
pub const SESSION_ID: &str = "x-gao-session-id";

/// Mirrors the envelope's `seq` so it is visible without decrypting
pub const SEQUENCE: &str = "x-gao-seq";

/// Value used for the encrypted marker
pub const ENCRYPTED_MARKER: &str = "1";

/// Whether an encrypted-marker header value means "encrypted"
pub fn is_marked_encrypted(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true")
    )
}
