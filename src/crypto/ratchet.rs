// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! One-way key ratchet
//!
//! `next = HKDF-SHA256(salt = current, ikm = current, info = "gao-e2ee/v1/ratchet")`
//!
//! Knowing `next` does not reveal `current`. The caller is expected to drop
//! (and thereby zeroize) the superseded key once the successor exists.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::CryptoError;
use super::keys::{SessionKey, KEY_SIZE};

/// HKDF info for rotation, distinct from the handshake contexts
pub const RATCHET_INFO: &[u8] = b"gao-e2ee/v1/ratchet";

/// Derive the successor of `current`
pub fn ratchet(current: &SessionKey) -> Result<SessionKey, CryptoError> {
    let bytes = current.as_bytes();
    let hkdf = Hkdf::<Sha256>::new(Some(bytes), bytes);

    let mut next = [0u8; KEY_SIZE];
    hkdf.expand(RATCHET_INFO, &mut next)?;

    let key = SessionKey::from_bytes(next);
    next.zeroize();
    Ok(key)
}
