// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-End Encryption Primitives
//!
//! - **Envelope**: AES-256-GCM with a 12-byte random IV, 16-byte detached tag
//!   and the sequence number bound as AAD
//! - **Key exchange**: ephemeral X25519 on both sides, HKDF-SHA256 expansion
//!   into an encryption key and a MAC key
//! - **Ratchet**: one-way HKDF step used for periodic key rotation
//! - **Keys**: `SessionKey`, a 32-byte buffer zeroized on drop
//!
//! ## Security Considerations
//!
//! - A fresh random IV is drawn for every encryption; an `(key, iv)` pair is
//!   never reused
//! - Authentication failures surface as a single `DecryptionFailed` variant
//! - Key bytes are never logged, serialized or placed in error messages

pub mod encoding;
pub mod envelope;
pub mod error;
pub mod key_exchange;
pub mod keys;
pub mod ratchet;

pub use encoding::{decode_b64url, encode_b64url};
pub use envelope::{decrypt, encrypt, parse, serialize, Envelope, IV_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use key_exchange::{parse_public_key, DerivedKeys, EphemeralKeyPair, PUBLIC_KEY_SIZE};
pub use keys::{SessionKey, KEY_SIZE};
pub use ratchet::ratchet;
