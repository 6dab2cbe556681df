// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Envelope Codec (AES-256-GCM)
//!
//! Stateless authenticated encryption of one message body into a
//! self-describing envelope, and back.
//!
//! **Wire Format** (JSON body of any encrypted request or response):
//! ```text
//! { "iv": b64url(12 bytes), "tag": b64url(16 bytes), "data": b64url(ciphertext), "seq": integer }
//! ```
//!
//! - IV: 12 random bytes per encryption call
//! - Tag: 16-byte GCM authentication tag, carried separately from `data`
//! - AAD: decimal string of `seq`, UTF-8 encoded
//!
//! Binding `seq` as AAD means a ciphertext cannot be spliced onto a different
//! sequence number without failing authentication.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use serde_json::{json, Value};

use super::encoding::{decode_b64url, encode_b64url};
use super::error::CryptoError;
use super::keys::KEY_SIZE;

/// AES-GCM nonce size
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// One encrypted message
///
/// Fields are private so an envelope cannot be edited after it is produced;
/// the only way to get one is `encrypt` or `parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_SIZE],
    tag: [u8; TAG_SIZE],
    data: Vec<u8>,
    seq: u64,
}

impl Envelope {
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    pub fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }

    /// Ciphertext, same length as the plaintext
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Build an envelope from raw parts without any cryptographic check
    ///
    /// Used by tests and by transports that carry the fields some other way.
    pub fn from_parts(iv: [u8; IV_SIZE], tag: [u8; TAG_SIZE], data: Vec<u8>, seq: u64) -> Self {
        Self { iv, tag, data, seq }
    }
}

fn aad_for(seq: u64) -> Vec<u8> {
    seq.to_string().into_bytes()
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey {
            key_type: "session_key".to_string(),
            reason: format!("expected {} bytes, got {}", KEY_SIZE, key.len()),
        });
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey {
        key_type: "session_key".to_string(),
        reason: e.to_string(),
    })
}

/// Encrypt `plaintext` under `key`, binding `seq` as associated data
///
/// # Errors
///
/// - `InvalidKey` if `key` is not exactly 32 bytes
/// - `EncryptionFailed` if the cipher rejects the input (payload too large for GCM)
pub fn encrypt(plaintext: &[u8], key: &[u8], seq: u64) -> Result<Envelope, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let mut data = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), &aad_for(seq), &mut data)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Envelope {
        iv,
        tag: tag_bytes,
        data,
        seq,
    })
}

/// Verify and decrypt `envelope` under `key`
///
/// The envelope is borrowed and never modified.
///
/// # Errors
///
/// - `InvalidKey` if `key` is not exactly 32 bytes
/// - `DecryptionFailed` for every authentication failure: wrong key,
///   tampered data, tampered tag or tampered seq
pub fn decrypt(envelope: &Envelope, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher_for(key)?;

    let mut buffer = envelope.data.clone();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&envelope.iv),
            &aad_for(envelope.seq),
            &mut buffer,
            Tag::from_slice(&envelope.tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(buffer)
}

/// Render an envelope as its JSON wire form
pub fn serialize(envelope: &Envelope) -> String {
    json!({
        "iv": encode_b64url(&envelope.iv),
        "tag": encode_b64url(&envelope.tag),
        "data": encode_b64url(&envelope.data),
        "seq": envelope.seq,
    })
    .to_string()
}

/// Parse the JSON wire form, validating every field before any crypto runs
pub fn parse(text: &str) -> Result<Envelope, CryptoError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CryptoError::envelope("body", format!("not valid JSON: {}", e)))?;
    parse_value(&value)
}

/// Same as [`parse`] for an already-decoded JSON value
pub fn parse_value(value: &Value) -> Result<Envelope, CryptoError> {
    let object = value
        .as_object()
        .ok_or_else(|| CryptoError::envelope("body", "expected a JSON object"))?;

    let iv = fixed_field::<IV_SIZE>(object, "iv")?;
    let tag = fixed_field::<TAG_SIZE>(object, "tag")?;
    let data = bytes_field(object, "data")?;

    let seq = match object.get("seq") {
        None => return Err(CryptoError::envelope("seq", "missing")),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| CryptoError::envelope("seq", "expected a non-negative integer"))?,
    };

    Ok(Envelope { iv, tag, data, seq })
}

fn bytes_field(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Vec<u8>, CryptoError> {
    let text = match object.get(field) {
        None => return Err(CryptoError::envelope(field, "missing")),
        Some(Value::String(s)) => s,
        Some(_) => return Err(CryptoError::envelope(field, "expected a base64url string")),
    };
    decode_b64url(text).map_err(|e| CryptoError::envelope(field, format!("bad base64url: {}", e)))
}

fn fixed_field<const N: usize>(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<[u8; N], CryptoError> {
    let bytes = bytes_field(object, field)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::envelope(field, format!("expected {} bytes, got {}", N, bytes.len()))
    })
}
