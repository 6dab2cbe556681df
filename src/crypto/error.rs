// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Crypto Error Types
//!
//! Two families of failure are kept apart:
//!
//! - **Structural** (`InvalidKey`, `InvalidEnvelope`): wrong lengths, missing
//!   fields, bad encodings. Detected before any cryptographic operation runs,
//!   so the messages can be specific.
//! - **Cryptographic** (`DecryptionFailed`): tag mismatch, AAD mismatch, wrong
//!   key. Collapsed into one variant with a fixed message so callers cannot
//!   learn which check failed.
//!
//! ## Usage Example
//!
//! ```rust
//! use gao_e2ee::crypto::CryptoError;
//!
//! fn open(ok: bool) -> Result<Vec<u8>, CryptoError> {
//!     if ok {
//!         Ok(Vec::new())
//!     } else {
//!         Err(CryptoError::DecryptionFailed)
//!     }
//! }
//!
//! assert_eq!(open(false).unwrap_err().to_string(), "decryption failed");
//! ```

use std::fmt;

/// Error type for envelope, key-agreement and ratchet operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key material has the wrong size or does not parse
    InvalidKey {
        /// Which key failed (e.g. "session_key", "client_public_key")
        key_type: String,
        /// Specific failure reason
        reason: String,
    },

    /// Envelope is structurally malformed
    ///
    /// Raised by `parse` for missing fields, wrong JSON types, bad base64 and
    /// wrong IV/tag lengths.
    InvalidEnvelope {
        /// Which field failed validation
        field: String,
        /// Specific failure reason
        reason: String,
    },

    /// AEAD authentication failed
    ///
    /// Intentionally carries no detail.
    DecryptionFailed,

    /// AEAD encryption failed
    EncryptionFailed,

    /// HKDF expansion failed
    KeyDerivationFailed {
        /// Which derivation was running
        operation: String,
        /// Specific failure reason
        reason: String,
    },
}

impl CryptoError {
    pub(crate) fn envelope(field: &str, reason: impl Into<String>) -> Self {
        CryptoError::InvalidEnvelope {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors detected before any cryptographic operation ran
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKey { .. } | CryptoError::InvalidEnvelope { .. }
        )
    }
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKey { key_type, reason } => {
                write!(f, "Invalid key ({}): {}", key_type, reason)
            }
            CryptoError::InvalidEnvelope { field, reason } => {
                write!(f, "Invalid envelope field '{}': {}", field, reason)
            }
            CryptoError::DecryptionFailed => write!(f, "decryption failed"),
            CryptoError::EncryptionFailed => write!(f, "encryption failed"),
            CryptoError::KeyDerivationFailed { operation, reason } => {
                write!(f, "Key derivation failed during {}: {}", operation, reason)
            }
        }
    }
}

impl std::error::Error for CryptoError {}

// Any AEAD library error is a cryptographic failure; the library's own
// message is dropped on purpose.
impl From<aes_gcm::aead::Error> for CryptoError {
    fn from(_: aes_gcm::aead::Error) -> Self {
        CryptoError::DecryptionFailed
    }
}

impl From<hkdf::InvalidLength> for CryptoError {
    fn from(err: hkdf::InvalidLength) -> Self {
        CryptoError::KeyDerivationFailed {
            operation: "hkdf_expand".to_string(),
            reason: err.to_string(),
        }
    }
}
