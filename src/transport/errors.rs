// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::CryptoError;
use crate::handshake::HandshakeError;
use crate::monitoring::Rejection;
use crate::rotation::RotationError;
use crate::session::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
}

/// Client-facing failures of the transport
///
/// Messages are fixed or structural; none carries key material or plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Envelope failed structural validation
    InvalidEnvelope(String),
    /// Authentication failed; the client must re-handshake
    DecryptionFailed,
    /// No live session for the given id
    SessionNotFound,
    /// Sequence number not greater than the last accepted one
    ReplayDetected { seq: u64, last_seq: u64 },
    /// Plaintext request refused while encryption is enforced
    EncryptionRequired,
    /// Handshake body or public key rejected
    InvalidHandshake(String),
    BodyTooLarge { limit: usize },
    Storage(String),
    Internal(String),
}

impl TransportError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, message) = match self {
            TransportError::InvalidEnvelope(msg) => ("invalid_envelope", msg.clone()),
            TransportError::DecryptionFailed => {
                ("decryption_failed", "Decryption failed".to_string())
            }
            TransportError::SessionNotFound => (
                "session_not_found",
                "Unknown or expired session".to_string(),
            ),
            TransportError::ReplayDetected { .. } => (
                "replay_detected",
                "Sequence number already used".to_string(),
            ),
            TransportError::EncryptionRequired => (
                "encryption_required",
                "This endpoint requires an encrypted session".to_string(),
            ),
            TransportError::InvalidHandshake(msg) => ("invalid_handshake", msg.clone()),
            TransportError::BodyTooLarge { limit } => (
                "body_too_large",
                format!("Request body exceeds {} bytes", limit),
            ),
            TransportError::Storage(_) => (
                "internal_error",
                "Session storage unavailable".to_string(),
            ),
            TransportError::Internal(_) => ("internal_error", "Internal error".to_string()),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            TransportError::InvalidEnvelope(_)
            | TransportError::DecryptionFailed
            | TransportError::InvalidHandshake(_) => 400,
            TransportError::SessionNotFound => 401,
            TransportError::EncryptionRequired => 403,
            TransportError::ReplayDetected { .. } => 409,
            TransportError::BodyTooLarge { .. } => 413,
            TransportError::Storage(_) | TransportError::Internal(_) => 500,
        }
    }

    /// Metric bucket for this error, if it is a per-request rejection
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            TransportError::InvalidEnvelope(_) => Some(Rejection::InvalidEnvelope),
            TransportError::DecryptionFailed => Some(Rejection::DecryptionFailed),
            TransportError::SessionNotFound => Some(Rejection::SessionNotFound),
            TransportError::ReplayDetected { .. } => Some(Rejection::Replay),
            TransportError::EncryptionRequired => Some(Rejection::EncryptionRequired),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidEnvelope(msg) => write!(f, "Invalid envelope: {}", msg),
            TransportError::DecryptionFailed => write!(f, "Decryption failed"),
            TransportError::SessionNotFound => write!(f, "Session not found"),
            TransportError::ReplayDetected { seq, last_seq } => write!(
                f,
                "Replay detected: seq {} is not greater than {}",
                seq, last_seq
            ),
            TransportError::EncryptionRequired => write!(f, "Encryption required"),
            TransportError::InvalidHandshake(msg) => write!(f, "Invalid handshake: {}", msg),
            TransportError::BodyTooLarge { limit } => {
                write!(f, "Body exceeds limit of {} bytes", limit)
            }
            TransportError::Storage(msg) => write!(f, "Storage error: {}", msg),
            TransportError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<CryptoError> for TransportError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidEnvelope { .. } => TransportError::InvalidEnvelope(err.to_string()),
            CryptoError::DecryptionFailed => TransportError::DecryptionFailed,
            other => TransportError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for TransportError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => TransportError::SessionNotFound,
            StoreError::Backend(msg) => TransportError::Storage(msg),
        }
    }
}

impl From<RotationError> for TransportError {
    fn from(err: RotationError) -> Self {
        match err {
            RotationError::Store(e) => e.into(),
            RotationError::Crypto(e) => TransportError::Internal(e.to_string()),
        }
    }
}

impl From<HandshakeError> for TransportError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::InvalidPublicKey(msg) => TransportError::InvalidHandshake(msg),
            HandshakeError::Derivation(e) => TransportError::Internal(e.to_string()),
            HandshakeError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
