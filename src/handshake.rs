// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Handshake Protocol
//!
//! Establishes a new session from a client's ephemeral X25519 public key.
//!
//! ## Protocol Flow
//!
//! 1. Client generates an ephemeral key pair and POSTs
//!    `{ "clientPublicKey": b64url(32 bytes) }` to the handshake path
//! 2. Node generates its own ephemeral key pair (never reused)
//! 3. Node computes the X25519 shared secret and derives the encryption and
//!    MAC keys with HKDF-SHA256
//! 4. Node stores the complete session under a fresh random id
//! 5. Node replies `{ "sessionId", "serverPublicKey", "rotationIntervalMs" }`
//! 6. Client performs the same derivation locally
//!
//! A session is only visible to readers once step 4 has fully succeeded; a
//! failed store write leaves nothing behind. A repeated handshake always
//! produces a new session id.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::crypto::{
    decode_b64url, encode_b64url, parse_public_key, CryptoError, EphemeralKeyPair,
    PUBLIC_KEY_SIZE,
};
use crate::session::{generate_session_id, Clock, Session, SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Client public key missing, badly encoded, wrong length or low-order
    #[error("Invalid client public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key derivation failed: {0}")]
    Derivation(CryptoError),

    #[error("Failed to persist session: {0}")]
    Store(#[from] StoreError),
}

/// Body of a handshake request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeRequest {
    pub client_public_key: String,
}

impl HandshakeRequest {
    pub fn new(client_public_key: &[u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            client_public_key: encode_b64url(client_public_key),
        }
    }
}

/// Body of a handshake response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub session_id: String,
    pub server_public_key: String,
    pub rotation_interval_ms: u64,
}

/// Creates sessions
#[derive(Clone)]
pub struct HandshakeProtocol {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    rotation_interval_ms: u64,
}

impl HandshakeProtocol {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, rotation_interval_ms: u64) -> Self {
        Self {
            store,
            clock,
            rotation_interval_ms,
        }
    }

    /// Handle a decoded wire request
    pub async fn handle_request(
        &self,
        request: &HandshakeRequest,
    ) -> Result<HandshakeResponse, HandshakeError> {
        let raw = decode_b64url(&request.client_public_key)
            .map_err(|e| HandshakeError::InvalidPublicKey(format!("bad base64url: {}", e)))?;
        self.handle_handshake(&raw).await
    }

    /// Establish a session from raw client public key bytes
    pub async fn handle_handshake(
        &self,
        client_public_key: &[u8],
    ) -> Result<HandshakeResponse, HandshakeError> {
        let client_public = parse_public_key(client_public_key)
            .map_err(|e| HandshakeError::InvalidPublicKey(reason_of(e)))?;

        let server_keys = EphemeralKeyPair::generate();
        let derived = server_keys
            .derive_session_keys(&client_public)
            .map_err(|e| match e {
                CryptoError::InvalidKey { .. } => HandshakeError::InvalidPublicKey(reason_of(e)),
                other => HandshakeError::Derivation(other),
            })?;

        let server_public = server_keys.public_bytes();
        let session_id = generate_session_id();
        let session = Session::establish(
            session_id.clone(),
            derived.encryption_key,
            derived.mac_key,
            client_public,
            server_keys,
            self.clock.now_ms(),
        );

        if let Err(e) = self.store.set(session).await {
            warn!("Handshake failed to persist session {}: {}", session_id, e);
            return Err(e.into());
        }

        info!("🤝 Session established: {}", session_id);

        Ok(HandshakeResponse {
            session_id,
            server_public_key: encode_b64url(&server_public),
            rotation_interval_ms: self.rotation_interval_ms,
        })
    }
}

fn reason_of(err: CryptoError) -> String {
    match err {
        CryptoError::InvalidKey { reason, .. } => reason,
        other => other.to_string(),
    }
}
