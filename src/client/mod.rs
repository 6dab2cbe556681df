// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client side of the protocol
//!
//! `E2eeClient` performs the same key agreement as the server, seals requests
//! with a strictly increasing `seq`, and opens responses. It mirrors the
//! server's rotation rule so both sides ratchet on the same request: before
//! sealing, if the local request count has reached the threshold or the
//! rotation interval has elapsed, both keys are ratcheted and the count reset.
//!
//! Any `ClientError::Crypto(CryptoError::DecryptionFailed)` from the server
//! (or locally) means the two sides disagree about the key. Call `reset` and
//! run a new handshake.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_KEY_ROTATION_INTERVAL_MS;
use crate::crypto::{
    decode_b64url, decrypt, encrypt, parse, parse_public_key, ratchet, serialize, CryptoError,
    EphemeralKeyPair, SessionKey,
};
use crate::handshake::{HandshakeRequest, HandshakeResponse};
use crate::rotation::RotationPolicy;
use crate::session::{Clock, SystemClock};
use crate::transport::headers;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No handshake in progress")]
    HandshakeNotStarted,

    #[error("No established session")]
    NoSession,

    #[error("Invalid server public key: {0}")]
    InvalidServerKey(String),

    #[error("Response seq {actual} does not match request seq {expected}")]
    SequenceMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// An encrypted request ready to send
#[derive(Debug, Clone)]
pub struct SealedRequest {
    pub session_id: String,
    pub seq: u64,
    /// Envelope JSON
    pub body: String,
}

impl SealedRequest {
    /// Headers to attach alongside `body`
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (headers::ENCRYPTED, headers::ENCRYPTED_MARKER.to_string()),
            (headers::SESSION_ID, self.session_id.clone()),
            (headers::SEQUENCE, self.seq.to_string()),
        ]
    }
}

struct ClientSession {
    session_id: String,
    encryption_key: SessionKey,
    mac_key: SessionKey,
    last_rotated_at: u64,
    request_count: u64,
    last_seq: u64,
}

pub struct E2eeClient {
    pending: Option<EphemeralKeyPair>,
    session: Option<ClientSession>,
    max_requests: u64,
    rotation_interval_ms: u64,
    clock: Arc<dyn Clock>,
}

impl E2eeClient {
    /// `max_requests` must match the server's `max_requests_before_rotation`
    pub fn new(max_requests: u64) -> Self {
        Self::with_clock(max_requests, Arc::new(SystemClock))
    }

    pub fn with_clock(max_requests: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: None,
            session: None,
            max_requests,
            rotation_interval_ms: DEFAULT_KEY_ROTATION_INTERVAL_MS,
            clock,
        }
    }

    /// Start a handshake with a fresh ephemeral key pair
    pub fn begin_handshake(&mut self) -> HandshakeRequest {
        let key_pair = EphemeralKeyPair::generate();
        let request = HandshakeRequest::new(&key_pair.public_bytes());
        self.pending = Some(key_pair);
        request
    }

    /// Derive session keys from the server's reply
    pub fn complete_handshake(&mut self, response: &HandshakeResponse) -> Result<(), ClientError> {
        let key_pair = self.pending.take().ok_or(ClientError::HandshakeNotStarted)?;

        let raw = decode_b64url(&response.server_public_key)
            .map_err(|e| ClientError::InvalidServerKey(e.to_string()))?;
        let server_public =
            parse_public_key(&raw).map_err(|e| ClientError::InvalidServerKey(e.to_string()))?;
        let keys = key_pair.derive_session_keys(&server_public)?;

        self.session = Some(ClientSession {
            session_id: response.session_id.clone(),
            encryption_key: keys.encryption_key,
            mac_key: keys.mac_key,
            last_rotated_at: self.clock.now_ms(),
            request_count: 0,
            last_seq: 0,
        });
        self.rotation_interval_ms = response.rotation_interval_ms;
        debug!("Client session established: {}", response.session_id);
        Ok(())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn is_established(&self) -> bool {
        self.session.is_some()
    }

    /// Forget the session; the next request needs a new handshake
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Encrypt a request body under the next sequence number
    ///
    /// Requests without an application body (GET, DELETE) still go through
    /// here with an empty `plaintext`; the server only treats a request as
    /// part of the session once its envelope authenticates.
    pub fn seal_request(&mut self, plaintext: &[u8]) -> Result<SealedRequest, ClientError> {
        self.rotate_if_due()?;
        let session = self.session.as_mut().ok_or(ClientError::NoSession)?;

        let seq = session.last_seq + 1;
        let envelope = encrypt(plaintext, session.encryption_key.as_bytes(), seq)?;
        session.last_seq = seq;
        session.request_count += 1;

        Ok(SealedRequest {
            session_id: session.session_id.clone(),
            seq,
            body: serialize(&envelope),
        })
    }

    /// Decrypt a sealed response and check it answers request `expected_seq`
    pub fn open_response(&self, body: &str, expected_seq: u64) -> Result<Vec<u8>, ClientError> {
        let session = self.session.as_ref().ok_or(ClientError::NoSession)?;
        let envelope = parse(body)?;
        let plaintext = decrypt(&envelope, session.encryption_key.as_bytes())?;
        if envelope.seq() != expected_seq {
            return Err(ClientError::SequenceMismatch {
                expected: expected_seq,
                actual: envelope.seq(),
            });
        }
        Ok(plaintext)
    }

    fn rotate_if_due(&mut self) -> Result<(), ClientError> {
        let policy = RotationPolicy {
            interval_ms: self.rotation_interval_ms,
            max_requests: self.max_requests,
        };
        let now = self.clock.now_ms();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        if policy.is_due(session.last_rotated_at, session.request_count, now) {
            session.encryption_key = ratchet(&session.encryption_key)?;
            session.mac_key = ratchet(&session.mac_key)?;
            session.request_count = 0;
            session.last_rotated_at = now;
            debug!("Client rotated keys for session {}", session.session_id);
        }
        Ok(())
    }
}
