// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Request pipeline
//!
//! `E2eeTransport` sequences the codec, store, handshake and rotation
//! components for each request. It owns no cryptography of its own.
//!
//! ## Inbound order
//!
//! 1. Transport disabled → pass through
//! 2. Handshake path → handshake protocol, no encryption
//! 3. Excluded prefix → pass through
//! 4. Session id present → lock session, look it up (401 if absent)
//!    - not marked encrypted → 403 if encryption is enforced, else pass
//!      through without session context
//!    - marked encrypted → ratchet in memory if due, decrypt, check `seq`,
//!      then write rotation, `lastSeq` and the request count in one `set`
//! 5. No session id → 403 if encryption is enforced, else pass through
//!
//! Nothing about a session changes until its envelope has authenticated.
//! Everything in step 4 runs while holding that session's lock, so two
//! requests for one session never interleave a rotation.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, E2eeConfig};
use crate::crypto::{decrypt, encrypt, parse, serialize, SessionKey};
use crate::handshake::{HandshakeProtocol, HandshakeRequest, HandshakeResponse};
use crate::monitoring::TransportMetrics;
use crate::rotation::{KeyRatchet, RotationPolicy};
use crate::session::{Clock, InMemorySessionStore, Session, SessionStore, SystemClock};

use super::errors::TransportError;
use super::locks::SessionLocks;

/// How a request path is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Transport switched off; everything passes through
    Disabled,
    Handshake,
    Excluded,
    Protected,
}

/// What the handler may know about the session behind a request
///
/// Inserted into request extensions by the middleware. Holds no key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub seq: u64,
}

/// State needed to seal the response to an opened request
///
/// Carries the key generation the request was opened under, so a rotation
/// triggered by a later request cannot change the key of this response.
#[derive(Clone)]
pub struct SessionContext {
    session_id: String,
    seq: u64,
    key: SessionKey,
}

impl SessionContext {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            seq: self.seq,
        }
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Result of opening an inbound request
#[derive(Debug)]
pub struct OpenedRequest {
    /// Body to hand downstream (plaintext)
    pub body: Vec<u8>,
    /// Present when the response must be sealed
    pub context: Option<SessionContext>,
}

#[derive(Clone)]
pub struct E2eeTransport {
    config: Arc<E2eeConfig>,
    store: Arc<dyn SessionStore>,
    handshake: HandshakeProtocol,
    ratchet: KeyRatchet,
    locks: SessionLocks,
    metrics: TransportMetrics,
}

impl E2eeTransport {
    /// Build a transport over an arbitrary store
    pub fn new(
        config: E2eeConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let handshake =
            HandshakeProtocol::new(store.clone(), clock.clone(), config.key_rotation_interval_ms);
        let ratchet = KeyRatchet::new(RotationPolicy::from_config(&config), store.clone(), clock);

        Ok(Self {
            config: Arc::new(config),
            store,
            handshake,
            ratchet,
            locks: SessionLocks::new(),
            metrics: TransportMetrics::new(),
        })
    }

    /// Build a transport over a fresh in-memory store using the system clock
    ///
    /// The store is returned as well so the caller can run its sweeper and
    /// read the live-session count.
    pub fn in_memory(config: E2eeConfig) -> Result<(Self, InMemorySessionStore), ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = InMemorySessionStore::with_clock(config.session_ttl_ms, clock.clone());
        let transport = Self::new(config, Arc::new(store.clone()), clock)?;
        Ok((transport, store))
    }

    pub fn config(&self) -> &E2eeConfig {
        &self.config
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Sessions with a request currently holding or waiting for their lock
    pub fn sessions_in_flight(&self) -> usize {
        self.locks.in_flight()
    }

    pub fn route(&self, path: &str) -> Route {
        if !self.config.enabled {
            Route::Disabled
        } else if path == self.config.handshake_path {
            Route::Handshake
        } else if self.config.is_excluded(path) {
            Route::Excluded
        } else {
            Route::Protected
        }
    }

    /// Run the handshake for a raw JSON request body
    pub async fn handshake(&self, body: &[u8]) -> Result<HandshakeResponse, TransportError> {
        let result = match serde_json::from_slice::<HandshakeRequest>(body) {
            Ok(request) => self
                .handshake
                .handle_request(&request)
                .await
                .map_err(TransportError::from),
            Err(e) => Err(TransportError::InvalidHandshake(format!(
                "malformed handshake body: {}",
                e
            ))),
        };

        match &result {
            Ok(_) => self.metrics.record_handshake(),
            Err(e) => {
                warn!("Handshake rejected: {}", e);
                self.metrics.record_handshake_failure();
            }
        }
        result
    }

    /// Open an inbound request on a protected path
    ///
    /// `encrypted` reflects the encrypted-marker header. Requests without an
    /// authenticated envelope never get session context; they pass through
    /// in plaintext unless encryption is enforced.
    pub async fn open_request(
        &self,
        session_id: Option<&str>,
        encrypted: bool,
        body: &[u8],
    ) -> Result<OpenedRequest, TransportError> {
        let result = match session_id {
            Some(id) => {
                let _guard = self.locks.acquire(id).await;
                self.open_locked(id, encrypted, body).await
            }
            // Marked encrypted but there is no session to decrypt against
            None if encrypted => Err(TransportError::SessionNotFound),
            None if self.config.enforce_encryption => Err(TransportError::EncryptionRequired),
            None => Ok(OpenedRequest {
                body: body.to_vec(),
                context: None,
            }),
        };

        if let Err(e) = &result {
            if let Some(reason) = e.rejection() {
                self.metrics.record_rejection(reason);
            }
            warn!(
                "Rejected request for session {}: {}",
                session_id.unwrap_or("-"),
                e
            );
        }
        result
    }

    async fn open_locked(
        &self,
        session_id: &str,
        encrypted: bool,
        body: &[u8],
    ) -> Result<OpenedRequest, TransportError> {
        let mut session = self
            .store
            .get(session_id)
            .await?
            .ok_or(TransportError::SessionNotFound)?;

        if !encrypted {
            if self.config.enforce_encryption {
                return Err(TransportError::EncryptionRequired);
            }
            return Ok(OpenedRequest {
                body: body.to_vec(),
                context: None,
            });
        }

        let previous_count = session.request_count();
        let rotated = self.ratchet.needs_rotation(&session);
        if rotated {
            self.ratchet.advance(&mut session)?;
        }

        let (plaintext, seq) = self.decrypt_body(&session, body)?;
        session.accept_seq(seq);
        let count = session.record_request();
        let key = session.encryption_key().clone();
        self.store.set(session).await?;

        if rotated {
            self.metrics.record_rotation();
            info!(
                "🔄 Rotated keys for session {} after {} request(s)",
                session_id, previous_count
            );
        }
        self.metrics.record_request_opened();
        debug!(
            "Opened request seq={} for session {} (count {})",
            seq, session_id, count
        );

        Ok(OpenedRequest {
            body: plaintext,
            context: Some(SessionContext {
                session_id: session_id.to_string(),
                seq,
                key,
            }),
        })
    }

    /// Authenticate the envelope and check its sequence number
    fn decrypt_body(&self, session: &Session, body: &[u8]) -> Result<(Vec<u8>, u64), TransportError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| TransportError::InvalidEnvelope("body is not UTF-8 JSON".to_string()))?;
        let envelope = parse(text)?;
        let plaintext = decrypt(&envelope, session.encryption_key().as_bytes())?;

        let seq = envelope.seq();
        if self.config.enforce_sequence && seq <= session.last_seq() {
            return Err(TransportError::ReplayDetected {
                seq,
                last_seq: session.last_seq(),
            });
        }
        Ok((plaintext, seq))
    }

    /// Encrypt a response body under the request's session and sequence
    pub fn seal_response(
        &self,
        context: &SessionContext,
        body: &[u8],
    ) -> Result<String, TransportError> {
        let envelope = encrypt(body, context.key.as_bytes(), context.seq)?;
        self.metrics.record_response_sealed();
        Ok(serialize(&envelope))
    }

    /// Terminate a session; unknown ids are ignored
    pub async fn end_session(&self, session_id: &str) -> Result<(), TransportError> {
        let guard = self.locks.acquire(session_id).await;
        let result = self.store.delete(session_id).await;
        drop(guard);
        result?;
        info!("🔚 Session ended: {}", session_id);
        Ok(())
    }
}
