// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Key rotation
//!
//! A session rotates when either its keys are older than the rotation
//! interval or it has processed the maximum number of requests. Rotation
//! replaces both keys with their ratchet successors, zeroizes the old ones,
//! resets the request counter and persists the result in a single `set`.
//!
//! Rotation is a read-decide-write sequence; callers must hold the session's
//! lock (see `transport::locks`) from `get` until the rotated session is
//! written back.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::E2eeConfig;
use crate::crypto::{ratchet, CryptoError};
use crate::session::{Clock, Session, SessionStore, StoreError};

#[derive(Error, Debug)]
pub enum RotationError {
    #[error("Key derivation failed during rotation: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Failed to persist rotated session: {0}")]
    Store(#[from] StoreError),
}

/// When to rotate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub interval_ms: u64,
    pub max_requests: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            interval_ms: crate::config::DEFAULT_KEY_ROTATION_INTERVAL_MS,
            max_requests: crate::config::DEFAULT_MAX_REQUESTS_BEFORE_ROTATION,
        }
    }
}

impl RotationPolicy {
    pub fn from_config(config: &E2eeConfig) -> Self {
        Self {
            interval_ms: config.key_rotation_interval_ms,
            max_requests: config.max_requests_before_rotation,
        }
    }

    /// True once the interval has elapsed or the request threshold is reached
    pub fn is_due(&self, last_rotated_at: u64, request_count: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(last_rotated_at) >= self.interval_ms
            || request_count >= self.max_requests
    }
}

/// Decides and performs rotation against a session store
#[derive(Clone)]
pub struct KeyRatchet {
    policy: RotationPolicy,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl KeyRatchet {
    pub fn new(policy: RotationPolicy, store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            store,
            clock,
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn needs_rotation(&self, session: &Session) -> bool {
        self.policy.is_due(
            session.last_rotated_at(),
            session.request_count(),
            self.clock.now_ms(),
        )
    }

    /// Ratchet both keys forward in memory, without persisting
    ///
    /// The superseded keys are zeroized in place before the new ones are
    /// installed. Callers that must authenticate a request before committing
    /// the rotation use this and write the session themselves.
    pub fn advance(&self, session: &mut Session) -> Result<(), RotationError> {
        let next_encryption = ratchet(session.encryption_key())?;
        let next_mac = ratchet(session.mac_key())?;
        session.install_rotated_keys(next_encryption, next_mac, self.clock.now_ms());
        Ok(())
    }

    /// Ratchet both keys forward and persist the session
    ///
    /// If the store write fails the stored record is untouched and the error
    /// is returned.
    pub async fn rotate(&self, mut session: Session) -> Result<Session, RotationError> {
        let previous_count = session.request_count();
        self.advance(&mut session)?;
        self.store.set(session.clone()).await?;

        info!(
            "🔄 Rotated keys for session {} after {} request(s)",
            session.session_id(),
            previous_count
        );
        Ok(session)
    }

    /// Rotate only when due; the flag reports whether rotation happened
    pub async fn rotate_if_needed(&self, session: Session) -> Result<(Session, bool), RotationError> {
        if self.needs_rotation(&session) {
            Ok((self.rotate(session).await?, true))
        } else {
            Ok((session, false))
        }
    }
}
