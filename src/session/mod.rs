// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Session records and the storage abstraction behind them
//!
//! A `Session` is created only by the handshake and is always stored whole.
//! Stores decide TTL expiry themselves: `get` never returns an expired session.

pub mod clock;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::crypto::{EphemeralKeyPair, SessionKey, PUBLIC_KEY_SIZE};

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::{InMemorySessionStore, SweepHandle};

/// Errors surfaced by session storage backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The session does not exist (never created, deleted or expired)
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The backend failed; nothing was written
    #[error("Session store backend error: {0}")]
    Backend(String),
}

/// Persistence contract for session records
///
/// Implementations must make each call atomic for a given session id and must
/// treat `set` as all-or-nothing full replacement.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session; `None` if unknown, deleted or past its TTL
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert or fully replace a session
    async fn set(&self, session: Session) -> Result<(), StoreError>;

    /// Remove a session; removing an absent id is not an error
    async fn delete(&self, session_id: &str) -> Result<(), StoreError>;

    /// Atomically bump the request counter and return the new value
    async fn increment_request_count(&self, session_id: &str) -> Result<u64, StoreError>;
}

/// The unit of trust between one client and this server
#[derive(Clone)]
pub struct Session {
    session_id: String,
    encryption_key: SessionKey,
    mac_key: SessionKey,
    client_public_key: [u8; PUBLIC_KEY_SIZE],
    server_key_pair: EphemeralKeyPair,
    created_at: u64,
    last_rotated_at: u64,
    request_count: u64,
    last_seq: u64,
}

impl Session {
    pub(crate) fn establish(
        session_id: String,
        encryption_key: SessionKey,
        mac_key: SessionKey,
        client_public_key: [u8; PUBLIC_KEY_SIZE],
        server_key_pair: EphemeralKeyPair,
        now_ms: u64,
    ) -> Self {
        Self {
            session_id,
            encryption_key,
            mac_key,
            client_public_key,
            server_key_pair,
            created_at: now_ms,
            last_rotated_at: now_ms,
            request_count: 0,
            last_seq: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn encryption_key(&self) -> &SessionKey {
        &self.encryption_key
    }

    pub fn mac_key(&self) -> &SessionKey {
        &self.mac_key
    }

    pub fn client_public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.client_public_key
    }

    pub fn server_public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.server_key_pair.public_bytes()
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn last_rotated_at(&self) -> u64 {
        self.last_rotated_at
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Whether the session has outlived `ttl_ms` at time `now_ms`
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) >= ttl_ms
    }

    /// Count one processed request
    ///
    /// Used by `SessionStore::increment_request_count` implementations and by
    /// the pipeline when it writes an authenticated request back in one `set`.
    pub fn record_request(&mut self) -> u64 {
        self.request_count += 1;
        self.request_count
    }

    /// Replace both keys with their successors
    ///
    /// The old key buffers are zeroized in place before the new values are
    /// moved in.
    pub(crate) fn install_rotated_keys(
        &mut self,
        encryption_key: SessionKey,
        mac_key: SessionKey,
        now_ms: u64,
    ) {
        use zeroize::Zeroize;
        self.encryption_key.zeroize();
        self.mac_key.zeroize();
        self.encryption_key = encryption_key;
        self.mac_key = mac_key;
        self.request_count = 0;
        self.last_rotated_at = now_ms;
    }

    pub(crate) fn accept_seq(&mut self, seq: u64) {
        self.last_seq = self.last_seq.max(seq);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .field("last_rotated_at", &self.last_rotated_at)
            .field("request_count", &self.request_count)
            .field("last_seq", &self.last_seq)
            .finish_non_exhaustive()
    }
}

/// Fresh 128-bit random session id, lowercase hex
pub fn generate_session_id() -> String {
    use rand::{rngs::OsRng, RngCore};
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
