// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-Memory Session Store
//!
//! Single-process reference implementation of [`SessionStore`]. All sessions
//! live in one `RwLock<HashMap>`; every trait call takes the lock once, so each
//! call is atomic with respect to the others.
//!
//! Expired sessions are invisible to `get` immediately and are physically
//! removed by a background sweep started with [`InMemorySessionStore::spawn_sweeper`].
//!
//! **Security**: sessions are held in memory only and never persisted.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, SystemClock};
use super::{Session, SessionStore, StoreError};

/// Thread-safe in-memory session storage with TTL enforcement
///
/// # Example
///
/// ```ignore
/// let store = InMemorySessionStore::new(86_400_000);
/// let _sweeper = store.spawn_sweeper(Duration::from_secs(60));
/// store.set(session).await?;
/// let live = store.live_count().await;
/// ```
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
}

impl InMemorySessionStore {
    /// Create a store using the system clock
    pub fn new(ttl_ms: u64) -> Self {
        Self::with_clock(ttl_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl_ms,
            clock,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Number of sessions that have not yet expired
    pub async fn live_count(&self) -> usize {
        let now = self.clock.now_ms();
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| !s.is_expired(now, self.ttl_ms))
            .count()
    }

    /// Remove every expired session, returning how many were evicted
    ///
    /// Candidates are collected under the read lock; each one is then removed
    /// under its own short write lock after re-checking expiry, so request
    /// handling is never blocked for a whole pass.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let candidates: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, s)| s.is_expired(now, self.ttl_ms))
                .map(|(id, _)| id.clone())
                .collect()
        };

        let mut evicted = 0;
        for session_id in candidates {
            let mut sessions = self.sessions.write().await;
            let still_expired = sessions
                .get(&session_id)
                .map(|s| s.is_expired(self.clock.now_ms(), self.ttl_ms))
                .unwrap_or(false);
            if still_expired {
                sessions.remove(&session_id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(
                "🗑️  Evicted {} expired session(s) (remaining: {})",
                evicted,
                self.sessions.read().await.len()
            );
        }
        evicted
    }

    /// Start the periodic TTL sweep on the current tokio runtime
    ///
    /// The task stops when the returned handle is dropped or shut down.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweepHandle {
        let token = CancellationToken::new();
        let child = token.clone();
        let store = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep_expired().await;
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        });

        SweepHandle {
            token,
            task: Some(task),
        }
    }

    /// Drop every session
    pub async fn clear_all(&self) {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        tracing::info!("🗑️  Cleared all sessions (count: {})", count);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let now = self.clock.now_ms();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|s| !s.is_expired(now, self.ttl_ms))
            .cloned())
    }

    async fn set(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id().to_string(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_some() {
            tracing::info!(
                "🗑️  Session removed: {} (remaining: {})",
                session_id,
                sessions.len()
            );
        }
        Ok(())
    }

    async fn increment_request_count(&self, session_id: &str) -> Result<u64, StoreError> {
        let now = self.clock.now_ms();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) if !session.is_expired(now, self.ttl_ms) => Ok(session.record_request()),
            _ => Err(StoreError::NotFound(session_id.to_string())),
        }
    }
}

/// Owner of a running sweep task
pub struct SweepHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
