// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-session mutual exclusion
//!
//! The rotate/decrypt/advance-sequence path for one session must run as a
//! single writer. Each session id maps to a `tokio::sync::Mutex` that lives
//! only while at least one request for that session holds or waits for it.
//!
//! Cleanup happens in `Drop`, so a request future cancelled mid-flight (client
//! disconnect, timeout) still removes its entry. The registry itself is a
//! `std::sync::Mutex` because it is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Registry,
}

/// Held while a request owns its session; dropping it releases the lock
pub struct SessionGuard {
    session_id: String,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Registry,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn acquire(&self, session_id: &str) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        // Built before waiting so that cancelling the wait still cleans up
        let mut guard = SessionGuard {
            session_id: session_id.to_string(),
            lock,
            guard: None,
            locks: self.locks.clone(),
        };
        guard.guard = Some(guard.lock.clone().lock_owned().await);
        guard
    }

    /// Number of sessions with a request currently holding or awaiting a lock
    pub fn in_flight(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SessionGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the registry and this guard still reference the mutex
        let idle = locks
            .get(&self.session_id)
            .map(|entry| Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(&self.lock) == 2)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.session_id);
        }
    }
}
