// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory session store: TTL expiry, sweeping, atomic counters.

use gao_e2ee::crypto::EphemeralKeyPair;
use gao_e2ee::handshake::HandshakeProtocol;
use gao_e2ee::session::{
    Clock, InMemorySessionStore, ManualClock, SessionStore, StoreError, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

async fn establish(protocol: &HandshakeProtocol) -> String {
    let client = EphemeralKeyPair::generate();
    protocol
        .handle_handshake(&client.public_bytes())
        .await
        .unwrap()
        .session_id
}

fn manual(ttl_ms: u64) -> (InMemorySessionStore, HandshakeProtocol, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(5_000));
    let store = InMemorySessionStore::with_clock(ttl_ms, clock.clone());
    let protocol = HandshakeProtocol::new(Arc::new(store.clone()), clock.clone(), 3_600_000);
    (store, protocol, clock)
}

#[tokio::test]
async fn test_session_absent_after_ttl() {
    let (store, protocol, clock) = manual(1_000);
    let id = establish(&protocol).await;

    clock.advance(999);
    assert!(store.get(&id).await.unwrap().is_some());

    clock.advance(1);
    assert!(store.get(&id).await.unwrap().is_none());
    assert_eq!(store.live_count().await, 0);
}

#[tokio::test]
async fn test_increment_on_expired_session_fails() {
    let (store, protocol, clock) = manual(1_000);
    let id = establish(&protocol).await;
    assert_eq!(store.increment_request_count(&id).await.unwrap(), 1);

    clock.advance(1_000);
    assert!(matches!(
        store.increment_request_count(&id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let (store, protocol, _) = manual(60_000);
    let id = establish(&protocol).await;

    store.delete(&id).await.unwrap();
    store.delete(&id).await.unwrap();
    store.delete("never-existed").await.unwrap();
    assert!(store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sweep_only_removes_expired() {
    let (store, protocol, clock) = manual(1_000);
    let old = establish(&protocol).await;
    clock.advance(600);
    let young = establish(&protocol).await;
    clock.advance(600);

    assert_eq!(store.sweep_expired().await, 1);
    assert!(store.get(&old).await.unwrap().is_none());
    assert!(store.get(&young).await.unwrap().is_some());
    assert_eq!(store.sweep_expired().await, 0);
}

#[tokio::test]
async fn test_background_sweeper_evicts() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = InMemorySessionStore::with_clock(50, clock.clone());
    let protocol = HandshakeProtocol::new(Arc::new(store.clone()), clock, 3_600_000);

    establish(&protocol).await;
    establish(&protocol).await;
    assert_eq!(store.live_count().await, 2);

    let sweeper = store.spawn_sweeper(Duration::from_millis(10));
    sleep(Duration::from_millis(250)).await;

    // Sweeper already removed both; nothing left for a manual pass
    assert_eq!(store.sweep_expired().await, 0);
    assert_eq!(store.live_count().await, 0);
    sweeper.shutdown().await;
}

#[tokio::test]
async fn test_sweeper_stops_on_shutdown() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = InMemorySessionStore::with_clock(50, clock.clone());
    let protocol = HandshakeProtocol::new(Arc::new(store.clone()), clock, 3_600_000);

    let sweeper = store.spawn_sweeper(Duration::from_millis(10));
    sweeper.shutdown().await;

    establish(&protocol).await;
    sleep(Duration::from_millis(150)).await;

    // Expired but still physically present: only a manual sweep removes it
    assert_eq!(store.sweep_expired().await, 1);
}

#[tokio::test]
async fn test_concurrent_increments_are_atomic() {
    let (store, protocol, _) = manual(60_000);
    let id = establish(&protocol).await;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..8 {
                store.increment_request_count(&id).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let session = store.get(&id).await.unwrap().unwrap();
    assert_eq!(session.request_count(), 200);
}

#[tokio::test]
async fn test_clear_all() {
    let (store, protocol, _) = manual(60_000);
    establish(&protocol).await;
    establish(&protocol).await;
    store.clear_all().await;
    assert_eq!(store.live_count().await, 0);
}
