// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Both sides of a handshake derive identical keys and can exchange
//! envelopes with them.

use gao_e2ee::crypto::{decode_b64url, decrypt, encrypt, parse_public_key, EphemeralKeyPair};
use gao_e2ee::handshake::{HandshakeError, HandshakeProtocol, HandshakeRequest};
use gao_e2ee::session::{InMemorySessionStore, ManualClock, SessionStore};
use serde_json::{json, Value};
use std::sync::Arc;

fn protocol() -> (HandshakeProtocol, InMemorySessionStore) {
    let clock = Arc::new(ManualClock::new(0));
    let store = InMemorySessionStore::with_clock(86_400_000, clock.clone());
    let protocol = HandshakeProtocol::new(Arc::new(store.clone()), clock, 3_600_000);
    (protocol, store)
}

#[test]
fn test_independent_key_pairs_agree() {
    let server = EphemeralKeyPair::generate();
    let client = EphemeralKeyPair::generate();

    let server_keys = server.derive_session_keys(&client.public_bytes()).unwrap();
    let client_keys = client.derive_session_keys(&server.public_bytes()).unwrap();

    assert_eq!(server_keys.encryption_key, client_keys.encryption_key);
    assert_eq!(server_keys.mac_key, client_keys.mac_key);
    assert_ne!(server_keys.encryption_key, server_keys.mac_key);
}

#[test]
fn test_server_encrypts_client_decrypts_json() {
    let server = EphemeralKeyPair::generate();
    let client = EphemeralKeyPair::generate();
    let server_key = server
        .derive_session_keys(&client.public_bytes())
        .unwrap()
        .encryption_key;
    let client_key = client
        .derive_session_keys(&server.public_bytes())
        .unwrap()
        .encryption_key;

    let message = json!({ "user": "Alice", "role": "admin" });
    let plaintext = serde_json::to_vec(&message).unwrap();
    let envelope = encrypt(&plaintext, server_key.as_bytes(), 1).unwrap();

    let opened = decrypt(&envelope, client_key.as_bytes()).unwrap();
    let decoded: Value = serde_json::from_slice(&opened).unwrap();
    assert_eq!(decoded, message);
}

#[tokio::test]
async fn test_handshake_stores_the_key_the_client_derives() {
    let (protocol, store) = protocol();
    let client = EphemeralKeyPair::generate();

    let response = protocol
        .handle_request(&HandshakeRequest::new(&client.public_bytes()))
        .await
        .unwrap();

    let server_public =
        parse_public_key(&decode_b64url(&response.server_public_key).unwrap()).unwrap();
    let client_keys = client.derive_session_keys(&server_public).unwrap();

    let session = store.get(&response.session_id).await.unwrap().unwrap();
    assert_eq!(session.encryption_key(), &client_keys.encryption_key);
    assert_eq!(session.mac_key(), &client_keys.mac_key);

    let message = json!({ "user": "Alice", "role": "admin" }).to_string();
    let envelope = encrypt(message.as_bytes(), session.encryption_key().as_bytes(), 1).unwrap();
    let opened = decrypt(&envelope, client_keys.encryption_key.as_bytes()).unwrap();
    assert_eq!(opened, message.as_bytes());
}

#[tokio::test]
async fn test_repeated_handshake_from_same_key_gets_new_session() {
    let (protocol, store) = protocol();
    let client = EphemeralKeyPair::generate();

    let first = protocol.handle_handshake(&client.public_bytes()).await.unwrap();
    let second = protocol.handle_handshake(&client.public_bytes()).await.unwrap();

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(store.live_count().await, 2);
}

#[tokio::test]
async fn test_malformed_public_keys_rejected() {
    let (protocol, store) = protocol();

    for bad in [vec![], vec![9u8; 16], vec![9u8; 31], vec![9u8; 33]] {
        assert!(matches!(
            protocol.handle_handshake(&bad).await,
            Err(HandshakeError::InvalidPublicKey(_))
        ));
    }
    // All-zero point is low order
    assert!(matches!(
        protocol.handle_handshake(&[0u8; 32]).await,
        Err(HandshakeError::InvalidPublicKey(_))
    ));
    assert_eq!(store.live_count().await, 0);
}
