// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end HTTP behavior of the transport in front of the demo routes.

use super::support::{plain_post, sealed_post, sealed_request, test_app};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use gao_e2ee::client::ClientError;
use gao_e2ee::config::E2eeConfig;
use gao_e2ee::crypto::{encrypt, parse, serialize, CryptoError, Envelope, SessionKey};
use gao_e2ee::session::SessionStore;
use serde_json::{json, Value};

#[tokio::test]
async fn test_encrypted_echo_round_trip() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let payload = json!({ "user": "Alice", "role": "admin" });
    let sealed = client.seal_request(payload.to_string().as_bytes()).unwrap();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("x-gao-encrypted"), Some("1"));
    assert_eq!(reply.header("x-gao-seq"), Some("1"));
    assert!(!reply.text().contains("Alice"), "response must not be plaintext");

    let opened = client.open_response(&reply.text(), sealed.seq).unwrap();
    let echoed: Value = serde_json::from_slice(&opened).unwrap();
    assert_eq!(echoed["user"], "Alice");
    assert_eq!(echoed["role"], "admin");
    assert!(echoed["receivedAt"].is_string());
}

#[tokio::test]
async fn test_responses_echo_request_seq() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    for expected in 1..=5u64 {
        let sealed = client.seal_request(b"{}").unwrap();
        assert_eq!(sealed.seq, expected);
        let reply = app.send(sealed_post("/api/echo", &sealed)).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.header("x-gao-seq"), Some(expected.to_string().as_str()));
        client.open_response(&reply.text(), expected).unwrap();
    }

    let session = app.store.get(client.session_id().unwrap()).await.unwrap().unwrap();
    assert_eq!(session.request_count(), 5);
    assert_eq!(session.last_seq(), 5);
}

#[tokio::test]
async fn test_replay_rejected_with_conflict() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let sealed = client.seal_request(b"{\"pay\":10}").unwrap();
    assert_eq!(app.send(sealed_post("/api/echo", &sealed)).await.status, StatusCode::OK);

    let replay = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(replay.status, StatusCode::CONFLICT);
    assert_eq!(replay.json()["error_type"], "replay_detected");
}

#[tokio::test]
async fn test_unknown_session_distinct_from_bad_ciphertext() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    // Valid envelope, session id the server never issued
    let mut sealed = client.seal_request(b"{}").unwrap();
    sealed.session_id = "00000000000000000000000000000000".to_string();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.json()["error_type"], "session_not_found");

    // Real session, envelope sealed under a different key
    let mut sealed = client.seal_request(b"{}").unwrap();
    let foreign = encrypt(b"{}", SessionKey::generate().as_bytes(), sealed.seq).unwrap();
    sealed.body = serialize(&foreign);
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_type"], "decryption_failed");
    assert_eq!(reply.json()["message"], "Decryption failed");
}

#[tokio::test]
async fn test_tampered_ciphertext_rejected() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let mut sealed = client.seal_request(b"{\"amount\":1}").unwrap();
    let envelope = parse(&sealed.body).unwrap();
    let mut data = envelope.data().to_vec();
    data[0] ^= 0xff;
    sealed.body = serialize(&Envelope::from_parts(
        *envelope.iv(),
        *envelope.tag(),
        data,
        envelope.seq(),
    ));

    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_type"], "decryption_failed");
}

#[tokio::test]
async fn test_malformed_envelope_reports_field() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let mut sealed = client.seal_request(b"{}").unwrap();
    sealed.body = json!({ "iv": "AAAA", "tag": "AAAA", "data": "", "seq": 1 }).to_string();

    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["error_type"], "invalid_envelope");
    assert!(body["message"].as_str().unwrap().contains("iv"));
}

#[tokio::test]
async fn test_plaintext_passes_when_not_enforced() {
    let app = test_app(E2eeConfig::default());
    let reply = app.send(plain_post("/api/echo", &json!({ "hi": 1 }))).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.header("x-gao-encrypted").is_none());
    assert_eq!(reply.json()["hi"], 1);
}

#[tokio::test]
async fn test_plaintext_rejected_when_enforced() {
    let mut config = E2eeConfig::default();
    config.enforce_encryption = true;
    let app = test_app(config);

    let reply = app.send(plain_post("/api/echo", &json!({ "hi": 1 }))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.json()["error_type"], "encryption_required");

    // Excluded paths stay reachable
    let health = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.json()["status"], "ok");
}

#[tokio::test]
async fn test_disabled_transport_passes_everything() {
    let mut config = E2eeConfig::default();
    config.enabled = false;
    config.enforce_encryption = true;
    let app = test_app(config);

    let reply = app.send(plain_post("/api/echo", &json!({ "hi": 2 }))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["hi"], 2);
}

#[tokio::test]
async fn test_bodyless_method_carries_empty_envelope() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let sealed = client.seal_request(b"{}").unwrap();
    app.send(sealed_post("/api/echo", &sealed)).await;

    let sealed = client.seal_request(b"").unwrap();
    assert_eq!(sealed.seq, 2);
    let reply = app
        .send(sealed_request(Method::GET, "/api/session", &sealed))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("x-gao-encrypted"), Some("1"));
    assert_eq!(reply.header("x-gao-seq"), Some("2"));

    let opened = client.open_response(&reply.text(), sealed.seq).unwrap();
    let info: Value = serde_json::from_slice(&opened).unwrap();
    assert_eq!(info["sessionId"], client.session_id().unwrap());
    assert_eq!(info["seq"], 2);

    let session = app.store.get(client.session_id().unwrap()).await.unwrap().unwrap();
    assert_eq!(session.request_count(), 2);
}

#[tokio::test]
async fn test_session_id_alone_cannot_end_session() {
    let mut config = E2eeConfig::default();
    config.enforce_encryption = true;
    let app = test_app(config);
    let mut client = app.client();
    app.connect(&mut client).await;
    let session_id = client.session_id().unwrap().to_string();

    let reply = app
        .send(
            Request::delete("/api/session")
                .header("x-gao-session-id", session_id.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(app.store.get(&session_id).await.unwrap().is_some());

    let sealed = client.seal_request(b"{}").unwrap();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_session_handlers_need_authenticated_request() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;
    let session_id = client.session_id().unwrap().to_string();

    let reply = app
        .send(
            Request::delete("/api/session")
                .header("x-gao-session-id", session_id.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert!(reply.header("x-gao-encrypted").is_none());
    assert!(app.store.get(&session_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_unauthenticated_requests_cannot_push_rotation() {
    let mut config = E2eeConfig::default();
    config.max_requests_before_rotation = 3;
    let app = test_app(config);
    let mut client = app.client();
    app.connect(&mut client).await;
    let session_id = client.session_id().unwrap().to_string();

    for _ in 0..3 {
        app.send(
            Request::get("/api/session")
                .header("x-gao-session-id", session_id.as_str())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    }
    assert_eq!(app.transport.metrics().rotations(), 0);

    let sealed = client.seal_request(b"{\"after\":true}").unwrap();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text());
    let opened: Value =
        serde_json::from_slice(&client.open_response(&reply.text(), sealed.seq).unwrap()).unwrap();
    assert_eq!(opened["after"], true);
}

#[tokio::test]
async fn test_client_and_server_rotate_in_step() {
    let mut config = E2eeConfig::default();
    config.max_requests_before_rotation = 2;
    let app = test_app(config);
    let mut client = app.client();
    app.connect(&mut client).await;

    for i in 0..7 {
        let sealed = client
            .seal_request(json!({ "n": i }).to_string().as_bytes())
            .unwrap();
        let reply = app.send(sealed_post("/api/echo", &sealed)).await;
        assert_eq!(reply.status, StatusCode::OK, "request {} failed", i);
        let opened: Value =
            serde_json::from_slice(&client.open_response(&reply.text(), sealed.seq).unwrap())
                .unwrap();
        assert_eq!(opened["n"], i);
    }
    assert_eq!(app.transport.metrics().rotations(), 3);
}

#[tokio::test]
async fn test_clock_drift_forces_rehandshake() {
    let mut config = E2eeConfig::default();
    config.key_rotation_interval_ms = 10_000;
    let app = test_app(config);

    // Client with its own frozen clock never sees the interval elapse
    let mut client = gao_e2ee::client::E2eeClient::with_clock(
        10_000,
        std::sync::Arc::new(gao_e2ee::session::ManualClock::new(0)),
    );
    app.connect(&mut client).await;

    app.clock.advance(10_000);
    let sealed = client.seal_request(b"{}").unwrap();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error_type"], "decryption_failed");

    client.reset();
    assert!(matches!(client.seal_request(b"{}"), Err(ClientError::NoSession)));
    app.connect(&mut client).await;
    let sealed = client.seal_request(b"{}").unwrap();
    assert_eq!(
        app.send(sealed_post("/api/echo", &sealed)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_response_under_wrong_key_fails_on_client() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let forged = serialize(&encrypt(b"{}", SessionKey::generate().as_bytes(), 1).unwrap());
    assert!(matches!(
        client.open_response(&forged, 1),
        Err(ClientError::Crypto(CryptoError::DecryptionFailed))
    ));
}

#[tokio::test]
async fn test_end_session_over_http() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;
    let session_id = client.session_id().unwrap().to_string();

    let sealed = client.seal_request(b"").unwrap();
    let reply = app
        .send(sealed_request(Method::DELETE, "/api/session", &sealed))
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let opened: Value =
        serde_json::from_slice(&client.open_response(&reply.text(), sealed.seq).unwrap())
            .unwrap();
    assert_eq!(opened["ended"], session_id);

    let sealed = client.seal_request(b"{}").unwrap();
    let reply = app.send(sealed_post("/api/echo", &sealed)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let mut config = E2eeConfig::default();
    config.max_body_bytes = 256;
    let app = test_app(config);

    let big = json!({ "blob": "x".repeat(1024) });
    let reply = app.send(plain_post("/api/echo", &big)).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.json()["error_type"], "body_too_large");
}

#[tokio::test]
async fn test_rejections_visible_in_metrics() {
    let app = test_app(E2eeConfig::default());
    let mut client = app.client();
    app.connect(&mut client).await;

    let sealed = client.seal_request(b"{}").unwrap();
    app.send(sealed_post("/api/echo", &sealed)).await;
    app.send(sealed_post("/api/echo", &sealed)).await;

    let metrics = app
        .send(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .text();
    assert!(metrics.contains("gao_e2ee_rejected_total{reason=\"replay\"} 1"));
    assert!(metrics.contains("gao_e2ee_requests_opened_total 1"));
    assert!(metrics.contains("gao_e2ee_responses_sealed_total 1"));
}
