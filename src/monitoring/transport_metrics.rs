// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! E2EE Transport Prometheus Metrics
//!
//! Counters for handshakes, rotations and every class of rejected request.
//! Clones share the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidEnvelope,
    DecryptionFailed,
    SessionNotFound,
    Replay,
    EncryptionRequired,
}

#[derive(Debug, Clone, Default)]
pub struct TransportMetrics {
    /// Sessions established
    handshakes: Arc<AtomicU64>,
    /// Handshakes refused or failed
    handshake_failures: Arc<AtomicU64>,
    /// Key rotations performed
    rotations: Arc<AtomicU64>,
    /// Inbound envelopes decrypted
    requests_opened: Arc<AtomicU64>,
    /// Outbound bodies encrypted
    responses_sealed: Arc<AtomicU64>,
    invalid_envelopes: Arc<AtomicU64>,
    decryption_failures: Arc<AtomicU64>,
    session_misses: Arc<AtomicU64>,
    replays_rejected: Arc<AtomicU64>,
    plaintext_rejected: Arc<AtomicU64>,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_handshake(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handshake_failure(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_opened(&self) {
        self.requests_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_sealed(&self) {
        self.responses_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: Rejection) {
        let counter = match reason {
            Rejection::InvalidEnvelope => &self.invalid_envelopes,
            Rejection::DecryptionFailed => &self.decryption_failures,
            Rejection::SessionNotFound => &self.session_misses,
            Rejection::Replay => &self.replays_rejected,
            Rejection::EncryptionRequired => &self.plaintext_rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::Relaxed)
    }

    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    pub fn rejections(&self, reason: Rejection) -> u64 {
        match reason {
            Rejection::InvalidEnvelope => &self.invalid_envelopes,
            Rejection::DecryptionFailed => &self.decryption_failures,
            Rejection::SessionNotFound => &self.session_misses,
            Rejection::Replay => &self.replays_rejected,
            Rejection::EncryptionRequired => &self.plaintext_rejected,
        }
        .load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self, live_sessions: usize) -> String {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        format!(
            r#"# HELP gao_e2ee_live_sessions Sessions currently established and not expired
# TYPE gao_e2ee_live_sessions gauge
gao_e2ee_live_sessions {}

# HELP gao_e2ee_handshakes_total Sessions established
# TYPE gao_e2ee_handshakes_total counter
gao_e2ee_handshakes_total {}

# HELP gao_e2ee_handshake_failures_total Handshakes refused or failed
# TYPE gao_e2ee_handshake_failures_total counter
gao_e2ee_handshake_failures_total {}

# HELP gao_e2ee_rotations_total Key rotations performed
# TYPE gao_e2ee_rotations_total counter
gao_e2ee_rotations_total {}

# HELP gao_e2ee_requests_opened_total Inbound envelopes decrypted
# TYPE gao_e2ee_requests_opened_total counter
gao_e2ee_requests_opened_total {}

# HELP gao_e2ee_responses_sealed_total Outbound bodies encrypted
# TYPE gao_e2ee_responses_sealed_total counter
gao_e2ee_responses_sealed_total {}

# HELP gao_e2ee_rejected_total Requests rejected by the transport
# TYPE gao_e2ee_rejected_total counter
gao_e2ee_rejected_total{{reason="invalid_envelope"}} {}
gao_e2ee_rejected_total{{reason="decryption_failed"}} {}
gao_e2ee_rejected_total{{reason="session_not_found"}} {}
gao_e2ee_rejected_total{{reason="replay"}} {}
gao_e2ee_rejected_total{{reason="encryption_required"}} {}
"#,
            live_sessions,
            load(&self.handshakes),
            load(&self.handshake_failures),
            load(&self.rotations),
            load(&self.requests_opened),
            load(&self.responses_sealed),
            load(&self.invalid_envelopes),
            load(&self.decryption_failures),
            load(&self.session_misses),
            load(&self.replays_rejected),
            load(&self.plaintext_rejected),
        )
    }
}
