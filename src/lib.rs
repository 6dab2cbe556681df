// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod client;
pub mod config;
pub mod crypto;
pub mod handshake;
pub mod monitoring;
pub mod rotation;
pub mod session;
pub mod transport;
pub mod version;

// Re-export main types
pub use client::{ClientError, E2eeClient, SealedRequest};
pub use config::{ConfigError, E2eeConfig};
pub use crypto::{CryptoError, Envelope, SessionKey};
pub use handshake::{HandshakeError, HandshakeProtocol, HandshakeRequest, HandshakeResponse};
pub use monitoring::TransportMetrics;
pub use rotation::{KeyRatchet, RotationError, RotationPolicy};
pub use session::{
    Clock, InMemorySessionStore, ManualClock, Session, SessionStore, StoreError, SweepHandle,
    SystemClock,
};
pub use transport::{protect, E2eeTransport, SessionInfo, TransportError};
