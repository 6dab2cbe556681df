// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! X25519 Key Exchange Implementation
//!
//! Ephemeral-ephemeral Diffie-Hellman used by the handshake. Each side
//! generates a fresh key pair, computes the shared secret from its own private
//! key and the peer's public key, then expands it with HKDF-SHA256 into two
//! independent 32-byte keys:
//!
//! - `encryption_key`: AEAD key for envelopes (info `gao-e2ee/v1/encryption`)
//! - `mac_key`: auxiliary integrity key (info `gao-e2ee/v1/mac`)
//!
//! The same derivation runs on the client (`crate::client`) and the server
//! (`crate::handshake`), so both arrive at identical keys.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use super::error::CryptoError;
use super::keys::{SessionKey, KEY_SIZE};

/// X25519 public key size
pub const PUBLIC_KEY_SIZE: usize = 32;

/// HKDF info for the envelope encryption key
pub const ENCRYPTION_KEY_INFO: &[u8] = b"gao-e2ee/v1/encryption";

/// HKDF info for the auxiliary MAC key
pub const MAC_KEY_INFO: &[u8] = b"gao-e2ee/v1/mac";

/// An ephemeral X25519 key pair
///
/// The private half is zeroized on drop by `x25519-dalek`.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new random key pair from the OS CSPRNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Derive both session keys with the peer's public key
    pub fn derive_session_keys(
        &self,
        peer_public: &[u8; PUBLIC_KEY_SIZE],
    ) -> Result<DerivedKeys, CryptoError> {
        let peer = PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer);

        // A low-order peer point forces an all-zero secret.
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey {
                key_type: "peer_public_key".to_string(),
                reason: "low-order point produces a non-contributory shared secret".to_string(),
            });
        }

        DerivedKeys::from_shared_secret(shared.as_bytes())
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Validate and copy a peer public key from untrusted input
pub fn parse_public_key(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKey {
        key_type: "public_key".to_string(),
        reason: format!("expected {} bytes, got {}", PUBLIC_KEY_SIZE, bytes.len()),
    })
}

/// The two keys produced by a handshake
#[derive(Debug, Clone)]
pub struct DerivedKeys {
    pub encryption_key: SessionKey,
    pub mac_key: SessionKey,
}

impl DerivedKeys {
    /// Expand a DH shared secret into the encryption and MAC keys
    pub fn from_shared_secret(shared_secret: &[u8]) -> Result<Self, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(None, shared_secret);

        let mut encryption = [0u8; KEY_SIZE];
        let mut mac = [0u8; KEY_SIZE];
        hkdf.expand(ENCRYPTION_KEY_INFO, &mut encryption)?;
        hkdf.expand(MAC_KEY_INFO, &mut mac)?;

        let keys = Self {
            encryption_key: SessionKey::from_bytes(encryption),
            mac_key: SessionKey::from_bytes(mac),
        };
        encryption.zeroize();
        mac.zeroize();
        Ok(keys)
    }
}
