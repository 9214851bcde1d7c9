// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ED25519 key store for the gateway client and for applications.
//!
//! The private key never leaves this module. Callers only see signatures,
//! the hex public key and the address (lowercase hex of the first 20 bytes
//! of SHA-256 over the public key).

use std::fmt;

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use super::error::RelayError;

/// ED25519 seed length in bytes.
pub const SEED_LEN: usize = 32;

/// Seed followed by the public key, as exported by most ED25519 tooling.
pub const KEYPAIR_LEN: usize = 64;

/// Address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Long-lived ED25519 keypair.
pub struct Signer {
    signing_key: SigningKey,
    public_key_hex: String,
    address_hex: String,
}

impl Signer {
    /// Generate a fresh keypair from the OS RNG.
    pub fn new() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Restore a keypair from hex.
    ///
    /// Accepts a 32-byte seed or a 64-byte `seed || public key` pair; in the
    /// latter case the embedded public key must match the seed.
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, RelayError> {
        let raw = private_key_hex.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes =
            hex::decode(raw).map_err(|e| RelayError::BadKey(format!("invalid hex: {e}")))?;

        let signing_key = match bytes.len() {
            SEED_LEN => {
                let mut seed = [0u8; SEED_LEN];
                seed.copy_from_slice(&bytes);
                SigningKey::from_bytes(&seed)
            }
            KEYPAIR_LEN => {
                let mut pair = [0u8; KEYPAIR_LEN];
                pair.copy_from_slice(&bytes);
                SigningKey::from_keypair_bytes(&pair)
                    .map_err(|e| RelayError::BadKey(format!("invalid keypair: {e}")))?
            }
            other => {
                return Err(RelayError::BadKey(format!(
                    "expected {SEED_LEN} or {KEYPAIR_LEN} bytes, got {other}"
                )))
            }
        };

        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_bytes = signing_key.verifying_key().to_bytes();
        Self {
            public_key_hex: hex::encode(public_bytes),
            address_hex: address_from_public_key(&public_bytes),
            signing_key,
        }
    }

    /// Sign `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Sign `message`, returning the lowercase hex signature.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    pub fn address_hex(&self) -> &str {
        &self.address_hex
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address_hex)
            .finish_non_exhaustive()
    }
}

/// Lowercase hex of `SHA-256(public_key)[0..20]`.
pub fn address_from_public_key(public_key: &[u8]) -> String {
    let digest = Sha256::digest(public_key);
    hex::encode(&digest[..ADDRESS_LEN])
}

/// Parse a hex ED25519 public key.
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, RelayError> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|e| RelayError::BadKey(format!("invalid public key hex: {e}")))?;
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        RelayError::BadKey(format!("public key must be 32 bytes, got {}", bytes.len()))
    })?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| RelayError::BadKey(format!("invalid public key: {e}")))
}

/// Verify a hex signature over `message` with a hex public key.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// `Err(BadKey)` when the key or signature cannot be decoded.
pub fn verify_signature(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<bool, RelayError> {
    let key = parse_public_key(public_key_hex)?;
    let bytes = hex::decode(signature_hex.trim())
        .map_err(|e| RelayError::BadKey(format!("invalid signature hex: {e}")))?;
    let bytes: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
        RelayError::BadKey(format!("signature must be 64 bytes, got {}", bytes.len()))
    })?;
    let signature = Signature::from_bytes(&bytes);
    Ok(key.verify(message, &signature).is_ok())
}
