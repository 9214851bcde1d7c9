// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay envelope construction.
//!
//! A relay carries the upstream payload, the height the gateway believes is
//! current, and a proof signed by the gateway client key. The proof commits
//! to the payload through `request_hash` and to the chosen servicer through
//! `servicer_pub_key`, so a new envelope is built for every attempt.

use rand::rngs::OsRng;
use rand::RngCore;

use super::codec::{canonical_hash, canonical_hash_hex, normalize_json_text};
use super::error::RelayError;
use super::signer::{verify_signature, Signer};
use super::types::{
    Aat, RelayMeta, RelayPayload, RelayProof, RelayRequest, RequestHashInput, Servicer, Session,
};

/// Source of per-relay entropy.
pub trait EntropySource: Send + Sync {
    fn next_entropy(&self) -> u64;
}

/// Entropy drawn from the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_entropy(&self) -> u64 {
        OsRng.next_u64()
    }
}

pub struct EnvelopeBuilder<'a> {
    signer: &'a Signer,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(signer: &'a Signer) -> Self {
        Self { signer }
    }

    /// Build and sign a relay for `servicer` within `session`.
    ///
    /// JSON payload bodies are rewritten into canonical form before hashing,
    /// so semantically equal bodies produce the same `request_hash`.
    pub fn build(
        &self,
        session: &Session,
        servicer: &Servicer,
        payload: &RelayPayload,
        aat: &Aat,
        meta: RelayMeta,
        entropy: u64,
    ) -> Result<RelayRequest, RelayError> {
        if !session
            .servicers
            .iter()
            .any(|s| s.public_key == servicer.public_key)
        {
            return Err(RelayError::BadRequest(format!(
                "servicer {} is not part of the session",
                servicer.address
            )));
        }

        let payload = RelayPayload {
            data: normalize_json_text(&payload.data),
            ..payload.clone()
        };
        let request_hash = canonical_hash_hex(&RequestHashInput {
            payload: &payload,
            meta: &meta,
        })?;

        let mut proof = RelayProof {
            request_hash,
            entropy,
            session_block_height: session.header.session_height,
            servicer_pub_key: servicer.public_key.clone(),
            blockchain: session.header.chain.clone(),
            aat: aat.clone(),
            signature: String::new(),
            geo_zone: session.header.geo_zone.clone(),
            num_servicers: session.header.num_servicers,
        };
        let sig_hash = canonical_hash(&proof)?;
        proof.signature = self.signer.sign_hex(&sig_hash);

        Ok(RelayRequest {
            payload,
            meta,
            proof,
        })
    }
}

/// Recompute the request hash and check the client signature, the way a
/// servicer validates an incoming relay.
pub fn verify_envelope(
    request: &RelayRequest,
    client_public_key: &str,
) -> Result<bool, RelayError> {
    let request_hash = canonical_hash_hex(&RequestHashInput {
        payload: &request.payload,
        meta: &request.meta,
    })?;
    if request_hash != request.proof.request_hash {
        return Ok(false);
    }
    let sig_hash = canonical_hash(&request.proof.unsigned())?;
    verify_signature(client_public_key, &sig_hash, &request.proof.signature)
}
