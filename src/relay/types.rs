// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wire types shared by the dispatcher, the envelope builder and the
//! transport.
//!
//! Field names are part of the signed encoding and must not change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// AAT version understood by the service network.
pub const AAT_VERSION: &str = "0.0.1";

/// Application Authentication Token.
///
/// Binds an application public key to the gateway client key. The
/// `signature` is the application's signature over the canonical hash of
/// the token with an empty `signature`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aat {
    pub version: String,
    pub app_pub_key: String,
    pub client_pub_key: String,
    pub signature: String,
}

impl Aat {
    /// Copy of the token with the signature cleared, as hashed for signing.
    pub fn unsigned(&self) -> Aat {
        Aat {
            signature: String::new(),
            ..self.clone()
        }
    }
}

/// A servicer assigned to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Servicer {
    pub address: String,
    pub public_key: String,
    pub service_url: String,
}

/// Identifies the (application, chain, zone) tuple a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub app_public_key: String,
    pub chain: String,
    pub geo_zone: String,
}

impl SessionKey {
    pub fn new(
        app_public_key: impl Into<String>,
        chain: impl Into<String>,
        geo_zone: impl Into<String>,
    ) -> Self {
        Self {
            app_public_key: app_public_key.into().to_lowercase(),
            chain: chain.into(),
            geo_zone: geo_zone.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_public_key, self.chain, self.geo_zone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    pub app_public_key: String,
    pub chain: String,
    pub geo_zone: String,
    pub session_height: u64,
    pub num_servicers: u32,
}

/// Servicers assigned to an application for a chain and zone.
///
/// Valid while the network height lies in
/// `[session_height, session_height + session_block_frequency)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub header: SessionHeader,
    pub key: String,
    pub servicers: Vec<Servicer>,
}

impl Session {
    pub fn cache_key(&self) -> SessionKey {
        SessionKey::new(
            &self.header.app_public_key,
            &self.header.chain,
            &self.header.geo_zone,
        )
    }

    /// Whether `height` still falls inside this session's window.
    pub fn is_valid_at(&self, height: u64, session_block_frequency: u64) -> bool {
        let start = self.header.session_height;
        height >= start && height < start.saturating_add(session_block_frequency)
    }
}

/// Upstream call carried by a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub data: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl RelayPayload {
    /// JSON-RPC body sent with `POST` to the chain root.
    pub fn json_rpc(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            method: default_method(),
            path: String::new(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMeta {
    pub block_height: u64,
}

/// Signed proof that an authorised application issued a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProof {
    pub request_hash: String,
    pub entropy: u64,
    pub session_block_height: u64,
    pub servicer_pub_key: String,
    pub blockchain: String,
    pub aat: Aat,
    pub signature: String,
    pub geo_zone: String,
    pub num_servicers: u32,
}

impl RelayProof {
    /// Copy of the proof with the signature cleared, as hashed for signing.
    pub fn unsigned(&self) -> RelayProof {
        RelayProof {
            signature: String::new(),
            ..self.clone()
        }
    }
}

/// The object whose canonical hash becomes `RelayProof::request_hash`.
#[derive(Debug, Serialize)]
pub struct RequestHashInput<'a> {
    pub payload: &'a RelayPayload,
    pub meta: &'a RelayMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub payload: RelayPayload,
    pub meta: RelayMeta,
    pub proof: RelayProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Structured error body returned by dispatch nodes and servicers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub message: String,
}
