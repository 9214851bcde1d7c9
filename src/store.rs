// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Registered applications.
//!
//! Persistence lives outside the gateway; handlers only need a lookup by
//! application id. [`InMemoryApplicationStore`] is seeded at startup from
//! a JSON file and is what the server runs with.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::relay::signer::parse_public_key;
use crate::relay::{Aat, AppAuthorization, Signer};

/// Application as stored by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub app_id: String,
    pub name: String,
    /// Lowercase hex SHA-256 of the API key.
    pub api_key_sha256: String,
    pub public_key: String,
    /// Chains the application may relay to; empty means any.
    #[serde(default)]
    pub allowed_chains: Vec<String>,
    /// Token issued by the tenant to this gateway.
    #[serde(default)]
    pub aat: Option<Aat>,
    /// Application key, for tenants that let the gateway issue tokens.
    #[serde(default, skip_serializing)]
    pub private_key_hex: Option<String>,
}

/// Application ready for use by handlers.
#[derive(Debug, Clone)]
pub struct Application {
    pub app_id: String,
    pub name: String,
    pub public_key: String,
    pub allowed_chains: Vec<String>,
    pub authorization: AppAuthorization,
    api_key_sha256: String,
}

impl Application {
    pub fn allows_chain(&self, chain: &str) -> bool {
        self.allowed_chains.is_empty() || self.allowed_chains.iter().any(|c| c == chain)
    }

    pub fn api_key_matches(&self, api_key: &str) -> bool {
        hash_api_key(api_key) == self.api_key_sha256
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read applications file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid applications file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid application {app_id}: {reason}")]
    InvalidRecord { app_id: String, reason: String },
}

pub trait ApplicationStore: Send + Sync {
    fn find(&self, app_id: &str) -> Option<Arc<Application>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hex SHA-256 of an API key, as kept in [`ApplicationRecord::api_key_sha256`].
pub fn hash_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

#[derive(Default)]
pub struct InMemoryApplicationStore {
    applications: RwLock<HashMap<String, Arc<Application>>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of [`ApplicationRecord`]s.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read(path.as_ref())?;
        let records: Vec<ApplicationRecord> = serde_json::from_slice(&raw)?;
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    /// Validate `record` and make it available for lookups, replacing any
    /// application with the same id.
    pub fn insert(&self, record: ApplicationRecord) -> Result<(), StoreError> {
        let invalid = |reason: String| StoreError::InvalidRecord {
            app_id: record.app_id.clone(),
            reason,
        };

        let public_key = parse_public_key(&record.public_key)
            .map(|key| hex::encode(key.as_bytes()))
            .map_err(|e| invalid(e.to_string()))?;
        if !matches!(hex::decode(&record.api_key_sha256), Ok(hash) if hash.len() == 32) {
            return Err(invalid("api_key_sha256 must be 32 bytes of hex".to_string()));
        }

        let authorization = match (&record.private_key_hex, &record.aat) {
            (Some(private_key_hex), _) => {
                let signer = Signer::from_private_key_hex(private_key_hex)
                    .map_err(|e| invalid(e.to_string()))?;
                if signer.public_key_hex() != public_key {
                    return Err(invalid(
                        "private key does not match public_key".to_string(),
                    ));
                }
                AppAuthorization::Signer(Arc::new(signer))
            }
            (None, Some(aat)) => AppAuthorization::Token(aat.clone()),
            (None, None) => {
                return Err(invalid(
                    "either aat or private_key_hex is required".to_string(),
                ))
            }
        };

        let application = Application {
            app_id: record.app_id.clone(),
            name: record.name.clone(),
            public_key,
            allowed_chains: record.allowed_chains.clone(),
            authorization,
            api_key_sha256: record.api_key_sha256.to_lowercase(),
        };

        tracing::debug!(
            app_id = %application.app_id,
            name = %application.name,
            "Registered application"
        );
        self.applications
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.app_id, Arc::new(application));
        Ok(())
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn find(&self, app_id: &str) -> Option<Arc<Application>> {
        self.applications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app_id)
            .cloned()
    }

    fn len(&self) -> usize {
        self.applications
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
