// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request and response bodies of the `/relay` endpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::relay::{RelayPayload, RelayResponse, SessionRequest};

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchRequestBody {
    pub pub_key: String,
    pub blockchain: String,
    pub geo_zone: String,
    pub num_servicers: u32,
}

impl DispatchRequestBody {
    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            app_public_key: self.pub_key.clone(),
            chain: self.blockchain.clone(),
            geo_zone: self.geo_zone.clone(),
            num_servicers: self.num_servicers,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecuteRequestBody {
    pub pub_key: String,
    pub blockchain: String,
    pub geo_zone: String,
    pub num_servicers: u32,
    /// Upstream RPC body, either a JSON string holding the body text or any
    /// other JSON value, which is serialised. Text that parses as JSON is
    /// sent to the servicer in canonical form.
    pub data: Value,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl ExecuteRequestBody {
    pub fn session_request(&self) -> SessionRequest {
        SessionRequest {
            app_public_key: self.pub_key.clone(),
            chain: self.blockchain.clone(),
            geo_zone: self.geo_zone.clone(),
            num_servicers: self.num_servicers,
        }
    }

    pub fn payload(&self) -> Result<RelayPayload, ApiError> {
        let data = match &self.data {
            Value::Null => return Err(ApiError::bad_request("data is required")),
            Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        Ok(RelayPayload {
            data,
            method: self.method.to_ascii_uppercase(),
            path: self.path.clone(),
            headers: self.headers.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectRequestBody {
    #[serde(flatten)]
    pub execute: ExecuteRequestBody,
    pub servicer_url: String,
    pub servicer_pub_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecuteResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl From<RelayResponse> for ExecuteResponse {
    fn from(relay: RelayResponse) -> Self {
        Self {
            response: relay.response,
            signature: relay.signature,
        }
    }
}
