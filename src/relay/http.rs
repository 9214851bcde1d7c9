// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound JSON POST capability shared by the dispatcher and the transport.
//!
//! Both only need "POST these bytes, give me status and body", so tests can
//! substitute an in-memory implementation without opening sockets.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use url::Url;

/// Connect timeout applied to every outbound request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure: no HTTP status was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpFailure {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait HttpPost: Send + Sync {
    /// POST `body` as `application/json` to `url`.
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpReply, HttpFailure>;
}

/// [`HttpPost`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestPost {
    client: Client,
}

impl ReqwestPost {
    pub fn new() -> Result<Self, HttpFailure> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| HttpFailure::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpPost for ReqwestPost {
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<HttpReply, HttpFailure> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;

        Ok(HttpReply {
            status,
            body: body.to_vec(),
        })
    }
}

fn classify(err: reqwest::Error) -> HttpFailure {
    if err.is_timeout() {
        HttpFailure::Timeout
    } else if err.is_connect() {
        HttpFailure::Connect(err.to_string())
    } else {
        HttpFailure::Other(err.to_string())
    }
}

/// Append `path` to `base`, keeping any path prefix already on `base`.
pub fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    // Validate the base on its own first so errors point at it.
    Url::parse(base)?;
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
}
