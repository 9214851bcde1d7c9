// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scripted in-memory [`HttpPost`] and fixtures for relay tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use url::Url;

use super::envelope::EntropySource;
use super::http::{HttpFailure, HttpPost, HttpReply};
use super::signer::Signer;
use super::types::Servicer;

#[derive(Debug, Clone)]
pub enum StubReply {
    Reply(HttpReply),
    Fail(HttpFailure),
    Delayed(Duration, Box<StubReply>),
}

impl StubReply {
    pub fn json(status: u16, body: Value) -> Self {
        StubReply::Reply(HttpReply {
            status,
            body: body.to_string().into_bytes(),
        })
    }

    pub fn raw(status: u16, body: &str) -> Self {
        StubReply::Reply(HttpReply {
            status,
            body: body.as_bytes().to_vec(),
        })
    }

    pub fn delayed(self, delay: Duration) -> Self {
        StubReply::Delayed(delay, Box::new(self))
    }
}

/// Per-URL reply script. Queued replies are used first, then the sticky
/// reply; URLs with neither fail with a connection error.
#[derive(Default)]
pub struct StubHttp {
    queued: Mutex<HashMap<String, VecDeque<StubReply>>>,
    sticky: Mutex<HashMap<String, StubReply>>,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl StubHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, reply: StubReply) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn always(&self, url: &str, reply: StubReply) {
        self.sticky.lock().unwrap().insert(url.to_string(), reply);
    }

    /// Decoded JSON bodies posted to `url`, in order.
    pub fn calls(&self, url: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, body)| serde_json::from_slice(body).unwrap_or(Value::Null))
            .collect()
    }

    /// Raw bodies posted to `url`, in order.
    pub fn raw_calls(&self, url: &str) -> Vec<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_reply(&self, url: &str) -> StubReply {
        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.sticky
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| StubReply::Fail(HttpFailure::Connect(format!("no route to {url}"))))
    }
}

#[async_trait]
impl HttpPost for StubHttp {
    async fn post_json(
        &self,
        url: &Url,
        body: Vec<u8>,
        _timeout: Duration,
    ) -> Result<HttpReply, HttpFailure> {
        let url = url.as_str().to_string();
        self.calls.lock().unwrap().push((url.clone(), body));

        let mut reply = self.next_reply(&url);
        loop {
            match reply {
                StubReply::Reply(reply) => return Ok(reply),
                StubReply::Fail(failure) => return Err(failure),
                StubReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

/// Entropy that counts up from a fixed start.
pub struct FixedEntropy(AtomicU64);

impl FixedEntropy {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }
}

impl EntropySource for FixedEntropy {
    fn next_entropy(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Deterministic servicer identity for a service URL.
pub fn servicer_for(url: &str) -> Servicer {
    let seed = hex::encode(Sha256::digest(url.as_bytes()));
    let signer = Signer::from_private_key_hex(&seed).unwrap();
    Servicer {
        address: signer.address_hex().to_string(),
        public_key: signer.public_key_hex().to_string(),
        service_url: url.to_string(),
    }
}

/// Signer behind [`servicer_for`], for counter-signing responses.
pub fn servicer_signer(url: &str) -> Signer {
    let seed = hex::encode(Sha256::digest(url.as_bytes()));
    Signer::from_private_key_hex(&seed).unwrap()
}

/// Successful dispatch body; `block_height` is reported one past the
/// session height.
pub fn dispatch_reply(
    app_public_key: &str,
    chain: &str,
    geo_zone: &str,
    session_height: u64,
    urls: &[&str],
) -> StubReply {
    let servicers: Vec<Value> = urls
        .iter()
        .map(|url| {
            let servicer = servicer_for(url);
            json!({
                "address": servicer.address,
                "public_key": servicer.public_key,
                "service_url": servicer.service_url,
            })
        })
        .collect();

    StubReply::json(
        200,
        json!({
            "session": {
                "header": {
                    "app_public_key": app_public_key,
                    "chain": chain,
                    "geo_zone": geo_zone,
                    "session_height": session_height,
                    "num_servicers": urls.len(),
                },
                "key": format!("session-{session_height}"),
                "servicers": servicers,
            },
            "block_height": session_height + 1,
        }),
    )
}

/// Successful relay body wrapping `response`.
pub fn relay_reply(response: &str) -> StubReply {
    StubReply::json(200, json!({ "response": response }))
}

/// Servicer error body.
pub fn servicer_error(status: u16, code: u32, message: &str) -> StubReply {
    StubReply::json(
        status,
        json!({ "code": code, "codespace": "viper", "message": message }),
    )
}
