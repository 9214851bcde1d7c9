// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay delivery to a servicer and classification of the outcome.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::codec::{canonical_encode, canonical_hash};
use super::error::RelayError;
use super::http::{endpoint, HttpPost};
use super::signer::verify_signature;
use super::types::{RelayRequest, RelayResponse, ServiceErrorBody, Servicer};

/// Service-network error codes meaning the session referenced by the proof
/// is no longer the servicer's current one:
///
/// - 14: servicer not part of the session
/// - 60: relay block height outside the session window
/// - 75: servicer is out of sync with the session height
pub const SESSION_EXPIRED_CODES: &[u32] = &[14, 60, 75];

/// What a servicer signs when it counter-signs a response.
#[derive(Debug, Serialize)]
struct ResponseSignatureInput<'a> {
    proof_signature: &'a str,
    response: &'a str,
}

pub struct Transport {
    http: Arc<dyn HttpPost>,
    relay_path: String,
    timeout: Duration,
    verify_signatures: bool,
}

impl Transport {
    pub fn new(
        http: Arc<dyn HttpPost>,
        relay_path: impl Into<String>,
        timeout: Duration,
        verify_signatures: bool,
    ) -> Self {
        Self {
            http,
            relay_path: relay_path.into(),
            timeout,
            verify_signatures,
        }
    }

    /// POST `request` to `servicer` and classify the reply.
    pub async fn send(
        &self,
        servicer: &Servicer,
        request: &RelayRequest,
    ) -> Result<RelayResponse, RelayError> {
        let url = endpoint(&servicer.service_url, &self.relay_path).map_err(|e| {
            RelayError::ServicerUnavailable(format!(
                "invalid service URL {}: {e}",
                servicer.service_url
            ))
        })?;
        let body = canonical_encode(request)?;

        let reply = self
            .http
            .post_json(&url, body, self.timeout)
            .await
            .map_err(|e| RelayError::ServicerUnavailable(format!("{}: {e}", servicer.address)))?;

        if reply.is_success() {
            let response: RelayResponse = serde_json::from_slice(&reply.body).map_err(|e| {
                RelayError::ProtocolError(format!("invalid relay response: {e}"))
            })?;
            if self.verify_signatures {
                check_response_signature(servicer, request, &response)?;
            }
            return Ok(response);
        }

        if reply.status >= 500 || reply.status == 408 || reply.status == 429 {
            return Err(RelayError::ServicerUnavailable(format!(
                "{} returned HTTP {}",
                servicer.address, reply.status
            )));
        }

        match serde_json::from_slice::<ServiceErrorBody>(&reply.body) {
            Ok(error) if SESSION_EXPIRED_CODES.contains(&error.code) => {
                Err(RelayError::SessionExpired {
                    code: error.code,
                    message: error.message,
                })
            }
            Ok(error) => Err(RelayError::ServicerRejected {
                code: error.code,
                message: error.message,
            }),
            Err(_) => Err(RelayError::ProtocolError(format!(
                "{} returned HTTP {} without an error body",
                servicer.address, reply.status
            ))),
        }
    }
}

fn check_response_signature(
    servicer: &Servicer,
    request: &RelayRequest,
    response: &RelayResponse,
) -> Result<(), RelayError> {
    let signature = response
        .signature
        .as_deref()
        .ok_or_else(|| RelayError::ProtocolError("relay response is not signed".to_string()))?;
    let hash = canonical_hash(&ResponseSignatureInput {
        proof_signature: &request.proof.signature,
        response: &response.response,
    })?;
    match verify_signature(&servicer.public_key, &hash, signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RelayError::ProtocolError(
            "relay response signature does not verify".to_string(),
        )),
        Err(e) => Err(RelayError::ProtocolError(format!(
            "relay response signature is malformed: {e}"
        ))),
    }
}

/// Counter-sign `response` the way a servicer does.
#[cfg(test)]
pub(crate) fn sign_response(
    servicer: &super::signer::Signer,
    request: &RelayRequest,
    response: &str,
) -> String {
    let hash = canonical_hash(&ResponseSignatureInput {
        proof_signature: &request.proof.signature,
        response,
    })
    .unwrap();
    servicer.sign_hex(&hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::aat;
    use crate::relay::envelope::{verify_envelope, EnvelopeBuilder};
    use crate::relay::http::HttpFailure;
    use crate::relay::signer::Signer;
    use crate::relay::testing::{
        relay_reply, servicer_error, servicer_for, servicer_signer, StubHttp, StubReply,
    };
    use crate::relay::types::{RelayMeta, RelayPayload, Session, SessionHeader};
    use serde_json::json;

    const NODE: &str = "http://node1";
    const RELAY_URL: &str = "http://node1/v1/client/relay";

    struct Fixture {
        client: Signer,
        servicer: Servicer,
        request: RelayRequest,
    }

    fn fixture() -> Fixture {
        let client = Signer::new();
        let app = Signer::new();
        let servicer = servicer_for(NODE);
        let session = Session {
            header: SessionHeader {
                app_public_key: app.public_key_hex().to_string(),
                chain: "0001".to_string(),
                geo_zone: "0001".to_string(),
                session_height: 10,
                num_servicers: 1,
            },
            key: "k".to_string(),
            servicers: vec![servicer.clone()],
        };
        let aat = aat::build(&app, client.public_key_hex()).unwrap();
        let request = EnvelopeBuilder::new(&client)
            .build(
                &session,
                &servicer,
                &RelayPayload::json_rpc(r#"{"id":1}"#),
                &aat,
                RelayMeta { block_height: 10 },
                3,
            )
            .unwrap();
        Fixture {
            client,
            servicer,
            request,
        }
    }

    fn transport(stub: &Arc<StubHttp>, verify: bool) -> Transport {
        Transport::new(stub.clone(), "/v1/client/relay", Duration::from_secs(1), verify)
    }

    #[tokio::test]
    async fn success_returns_response_and_posts_canonical_envelope() {
        let f = fixture();
        let stub = Arc::new(StubHttp::new());
        stub.always(RELAY_URL, relay_reply(r#"{"result":"0x1"}"#));

        let response = transport(&stub, false)
            .send(&f.servicer, &f.request)
            .await
            .unwrap();
        assert_eq!(response.response, r#"{"result":"0x1"}"#);

        let raw = stub.raw_calls(RELAY_URL);
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0], canonical_encode(&f.request).unwrap());

        let posted: RelayRequest = serde_json::from_slice(&raw[0]).unwrap();
        assert!(verify_envelope(&posted, f.client.public_key_hex()).unwrap());
    }

    #[tokio::test]
    async fn server_errors_and_timeouts_are_unavailable() {
        let f = fixture();
        let stub = Arc::new(StubHttp::new());
        stub.push(RELAY_URL, StubReply::raw(503, "busy"));
        stub.push(RELAY_URL, StubReply::Fail(HttpFailure::Timeout));
        stub.push(RELAY_URL, StubReply::raw(429, "slow down"));
        let transport = transport(&stub, false);

        for _ in 0..3 {
            let err = transport.send(&f.servicer, &f.request).await.unwrap_err();
            assert!(matches!(err, RelayError::ServicerUnavailable(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn session_codes_surface_as_expired() {
        let f = fixture();
        let stub = Arc::new(StubHttp::new());
        stub.always(RELAY_URL, servicer_error(400, 60, "invalid block height"));

        let err = transport(&stub, false)
            .send(&f.servicer, &f.request)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RelayError::SessionExpired {
                code: 60,
                message: "invalid block height".to_string()
            }
        );
    }

    #[tokio::test]
    async fn other_codes_are_rejections() {
        let f = fixture();
        let stub = Arc::new(StubHttp::new());
        stub.always(RELAY_URL, servicer_error(401, 4, "invalid signature"));

        let err = transport(&stub, false)
            .send(&f.servicer, &f.request)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::ServicerRejected { code: 4, .. }));
    }

    #[tokio::test]
    async fn unparseable_bodies_are_protocol_errors() {
        let f = fixture();
        let stub = Arc::new(StubHttp::new());
        stub.push(RELAY_URL, StubReply::raw(200, "not json"));
        stub.push(RELAY_URL, StubReply::raw(404, "nope"));
        let transport = transport(&stub, false);

        for _ in 0..2 {
            let err = transport.send(&f.servicer, &f.request).await.unwrap_err();
            assert!(matches!(err, RelayError::ProtocolError(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn verification_mode_checks_servicer_signature() {
        let f = fixture();
        let signature = sign_response(&servicer_signer(NODE), &f.request, "ok");

        let stub = Arc::new(StubHttp::new());
        stub.push(
            RELAY_URL,
            StubReply::json(200, json!({"response": "ok", "signature": signature})),
        );
        stub.push(
            RELAY_URL,
            StubReply::json(200, json!({"response": "tampered", "signature": signature})),
        );
        stub.push(RELAY_URL, relay_reply("unsigned"));
        let transport = transport(&stub, true);

        let ok = transport.send(&f.servicer, &f.request).await.unwrap();
        assert_eq!(ok.signature.as_deref(), Some(signature.as_str()));

        for _ in 0..2 {
            let err = transport.send(&f.servicer, &f.request).await.unwrap_err();
            assert!(matches!(err, RelayError::ProtocolError(_)), "{err:?}");
        }
    }
}
