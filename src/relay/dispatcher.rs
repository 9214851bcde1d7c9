// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session dispatch against the service network.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::RelayError;
use super::http::{endpoint, HttpPost};
use super::types::{ServiceErrorBody, Session};

#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest<'a> {
    pub app_public_key: &'a str,
    pub chain: &'a str,
    pub geo_zone: &'a str,
    pub num_servicers: u32,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    session: Session,
    #[serde(default)]
    block_height: Option<u64>,
}

/// A session plus the network height reported alongside it.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub session: Session,
    pub block_height: u64,
}

pub struct Dispatcher {
    http: Arc<dyn HttpPost>,
    url: Url,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        http: Arc<dyn HttpPost>,
        dispatch_url: &str,
        dispatch_path: &str,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let url = endpoint(dispatch_url, dispatch_path)
            .map_err(|e| RelayError::BadRequest(format!("invalid dispatch URL: {e}")))?;
        Ok(Self { http, url, timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Ask the network for the session serving `request`.
    ///
    /// Servicers come back sorted by address so selection is reproducible.
    pub async fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<Dispatched, RelayError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| RelayError::BadRequest(format!("unencodable dispatch request: {e}")))?;

        let reply = self
            .http
            .post_json(&self.url, body, self.timeout)
            .await
            .map_err(|e| RelayError::DispatchUnavailable(e.to_string()))?;

        if reply.status >= 400 {
            if let Ok(error) = serde_json::from_slice::<ServiceErrorBody>(&reply.body) {
                return Err(RelayError::DispatchRejected {
                    code: error.code,
                    message: error.message,
                });
            }
            if reply.status >= 500 {
                return Err(RelayError::DispatchUnavailable(format!(
                    "dispatch returned HTTP {}",
                    reply.status
                )));
            }
            return Err(RelayError::DispatchRejected {
                code: u32::from(reply.status),
                message: String::from_utf8_lossy(&reply.body).into_owned(),
            });
        }

        let parsed: DispatchResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| RelayError::ProtocolError(format!("invalid dispatch response: {e}")))?;

        let mut session = parsed.session;
        check_header(&session, request)?;

        let before = session.servicers.len();
        session
            .servicers
            .retain(|servicer| match endpoint(&servicer.service_url, "") {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(
                        servicer = %servicer.address,
                        service_url = %servicer.service_url,
                        error = %e,
                        "Dropping servicer with invalid service URL"
                    );
                    false
                }
            });
        if session.servicers.is_empty() {
            return Err(RelayError::NoServicers {
                chain: request.chain.to_string(),
                geo_zone: request.geo_zone.to_string(),
            });
        }
        session.servicers.sort_by(|a, b| a.address.cmp(&b.address));

        tracing::debug!(
            chain = %request.chain,
            geo_zone = %request.geo_zone,
            session_height = session.header.session_height,
            servicers = session.servicers.len(),
            dropped = before - session.servicers.len(),
            "Dispatched session"
        );

        let block_height = parsed
            .block_height
            .unwrap_or(session.header.session_height);
        Ok(Dispatched {
            session,
            block_height,
        })
    }
}

fn check_header(session: &Session, request: &DispatchRequest<'_>) -> Result<(), RelayError> {
    let header = &session.header;
    if !header.app_public_key.eq_ignore_ascii_case(request.app_public_key)
        || header.chain != request.chain
        || header.geo_zone != request.geo_zone
    {
        return Err(RelayError::ProtocolError(format!(
            "dispatch returned a session for {}/{}/{}",
            header.app_public_key, header.chain, header.geo_zone
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::http::HttpFailure;
    use crate::relay::testing::{dispatch_reply, StubHttp, StubReply};
    use serde_json::json;

    const DISPATCH: &str = "http://dispatch.test/v1/client/dispatch";

    fn dispatcher(stub: &Arc<StubHttp>) -> Dispatcher {
        Dispatcher::new(
            stub.clone(),
            "http://dispatch.test",
            "/v1/client/dispatch",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn request<'a>(app: &'a str) -> DispatchRequest<'a> {
        DispatchRequest {
            app_public_key: app,
            chain: "0001",
            geo_zone: "0001",
            num_servicers: 2,
        }
    }

    #[tokio::test]
    async fn sorts_servicers_and_reports_height() {
        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            dispatch_reply("aa", "0001", "0001", 40, &["http://b", "http://a"]),
        );

        let dispatched = dispatcher(&stub).dispatch(&request("aa")).await.unwrap();
        let addresses: Vec<_> = dispatched
            .session
            .servicers
            .iter()
            .map(|s| s.address.clone())
            .collect();
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);
        assert_eq!(dispatched.block_height, 41);

        let calls = stub.calls(DISPATCH);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["app_public_key"], "aa");
        assert_eq!(calls[0]["num_servicers"], 2);
    }

    #[tokio::test]
    async fn transport_failure_is_unavailable() {
        let stub = Arc::new(StubHttp::new());
        stub.always(DISPATCH, StubReply::Fail(HttpFailure::Timeout));

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert!(matches!(err, RelayError::DispatchUnavailable(_)));
    }

    #[tokio::test]
    async fn structured_error_is_rejected() {
        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            StubReply::json(
                400,
                json!({"code": 8, "codespace": "viper", "message": "app not staked"}),
            ),
        );

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert_eq!(
            err,
            RelayError::DispatchRejected {
                code: 8,
                message: "app not staked".to_string()
            }
        );
    }

    #[tokio::test]
    async fn bare_5xx_is_unavailable() {
        let stub = Arc::new(StubHttp::new());
        stub.always(DISPATCH, StubReply::raw(502, "bad gateway"));

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert!(matches!(err, RelayError::DispatchUnavailable(_)));
    }

    #[tokio::test]
    async fn empty_session_is_no_servicers() {
        let stub = Arc::new(StubHttp::new());
        stub.always(DISPATCH, dispatch_reply("aa", "0001", "0001", 40, &[]));

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert!(matches!(err, RelayError::NoServicers { .. }));
    }

    #[tokio::test]
    async fn garbage_body_is_protocol_error() {
        let stub = Arc::new(StubHttp::new());
        stub.always(DISPATCH, StubReply::raw(200, "<html>"));

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert!(matches!(err, RelayError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn mismatched_header_is_protocol_error() {
        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            dispatch_reply("bb", "0001", "0001", 40, &["http://a"]),
        );

        let err = dispatcher(&stub).dispatch(&request("aa")).await.unwrap_err();
        assert!(matches!(err, RelayError::ProtocolError(_)));
    }

    #[tokio::test]
    async fn servicers_with_bad_urls_are_dropped() {
        let stub = Arc::new(StubHttp::new());
        stub.always(
            DISPATCH,
            dispatch_reply("aa", "0001", "0001", 40, &["not a url", "http://ok"]),
        );

        let dispatched = dispatcher(&stub).dispatch(&request("aa")).await.unwrap();
        assert_eq!(dispatched.session.servicers.len(), 1);
        assert_eq!(dispatched.session.servicers[0].service_url, "http://ok");
    }
}
