// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::AuthError;
use crate::relay::RelayError;

/// Non-standard status used when the caller goes away mid-relay.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }
}

/// HTTP status for a relay error. `RelayFailed` takes the status of its
/// last cause.
pub fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::BadRequest(_) | RelayError::BadKey(_) => StatusCode::BAD_REQUEST,
        RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        RelayError::Forbidden(_) => StatusCode::FORBIDDEN,
        RelayError::DispatchUnavailable(_)
        | RelayError::DispatchRejected { .. }
        | RelayError::SessionExpired { .. }
        | RelayError::ServicerUnavailable(_)
        | RelayError::ServicerRejected { .. } => StatusCode::BAD_GATEWAY,
        RelayError::NoServicers { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::ProtocolError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Cancelled {
            deadline_exceeded: true,
        } => StatusCode::GATEWAY_TIMEOUT,
        RelayError::Cancelled {
            deadline_exceeded: false,
        } => StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST),
        RelayError::RelayFailed { last_cause, .. } => status_for(last_cause),
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::warn!(error = %err, code = err.kind(), "Relay request failed");
        }
        Self::new(status, err.kind(), err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::new(err.status_code(), err.error_code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_code() {
        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.code, "bad_request");

        let unauth = ApiError::unauthorized("who");
        assert_eq!(unauth.status, StatusCode::UNAUTHORIZED);

        let forbidden = ApiError::forbidden("no");
        assert_eq!(forbidden.status, StatusCode::FORBIDDEN);
        assert_eq!(forbidden.message, "no");
    }

    #[test]
    fn relay_errors_map_to_statuses() {
        let cases = [
            (RelayError::BadKey("short".into()), 400),
            (RelayError::Unauthorized("aat".into()), 401),
            (RelayError::Forbidden("chain".into()), 403),
            (RelayError::DispatchUnavailable("down".into()), 502),
            (
                RelayError::NoServicers {
                    chain: "0001".into(),
                    geo_zone: "0001".into(),
                },
                503,
            ),
            (RelayError::ProtocolError("garbage".into()), 500),
            (
                RelayError::Cancelled {
                    deadline_exceeded: true,
                },
                504,
            ),
            (
                RelayError::Cancelled {
                    deadline_exceeded: false,
                },
                499,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err).as_u16(), status, "{err:?}");
        }
    }

    #[test]
    fn relay_failed_inherits_last_cause() {
        let err = RelayError::RelayFailed {
            attempts: 3,
            last_cause: Box::new(RelayError::ServicerUnavailable("503".into())),
        };
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::BAD_GATEWAY);
        assert_eq!(api.code, "relay_failed");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }
}
