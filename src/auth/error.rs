// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication and authorisation failures for application requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `X-App-ID` header present
    MissingAppId,
    /// No `X-API-Key` header present
    MissingApiKey,
    /// Header is not valid visible ASCII
    InvalidHeader,
    /// Unknown application or wrong API key
    InvalidCredentials,
    /// Application may not relay to this chain
    ChainNotAllowed(String),
    /// Request names a public key other than the application's
    PublicKeyMismatch,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAppId => "missing_app_id",
            AuthError::MissingApiKey => "missing_api_key",
            AuthError::InvalidHeader => "invalid_auth_header",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::ChainNotAllowed(_) => "chain_not_allowed",
            AuthError::PublicKeyMismatch => "public_key_mismatch",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAppId
            | AuthError::MissingApiKey
            | AuthError::InvalidHeader
            | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::ChainNotAllowed(_) | AuthError::PublicKeyMismatch => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAppId => write!(f, "X-App-ID header is required"),
            AuthError::MissingApiKey => write!(f, "X-API-Key header is required"),
            AuthError::InvalidHeader => write!(f, "Authentication headers must be ASCII"),
            AuthError::InvalidCredentials => write!(f, "Invalid application id or API key"),
            AuthError::ChainNotAllowed(chain) => {
                write!(f, "Application is not permitted on chain {chain}")
            }
            AuthError::PublicKeyMismatch => {
                write!(f, "pub_key does not belong to this application")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
