// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay pipeline errors.

use super::codec::CodecError;

/// Errors surfaced by the relay pipeline.
///
/// The type is `Clone` so a single dispatch result can be handed to every
/// caller waiting on the same session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad key: {0}")]
    BadKey(String),

    #[error("Dispatch unavailable: {0}")]
    DispatchUnavailable(String),

    #[error("Dispatch rejected ({code}): {message}")]
    DispatchRejected { code: u32, message: String },

    #[error("No servicers in session for chain {chain} / zone {geo_zone}")]
    NoServicers { chain: String, geo_zone: String },

    #[error("Session expired ({code}): {message}")]
    SessionExpired { code: u32, message: String },

    #[error("Servicer unavailable: {0}")]
    ServicerUnavailable(String),

    #[error("Servicer rejected relay ({code}): {message}")]
    ServicerRejected { code: u32, message: String },

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Relay cancelled (deadline exceeded: {deadline_exceeded})")]
    Cancelled { deadline_exceeded: bool },

    #[error("Relay failed after {attempts} attempt(s): {last_cause}")]
    RelayFailed {
        attempts: u32,
        last_cause: Box<RelayError>,
    },
}

impl RelayError {
    /// Stable snake_case code for logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadRequest(_) => "bad_request",
            RelayError::Unauthorized(_) => "unauthorized",
            RelayError::Forbidden(_) => "forbidden",
            RelayError::BadKey(_) => "bad_key",
            RelayError::DispatchUnavailable(_) => "dispatch_unavailable",
            RelayError::DispatchRejected { .. } => "dispatch_rejected",
            RelayError::NoServicers { .. } => "no_servicers",
            RelayError::SessionExpired { .. } => "session_expired",
            RelayError::ServicerUnavailable(_) => "servicer_unavailable",
            RelayError::ServicerRejected { .. } => "servicer_rejected",
            RelayError::ProtocolError(_) => "protocol_error",
            RelayError::Cancelled { .. } => "cancelled",
            RelayError::RelayFailed { .. } => "relay_failed",
        }
    }

    /// Whether another attempt (against a different servicer or a fresh
    /// dispatch) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::DispatchUnavailable(_)
                | RelayError::ServicerUnavailable(_)
                | RelayError::SessionExpired { .. }
        )
    }

    /// The innermost cause, unwrapping `RelayFailed`.
    pub fn root_cause(&self) -> &RelayError {
        match self {
            RelayError::RelayFailed { last_cause, .. } => last_cause.root_cause(),
            other => other,
        }
    }
}

impl From<CodecError> for RelayError {
    fn from(err: CodecError) -> Self {
        RelayError::ProtocolError(format!("canonical encoding failed: {err}"))
    }
}
