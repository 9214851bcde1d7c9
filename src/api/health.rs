// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
    /// Address of the gateway client key that signs relay proofs.
    pub client_address: String,
    /// Highest block height reported by the service network so far.
    pub believed_height: u64,
    pub cached_sessions: usize,
}

/// Individual health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Whether any application is registered to relay for.
    pub applications: String,
}

/// Simple health check response for liveness checks.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness handler.
///
/// Always returns 200 if the process is running.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness handler.
///
/// Returns 503 while no application is registered; the gateway cannot
/// authenticate any relay until one is.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let applications_ok = !state.applications.is_empty();

    let response = ReadyResponse {
        status: if applications_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            applications: if applications_ok { "ok" } else { "none" }.to_string(),
        },
        client_address: state.gateway.client_address().to_string(),
        believed_height: state.gateway.believed_height(),
        cached_sessions: state.gateway.cached_sessions(),
    };

    let status = if applications_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
