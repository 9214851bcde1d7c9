// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, Json};

use crate::{
    auth::{AppAuth, AuthError},
    error::ApiError,
    models::{DirectRequestBody, DispatchRequestBody, ExecuteRequestBody, ExecuteResponse},
    relay::{CallContext, DirectServicer, RelayOptions, Session, SessionRequest},
    state::AppState,
    store::Application,
};

/// Check that `app` may act for `pub_key` on `chain`.
fn authorize(app: &Application, pub_key: &str, chain: &str) -> Result<(), AuthError> {
    let pub_key = pub_key.trim();
    let pub_key = pub_key.strip_prefix("0x").unwrap_or(pub_key);
    if !app.public_key.eq_ignore_ascii_case(pub_key) {
        return Err(AuthError::PublicKeyMismatch);
    }
    if !app.allows_chain(chain) {
        return Err(AuthError::ChainNotAllowed(chain.to_string()));
    }
    Ok(())
}

/// Relay context bounded by enough time for every attempt plus a dispatch,
/// and cancelled on shutdown.
fn call_context(state: &AppState) -> CallContext {
    let config = state.gateway.config();
    CallContext::with_token(state.shutdown.child_token())
        .with_timeout(config.request_timeout * config.max_attempts.saturating_add(1))
}

fn session_for(app: &Application, mut request: SessionRequest) -> SessionRequest {
    request.app_public_key = app.public_key.clone();
    request
}

/// `POST /relay/dispatch`: session for the application, chain and zone.
pub async fn dispatch(
    State(state): State<AppState>,
    AppAuth(app): AppAuth,
    Json(body): Json<DispatchRequestBody>,
) -> Result<Json<Session>, ApiError> {
    authorize(&app, &body.pub_key, &body.blockchain)?;
    let request = session_for(&app, body.session_request());

    let session = state
        .gateway
        .dispatch(&request, &call_context(&state))
        .await?;
    Ok(Json(Session::clone(&session)))
}

/// `POST /relay/execute`: orchestrated relay with servicer failover.
pub async fn execute(
    State(state): State<AppState>,
    AppAuth(app): AppAuth,
    Json(body): Json<ExecuteRequestBody>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    authorize(&app, &body.pub_key, &body.blockchain)?;
    let options = RelayOptions {
        session: session_for(&app, body.session_request()),
        payload: body.payload()?,
        authorization: app.authorization.clone(),
    };

    tracing::debug!(app_id = %app.app_id, chain = %body.blockchain, "Executing relay");
    let response = state
        .gateway
        .execute_relay(&options, &call_context(&state))
        .await?;
    Ok(Json(response.into()))
}

/// `POST /relay/direct`: relay to a caller-named servicer, skipping dispatch.
pub async fn direct(
    State(state): State<AppState>,
    AppAuth(app): AppAuth,
    Json(body): Json<DirectRequestBody>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let execute = &body.execute;
    authorize(&app, &execute.pub_key, &execute.blockchain)?;
    let options = RelayOptions {
        session: session_for(&app, execute.session_request()),
        payload: execute.payload()?,
        authorization: app.authorization.clone(),
    };
    let target = DirectServicer {
        service_url: body.servicer_url.clone(),
        public_key: body.servicer_pub_key.clone(),
    };

    tracing::debug!(
        app_id = %app.app_id,
        chain = %execute.blockchain,
        servicer_url = %target.service_url,
        "Executing direct relay"
    );
    let response = state
        .gateway
        .execute_direct(&options, &target, &call_context(&state))
        .await?;
    Ok(Json(response.into()))
}
