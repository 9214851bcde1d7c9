// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated applications.
//!
//! ```rust,ignore
//! async fn my_handler(AppAuth(app): AppAuth) -> impl IntoResponse {
//!     // app is Arc<Application>
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use super::AuthError;
use crate::state::AppState;
use crate::store::Application;

pub const APP_ID_HEADER: &str = "x-app-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Application authenticated by `X-App-ID` and `X-API-Key`.
pub struct AppAuth(pub Arc<Application>);

impl FromRequestParts<AppState> for AppAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_id = header(&parts.headers, APP_ID_HEADER, AuthError::MissingAppId)?;
        let api_key = header(&parts.headers, API_KEY_HEADER, AuthError::MissingApiKey)?;

        let application = state
            .applications
            .find(app_id)
            .filter(|app| app.api_key_matches(api_key))
            .ok_or_else(|| {
                tracing::warn!(app_id = %app_id, "Rejected application credentials");
                AuthError::InvalidCredentials
            })?;

        Ok(AppAuth(application))
    }
}

fn header<'a>(
    headers: &'a HeaderMap,
    name: &str,
    missing: AuthError,
) -> Result<&'a str, AuthError> {
    let value = headers
        .get(name)
        .ok_or(missing)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader)?
        .trim();
    if value.is_empty() {
        return Err(AuthError::InvalidHeader);
    }
    Ok(value)
}
