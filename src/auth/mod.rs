// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Applications authenticate every relay call with two headers:
//!
//! - `X-App-ID`: the application id assigned at registration
//! - `X-API-Key`: the application's API key
//!
//! The key is hashed with SHA-256 and compared against the stored hash; the
//! plaintext key is never kept. Chain permissions and the body `pub_key`
//! are checked by the handlers once the application is known.

pub mod error;
pub mod extractor;

pub use error::AuthError;
pub use extractor::{AppAuth, API_KEY_HEADER, APP_ID_HEADER};
