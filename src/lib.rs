// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Viper Relay Gateway
//!
//! Accepts JSON-RPC calls from registered applications and forwards each
//! one to a Viper Network servicer with a relay proof signed by the
//! gateway's client key.
//!
//! ## Modules
//!
//! - `relay` - Session dispatch, AATs, relay envelopes and servicer failover
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Application authentication (app id + API key)
//! - `store` - Registered applications
//! - `cli` - `viper-relay` command line wrapper

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;
pub mod state;
pub mod store;
pub mod telemetry;
