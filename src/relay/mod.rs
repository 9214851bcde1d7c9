// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Pipeline
//!
//! Signs and forwards JSON-RPC calls to Viper Network servicers.
//!
//! ## Flow
//!
//! ```text
//! Gateway::execute_relay
//!   -> SessionCache / SingleFlight -> Dispatcher     (session for app, chain, zone)
//!   -> aat::build | aat::validate                    (application authorisation)
//!   -> Selection                                     (servicer, with failover)
//!   -> EnvelopeBuilder (Signer + codec)              (signed relay proof)
//!   -> Transport                                     (POST to the servicer)
//! ```
//!
//! Outbound HTTP goes through the [`http::HttpPost`] trait so the whole
//! pipeline can run against an in-memory stub.

pub mod aat;
pub mod codec;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod http;
pub mod selector;
pub mod session_cache;
pub mod signer;
pub mod single_flight;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use context::CallContext;
pub use error::RelayError;
pub use gateway::{AppAuthorization, DirectServicer, Gateway, RelayOptions, SessionRequest};
pub use http::{HttpPost, ReqwestPost};
pub use signer::Signer;
pub use types::{Aat, RelayPayload, RelayResponse, Session};
