// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application Authentication Token issuance and validation.
//!
//! Two modes are supported:
//!
//! 1. The gateway holds the application key and builds the token itself
//!    ([`build`]).
//! 2. The tenant hands over a pre-built token, which the gateway checks
//!    against the application key before using it ([`validate`]).

use super::codec::canonical_hash;
use super::error::RelayError;
use super::signer::{parse_public_key, verify_signature, Signer};
use super::types::{Aat, AAT_VERSION};

/// Build and sign an AAT binding `app_signer` to `client_public_key`.
pub fn build(app_signer: &Signer, client_public_key: &str) -> Result<Aat, RelayError> {
    parse_public_key(client_public_key)?;

    let mut aat = Aat {
        version: AAT_VERSION.to_string(),
        app_pub_key: app_signer.public_key_hex().to_string(),
        client_pub_key: client_public_key.to_lowercase(),
        signature: String::new(),
    };
    let hash = canonical_hash(&aat)?;
    aat.signature = app_signer.sign_hex(&hash);
    Ok(aat)
}

/// Check that `aat` is a well-formed token for `app_public_key` issued to
/// `client_public_key`, and that its signature verifies.
pub fn validate(
    aat: &Aat,
    app_public_key: &str,
    client_public_key: &str,
) -> Result<(), RelayError> {
    if aat.version != AAT_VERSION {
        return Err(RelayError::BadRequest(format!(
            "unsupported AAT version {:?}, expected {AAT_VERSION}",
            aat.version
        )));
    }
    if !aat.app_pub_key.eq_ignore_ascii_case(app_public_key) {
        return Err(RelayError::BadRequest(
            "AAT was issued for a different application".to_string(),
        ));
    }
    if !aat.client_pub_key.eq_ignore_ascii_case(client_public_key) {
        return Err(RelayError::BadRequest(
            "AAT was not issued to this gateway".to_string(),
        ));
    }

    let hash = canonical_hash(&aat.unsigned())?;
    match verify_signature(&aat.app_pub_key, &hash, &aat.signature) {
        Ok(true) => Ok(()),
        Ok(false) => Err(RelayError::Unauthorized(
            "AAT signature does not verify".to_string(),
        )),
        Err(RelayError::BadKey(msg)) => {
            Err(RelayError::BadRequest(format!("malformed AAT: {msg}")))
        }
        Err(other) => Err(other),
    }
}
