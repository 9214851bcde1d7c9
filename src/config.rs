// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! typed configuration built from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DISPATCH_URL` | Base URL of the service-network dispatch node | Required |
//! | `DISPATCH_PATH` | Dispatch endpoint path | `/v1/client/dispatch` |
//! | `RELAY_PATH` | Servicer relay endpoint path | `/v1/client/relay` |
//! | `REQUEST_TIMEOUT_MS` | Per-hop HTTP timeout | `10000` |
//! | `MAX_ATTEMPTS` | Servicer attempts per relay | `3` |
//! | `SESSION_BLOCK_FREQUENCY` | Blocks per session | `4` |
//! | `BLOCK_TIME_MS` | Expected block interval | `900000` |
//! | `SESSION_TTL_MS` | Soft session expiry | block time × frequency |
//! | `SESSION_CACHE_CAPACITY` | Cached (app, chain, zone) sessions | `1024` |
//! | `CLIENT_PRIVATE_KEY_HEX` | Gateway ED25519 key (seed or keypair hex) | Generated |
//! | `SERVICER_FAILURE_THRESHOLD` | Consecutive failures before cooldown | `3` |
//! | `SERVICER_FAILURE_WINDOW_MS` | Window the failures must fall in | `60000` |
//! | `SERVICER_COOLDOWN_MS` | How long a failing servicer is skipped | `30000` |
//! | `VERIFY_SERVICER_SIGNATURE` | Require signed servicer responses | `false` |
//! | `APPLICATIONS_FILE` | JSON array of application records | Unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Base URL of the dispatch node. The dispatch path is appended to it.
pub const DISPATCH_URL_ENV: &str = "DISPATCH_URL";
pub const DISPATCH_PATH_ENV: &str = "DISPATCH_PATH";
pub const RELAY_PATH_ENV: &str = "RELAY_PATH";

/// Timeout applied to each outbound HTTP call (one dispatch or one relay).
pub const REQUEST_TIMEOUT_MS_ENV: &str = "REQUEST_TIMEOUT_MS";

/// Number of servicer attempts per relay call. Session refreshes do not
/// count against it.
pub const MAX_ATTEMPTS_ENV: &str = "MAX_ATTEMPTS";

pub const SESSION_BLOCK_FREQUENCY_ENV: &str = "SESSION_BLOCK_FREQUENCY";
pub const BLOCK_TIME_MS_ENV: &str = "BLOCK_TIME_MS";
pub const SESSION_TTL_MS_ENV: &str = "SESSION_TTL_MS";
pub const SESSION_CACHE_CAPACITY_ENV: &str = "SESSION_CACHE_CAPACITY";

/// Hex ED25519 key of the gateway client. Accepts a 32-byte seed or a
/// 64-byte seed‖public keypair, with or without `0x`.
///
/// # Security
/// Never logged. When unset a fresh key is generated per process, which
/// invalidates any AATs issued to the previous key.
pub const CLIENT_PRIVATE_KEY_HEX_ENV: &str = "CLIENT_PRIVATE_KEY_HEX";

pub const SERVICER_FAILURE_THRESHOLD_ENV: &str = "SERVICER_FAILURE_THRESHOLD";
pub const SERVICER_FAILURE_WINDOW_MS_ENV: &str = "SERVICER_FAILURE_WINDOW_MS";
pub const SERVICER_COOLDOWN_MS_ENV: &str = "SERVICER_COOLDOWN_MS";
pub const VERIFY_SERVICER_SIGNATURE_ENV: &str = "VERIFY_SERVICER_SIGNATURE";

/// Path to a JSON array of application records loaded at startup.
pub const APPLICATIONS_FILE_ENV: &str = "APPLICATIONS_FILE";

pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DISPATCH_PATH: &str = "/v1/client/dispatch";
pub const DEFAULT_RELAY_PATH: &str = "/v1/client/relay";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SESSION_BLOCK_FREQUENCY: u64 = 4;
pub const DEFAULT_BLOCK_TIME_MS: u64 = 900_000;
pub const DEFAULT_SESSION_CACHE_CAPACITY: usize = 1024;
pub const DEFAULT_SERVICER_FAILURE_THRESHOLD: u32 = 3;
pub const DEFAULT_SERVICER_FAILURE_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_SERVICER_COOLDOWN_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings of the relay pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub dispatch_url: String,
    pub dispatch_path: String,
    pub relay_path: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub session_block_frequency: u64,
    pub session_ttl: Duration,
    pub session_cache_capacity: usize,
    pub client_private_key_hex: Option<String>,
    pub servicer_failure_threshold: u32,
    pub servicer_failure_window: Duration,
    pub servicer_cooldown: Duration,
    pub verify_servicer_signature: bool,
}

impl RelayConfig {
    /// Defaults for everything except the dispatch node.
    pub fn new(dispatch_url: impl Into<String>) -> Self {
        Self {
            dispatch_url: dispatch_url.into(),
            dispatch_path: DEFAULT_DISPATCH_PATH.to_string(),
            relay_path: DEFAULT_RELAY_PATH.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            session_block_frequency: DEFAULT_SESSION_BLOCK_FREQUENCY,
            session_ttl: Duration::from_millis(
                DEFAULT_BLOCK_TIME_MS * DEFAULT_SESSION_BLOCK_FREQUENCY,
            ),
            session_cache_capacity: DEFAULT_SESSION_CACHE_CAPACITY,
            client_private_key_hex: None,
            servicer_failure_threshold: DEFAULT_SERVICER_FAILURE_THRESHOLD,
            servicer_failure_window: Duration::from_millis(DEFAULT_SERVICER_FAILURE_WINDOW_MS),
            servicer_cooldown: Duration::from_millis(DEFAULT_SERVICER_COOLDOWN_MS),
            verify_servicer_signature: false,
        }
    }
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("dispatch_url", &self.dispatch_url)
            .field("dispatch_path", &self.dispatch_path)
            .field("relay_path", &self.relay_path)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("session_block_frequency", &self.session_block_frequency)
            .field("session_ttl", &self.session_ttl)
            .field("session_cache_capacity", &self.session_cache_capacity)
            .field(
                "client_private_key_hex",
                &self.client_private_key_hex.as_ref().map(|_| "<redacted>"),
            )
            .field("verify_servicer_signature", &self.verify_servicer_signature)
            .finish_non_exhaustive()
    }
}

/// Full server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub relay: RelayConfig,
    pub applications_file: Option<String>,
    pub log_format: LogFormat,
}

impl GatewayConfig {
    pub fn new(dispatch_url: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            relay: RelayConfig::new(dispatch_url),
            applications_file: None,
            log_format: LogFormat::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let dispatch_url = vars
            .optional(DISPATCH_URL_ENV)
            .ok_or(ConfigError::Missing(DISPATCH_URL_ENV))?;
        url::Url::parse(&dispatch_url).map_err(|e| ConfigError::Invalid {
            name: DISPATCH_URL_ENV,
            reason: e.to_string(),
        })?;

        let block_time_ms = vars.parsed(BLOCK_TIME_MS_ENV, DEFAULT_BLOCK_TIME_MS)?;
        let session_block_frequency =
            vars.parsed(SESSION_BLOCK_FREQUENCY_ENV, DEFAULT_SESSION_BLOCK_FREQUENCY)?;
        if session_block_frequency == 0 {
            return Err(ConfigError::Invalid {
                name: SESSION_BLOCK_FREQUENCY_ENV,
                reason: "must be at least 1".to_string(),
            });
        }
        let session_ttl_ms = vars.parsed(
            SESSION_TTL_MS_ENV,
            block_time_ms.saturating_mul(session_block_frequency),
        )?;

        let max_attempts = vars.parsed(MAX_ATTEMPTS_ENV, DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: MAX_ATTEMPTS_ENV,
                reason: "must be at least 1".to_string(),
            });
        }

        let relay = RelayConfig {
            dispatch_url,
            dispatch_path: vars.or_default(DISPATCH_PATH_ENV, DEFAULT_DISPATCH_PATH),
            relay_path: vars.or_default(RELAY_PATH_ENV, DEFAULT_RELAY_PATH),
            request_timeout: Duration::from_millis(
                vars.parsed(REQUEST_TIMEOUT_MS_ENV, DEFAULT_REQUEST_TIMEOUT_MS)?,
            ),
            max_attempts,
            session_block_frequency,
            session_ttl: Duration::from_millis(session_ttl_ms),
            session_cache_capacity: vars
                .parsed(SESSION_CACHE_CAPACITY_ENV, DEFAULT_SESSION_CACHE_CAPACITY)?,
            client_private_key_hex: vars.optional(CLIENT_PRIVATE_KEY_HEX_ENV),
            servicer_failure_threshold: vars
                .parsed(SERVICER_FAILURE_THRESHOLD_ENV, DEFAULT_SERVICER_FAILURE_THRESHOLD)?,
            servicer_failure_window: Duration::from_millis(
                vars.parsed(SERVICER_FAILURE_WINDOW_MS_ENV, DEFAULT_SERVICER_FAILURE_WINDOW_MS)?,
            ),
            servicer_cooldown: Duration::from_millis(
                vars.parsed(SERVICER_COOLDOWN_MS_ENV, DEFAULT_SERVICER_COOLDOWN_MS)?,
            ),
            verify_servicer_signature: vars.flag(VERIFY_SERVICER_SIGNATURE_ENV)?,
        };

        let log_format = match vars.optional(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    reason: format!("expected json or pretty, got {other}"),
                })
            }
        };

        Ok(Self {
            host: vars.or_default(HOST_ENV, DEFAULT_HOST),
            port: vars.parsed(PORT_ENV, DEFAULT_PORT)?,
            relay,
            applications_file: vars.optional(APPLICATIONS_FILE_ENV),
            log_format,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, ConfigError> {
        match self.optional(name).map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("false") | Some("0") | Some("no") => Ok(false),
            Some("true") | Some("1") | Some("yes") => Ok(true),
            Some(other) => Err(ConfigError::Invalid {
                name,
                reason: format!("expected a boolean, got {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[(DISPATCH_URL_ENV, "http://dispatch:8081")]).unwrap();
        assert_eq!(config, GatewayConfig::new("http://dispatch:8081"));
        assert_eq!(config.relay.request_timeout, Duration::from_secs(10));
        assert_eq!(config.relay.max_attempts, 3);
        assert_eq!(config.relay.session_ttl, Duration::from_secs(3600));
        assert!(config.relay.client_private_key_hex.is_none());
    }

    #[test]
    fn dispatch_url_is_required() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing(DISPATCH_URL_ENV));
        assert!(matches!(
            load(&[(DISPATCH_URL_ENV, "not a url")]).unwrap_err(),
            ConfigError::Invalid { name: DISPATCH_URL_ENV, .. }
        ));
    }

    #[test]
    fn session_ttl_follows_block_time() {
        let config = load(&[
            (DISPATCH_URL_ENV, "http://dispatch"),
            (BLOCK_TIME_MS_ENV, "1000"),
            (SESSION_BLOCK_FREQUENCY_ENV, "2"),
        ])
        .unwrap();
        assert_eq!(config.relay.session_ttl, Duration::from_secs(2));

        let config = load(&[
            (DISPATCH_URL_ENV, "http://dispatch"),
            (SESSION_TTL_MS_ENV, "500"),
        ])
        .unwrap();
        assert_eq!(config.relay.session_ttl, Duration::from_millis(500));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = load(&[(DISPATCH_URL_ENV, "http://dispatch"), (MAX_ATTEMPTS_ENV, "lots")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: MAX_ATTEMPTS_ENV, .. }));

        let err = load(&[(DISPATCH_URL_ENV, "http://dispatch"), (MAX_ATTEMPTS_ENV, "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: MAX_ATTEMPTS_ENV, .. }));
    }

    #[test]
    fn flags_and_log_format() {
        let config = load(&[
            (DISPATCH_URL_ENV, "http://dispatch"),
            (VERIFY_SERVICER_SIGNATURE_ENV, "TRUE"),
            (LOG_FORMAT_ENV, "json"),
            (CLIENT_PRIVATE_KEY_HEX_ENV, "  abcd  "),
        ])
        .unwrap();
        assert!(config.relay.verify_servicer_signature);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.relay.client_private_key_hex.as_deref(), Some("abcd"));

        assert!(load(&[(DISPATCH_URL_ENV, "http://dispatch"), (LOG_FORMAT_ENV, "xml")]).is_err());
    }

    #[test]
    fn debug_redacts_private_key() {
        let mut config = RelayConfig::new("http://dispatch");
        config.client_private_key_hex = Some("deadbeef".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("<redacted>"));
    }
}
