// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay orchestration.
//!
//! [`Gateway`] owns every piece of shared relay state: the client key, the
//! session cache with its single-flight dispatch, servicer health, the AAT
//! cache and the believed network height. Handlers share one instance
//! behind an `Arc`; tests build isolated instances over a stub transport.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;

use super::aat;
use super::context::CallContext;
use super::dispatcher::{DispatchRequest, Dispatcher};
use super::envelope::{EntropySource, EnvelopeBuilder, OsEntropy};
use super::error::RelayError;
use super::http::{endpoint, HttpPost};
use super::selector::{Selection, ServicerHealth};
use super::session_cache::SessionCache;
use super::signer::{address_from_public_key, parse_public_key, Signer};
use super::single_flight::SingleFlight;
use super::transport::Transport;
use super::types::{
    Aat, RelayMeta, RelayPayload, RelayResponse, Servicer, Session, SessionHeader, SessionKey,
};
use crate::config::RelayConfig;

/// Silent redispatches allowed per call before `SessionExpired` surfaces.
pub const MAX_SESSION_REFRESHES: u32 = 2;

const AAT_CACHE_CAPACITY: usize = 256;

/// Pause before the n-th dispatch retry is `n` times this.
pub const DISPATCH_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// The (application, chain, zone) a session is requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub app_public_key: String,
    pub chain: String,
    pub geo_zone: String,
    pub num_servicers: u32,
}

impl SessionRequest {
    fn validate(&self) -> Result<(), RelayError> {
        parse_public_key(&self.app_public_key).map_err(|e| {
            RelayError::BadRequest(format!("invalid application public key: {e}"))
        })?;
        if self.chain.trim().is_empty() {
            return Err(RelayError::BadRequest("blockchain is required".to_string()));
        }
        if self.geo_zone.trim().is_empty() {
            return Err(RelayError::BadRequest("geo_zone is required".to_string()));
        }
        if self.num_servicers == 0 {
            return Err(RelayError::BadRequest(
                "num_servicers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn cache_key(&self) -> SessionKey {
        SessionKey::new(&self.app_public_key, &self.chain, &self.geo_zone)
    }
}

/// How the application authorises the gateway for a relay.
#[derive(Debug, Clone)]
pub enum AppAuthorization {
    /// Token issued by the tenant; validated before use.
    Token(Aat),
    /// Application key held by the gateway; tokens are built and cached.
    Signer(Arc<Signer>),
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub session: SessionRequest,
    pub payload: RelayPayload,
    pub authorization: AppAuthorization,
}

/// Servicer named by the caller for a direct relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectServicer {
    pub service_url: String,
    pub public_key: String,
}

pub struct Gateway {
    config: RelayConfig,
    signer: Arc<Signer>,
    dispatcher: Dispatcher,
    transport: Transport,
    sessions: SessionCache,
    dispatches: SingleFlight<SessionKey, Result<Arc<Session>, RelayError>>,
    health: ServicerHealth,
    aats: Mutex<LruCache<String, Aat>>,
    height: AtomicU64,
    entropy: Arc<dyn EntropySource>,
}

impl Gateway {
    /// Build a gateway over `http`.
    ///
    /// Fails with `BadKey` when the configured client key is malformed; no
    /// request is issued before the key has been accepted.
    pub fn new(config: RelayConfig, http: Arc<dyn HttpPost>) -> Result<Self, RelayError> {
        Self::with_entropy(config, http, Arc::new(OsEntropy))
    }

    pub fn with_entropy(
        config: RelayConfig,
        http: Arc<dyn HttpPost>,
        entropy: Arc<dyn EntropySource>,
    ) -> Result<Self, RelayError> {
        let signer = match config.client_private_key_hex.as_deref() {
            Some(hex) => Signer::from_private_key_hex(hex)?,
            None => {
                tracing::warn!("No client key configured, generating an ephemeral one");
                Signer::new()
            }
        };

        let dispatcher = Dispatcher::new(
            http.clone(),
            &config.dispatch_url,
            &config.dispatch_path,
            config.request_timeout,
        )?;
        let transport = Transport::new(
            http,
            config.relay_path.clone(),
            config.request_timeout,
            config.verify_servicer_signature,
        );
        let sessions = SessionCache::new(
            config.session_cache_capacity,
            config.session_ttl,
            config.session_block_frequency,
        );
        let health = ServicerHealth::new(
            config.servicer_failure_threshold,
            config.servicer_failure_window,
            config.servicer_cooldown,
        );
        let aats = Mutex::new(LruCache::new(
            NonZeroUsize::new(AAT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        ));

        tracing::info!(
            client_address = %signer.address_hex(),
            dispatch_url = %dispatcher.url(),
            max_attempts = config.max_attempts,
            "Relay gateway initialised"
        );

        Ok(Self {
            config,
            signer: Arc::new(signer),
            dispatcher,
            transport,
            sessions,
            dispatches: SingleFlight::new(),
            health,
            aats,
            height: AtomicU64::new(0),
            entropy,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn client_public_key(&self) -> &str {
        self.signer.public_key_hex()
    }

    pub fn client_address(&self) -> &str {
        self.signer.address_hex()
    }

    /// Highest block height reported by any dispatch so far.
    pub fn believed_height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    pub fn cached_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Session for `request`, from the cache or a fresh dispatch.
    pub async fn dispatch(
        &self,
        request: &SessionRequest,
        ctx: &CallContext,
    ) -> Result<Arc<Session>, RelayError> {
        request.validate()?;
        self.session(request, ctx).await
    }

    /// Relay `options.payload` through a servicer of the application's
    /// session, failing over to other servicers on transport errors.
    pub async fn execute_relay(
        &self,
        options: &RelayOptions,
        ctx: &CallContext,
    ) -> Result<RelayResponse, RelayError> {
        options.session.validate()?;
        let aat = self.resolve_aat(&options.session.app_public_key, &options.authorization)?;
        let key = options.session.cache_key();

        let mut session = self.session(&options.session, ctx).await?;
        let mut selection = Selection::new(session.clone(), self.entropy.next_entropy());
        let mut attempts = 0u32;
        let mut refreshes = 0u32;
        let mut last_cause = None;

        while attempts < self.config.max_attempts {
            let Some(servicer) = selection.next(&self.health) else {
                break;
            };
            let entropy = self.entropy.next_entropy();
            let meta = RelayMeta {
                block_height: self.believed_height().max(session.header.session_height),
            };
            let request = EnvelopeBuilder::new(&self.signer).build(
                &session,
                &servicer,
                &options.payload,
                &aat,
                meta,
                entropy,
            )?;

            attempts += 1;
            tracing::debug!(
                chain = %key.chain,
                geo_zone = %key.geo_zone,
                servicer = %servicer.address,
                attempt = attempts,
                "Sending relay"
            );

            match ctx.run(self.transport.send(&servicer, &request)).await? {
                Ok(response) => {
                    self.health.record_success(&servicer.address);
                    return Ok(response);
                }
                Err(RelayError::SessionExpired { code, message })
                    if refreshes < MAX_SESSION_REFRESHES =>
                {
                    // Refreshing the session does not use up a servicer attempt.
                    attempts -= 1;
                    refreshes += 1;
                    tracing::info!(
                        chain = %key.chain,
                        geo_zone = %key.geo_zone,
                        servicer = %servicer.address,
                        code,
                        message = %message,
                        "Session expired, redispatching"
                    );
                    self.sessions.invalidate_if_current(&key, &session);
                    session = self.session(&options.session, ctx).await?;
                    selection = Selection::new(session.clone(), entropy);
                }
                Err(err @ RelayError::ServicerUnavailable(_)) => {
                    self.health.record_failure(&servicer.address);
                    tracing::warn!(
                        chain = %key.chain,
                        servicer = %servicer.address,
                        attempt = attempts,
                        error = %err,
                        "Relay attempt failed, failing over"
                    );
                    last_cause = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last_cause = last_cause.unwrap_or_else(|| RelayError::NoServicers {
            chain: key.chain.clone(),
            geo_zone: key.geo_zone.clone(),
        });
        tracing::warn!(
            chain = %key.chain,
            geo_zone = %key.geo_zone,
            attempts,
            error = %last_cause,
            "Relay failed"
        );
        Err(RelayError::RelayFailed {
            attempts,
            last_cause: Box::new(last_cause),
        })
    }

    /// Relay straight to `target` without dispatching.
    ///
    /// The proof references the cached session height for the application
    /// when one is cached, otherwise the believed network height. One
    /// attempt is made.
    pub async fn execute_direct(
        &self,
        options: &RelayOptions,
        target: &DirectServicer,
        ctx: &CallContext,
    ) -> Result<RelayResponse, RelayError> {
        options.session.validate()?;
        let servicer_key = parse_public_key(&target.public_key)
            .map_err(|e| RelayError::BadRequest(format!("invalid servicer public key: {e}")))?;
        endpoint(&target.service_url, "")
            .map_err(|e| RelayError::BadRequest(format!("invalid servicer URL: {e}")))?;
        let aat = self.resolve_aat(&options.session.app_public_key, &options.authorization)?;

        let servicer = Servicer {
            address: address_from_public_key(servicer_key.as_bytes()),
            public_key: hex::encode(servicer_key.as_bytes()),
            service_url: target.service_url.clone(),
        };
        let cached = self.sessions.peek(&options.session.cache_key());
        let session = Session {
            header: SessionHeader {
                app_public_key: options.session.app_public_key.to_lowercase(),
                chain: options.session.chain.clone(),
                geo_zone: options.session.geo_zone.clone(),
                session_height: cached
                    .as_ref()
                    .map(|s| s.header.session_height)
                    .unwrap_or_else(|| self.believed_height()),
                num_servicers: options.session.num_servicers,
            },
            key: cached.map(|s| s.key.clone()).unwrap_or_default(),
            servicers: vec![servicer.clone()],
        };
        let meta = RelayMeta {
            block_height: self.believed_height().max(session.header.session_height),
        };
        let request = EnvelopeBuilder::new(&self.signer).build(
            &session,
            &servicer,
            &options.payload,
            &aat,
            meta,
            self.entropy.next_entropy(),
        )?;

        tracing::debug!(
            chain = %session.header.chain,
            servicer = %servicer.address,
            "Sending direct relay"
        );
        let result = ctx.run(self.transport.send(&servicer, &request)).await?;
        match &result {
            Ok(_) => self.health.record_success(&servicer.address),
            Err(RelayError::ServicerUnavailable(_)) => {
                self.health.record_failure(&servicer.address)
            }
            Err(_) => {}
        }
        result
    }

    async fn session(
        &self,
        request: &SessionRequest,
        ctx: &CallContext,
    ) -> Result<Arc<Session>, RelayError> {
        let key = request.cache_key();
        if let Some(session) = self.sessions.get(&key, self.believed_height()) {
            tracing::debug!(session = %key, "Session cache hit");
            return Ok(session);
        }
        tracing::debug!(session = %key, "Session cache miss");

        ctx.run(
            self.dispatches
                .run(&key, || self.dispatch_and_install(&key, request)),
        )
        .await?
    }

    /// Leader side of the single-flight dispatch. The session is installed
    /// before followers are released, so they never dispatch again.
    async fn dispatch_and_install(
        &self,
        key: &SessionKey,
        request: &SessionRequest,
    ) -> Result<Arc<Session>, RelayError> {
        if let Some(session) = self.sessions.get(key, self.believed_height()) {
            return Ok(session);
        }

        let dispatch = DispatchRequest {
            app_public_key: &key.app_public_key,
            chain: &key.chain,
            geo_zone: &key.geo_zone,
            num_servicers: request.num_servicers,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            tracing::debug!(session = %key, attempt, "Dispatching session");
            match self.dispatcher.dispatch(&dispatch).await {
                Ok(dispatched) => {
                    self.height
                        .fetch_max(dispatched.block_height, Ordering::Relaxed);
                    let session = self.sessions.insert(dispatched.session);
                    tracing::info!(
                        session = %key,
                        session_height = session.header.session_height,
                        block_height = dispatched.block_height,
                        servicers = session.servicers.len(),
                        "Session installed"
                    );
                    return Ok(session);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::warn!(
                        session = %key,
                        attempt,
                        error = %err,
                        "Dispatch failed, retrying"
                    );
                    tokio::time::sleep(DISPATCH_RETRY_BACKOFF * attempt).await;
                }
                Err(err) => {
                    tracing::warn!(session = %key, attempt, error = %err, "Dispatch failed");
                    return Err(err);
                }
            }
        }
    }

    fn resolve_aat(
        &self,
        app_public_key: &str,
        authorization: &AppAuthorization,
    ) -> Result<Aat, RelayError> {
        match authorization {
            AppAuthorization::Token(token) => {
                aat::validate(token, app_public_key, self.signer.public_key_hex())?;
                Ok(token.clone())
            }
            AppAuthorization::Signer(app) => {
                if !app.public_key_hex().eq_ignore_ascii_case(app_public_key) {
                    return Err(RelayError::BadRequest(
                        "application key does not match pub_key".to_string(),
                    ));
                }
                let cache_key = app.public_key_hex().to_string();
                let mut aats = self.aats.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(cached) = aats.get(&cache_key) {
                    return Ok(cached.clone());
                }
                let token = aat::build(app, self.signer.public_key_hex())?;
                aats.put(cache_key, token.clone());
                Ok(token)
            }
        }
    }
}
