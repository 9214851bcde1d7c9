// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, process::exit, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use viper_relay_gateway::{
    api::router,
    config::GatewayConfig,
    relay::{Gateway, ReqwestPost},
    state::AppState,
    store::InMemoryApplicationStore,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() {
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            exit(1);
        }
    };

    init_tracing(config.log_format);
    info!(relay = ?config.relay, "Configuration loaded");

    let http = match ReqwestPost::new() {
        Ok(http) => Arc::new(http),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            exit(1);
        }
    };
    let gateway = match Gateway::new(config.relay.clone(), http) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            error!(error = %e, "Failed to initialise relay gateway");
            exit(1);
        }
    };
    info!(
        client_address = %gateway.client_address(),
        client_public_key = %gateway.client_public_key(),
        "Relay client key loaded"
    );

    let applications = match config.applications_file.as_deref() {
        Some(path) => match InMemoryApplicationStore::load_from_file(path) {
            Ok(store) => store,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to load applications");
                exit(1);
            }
        },
        None => {
            warn!("APPLICATIONS_FILE not set; no application can relay until one is registered");
            InMemoryApplicationStore::new()
        }
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(gateway, Arc::new(applications)).with_shutdown(shutdown.clone());
    let app = router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(host = %config.host, port = config.port, error = %e, "Invalid bind address");
            exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind");
            exit(2);
        }
    };

    info!(%addr, "Viper relay gateway listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        error!(error = %e, "Server failed");
        exit(2);
    }

    info!("Relay gateway shut down");
}

/// Resolve on SIGINT or SIGTERM, cancelling in-flight relays first.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
