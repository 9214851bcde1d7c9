// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::relay::Gateway;
use crate::store::ApplicationStore;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub applications: Arc<dyn ApplicationStore>,
    /// Cancelled on server shutdown; every relay runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, applications: Arc<dyn ApplicationStore>) -> Self {
        Self {
            gateway,
            applications,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }
}
