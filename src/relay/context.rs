// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-call cancellation and deadlines.
//!
//! Every blocking step of a relay (dispatch, servicer call) runs through
//! [`CallContext::run`]. Cancelling the token or passing the deadline drops
//! the in-flight future, which aborts the underlying HTTP request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::RelayError;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context driven by an existing token, e.g. a server shutdown token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Attach a deadline `timeout` from now, keeping any earlier deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attach an absolute deadline, keeping any earlier deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Run `fut` unless the caller cancels or the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, RelayError> {
        if self.token.is_cancelled() {
            return Err(RelayError::Cancelled {
                deadline_exceeded: false,
            });
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(RelayError::Cancelled { deadline_exceeded: false }),
            _ = deadline => Err(RelayError::Cancelled { deadline_exceeded: true }),
            output = fut => Ok(output),
        }
    }
}
