// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Servicer selection and per-servicer health.
//!
//! A [`Selection`] walks the session's sorted servicer list round-robin,
//! starting at an index derived from the call's entropy, and never hands out
//! the same servicer twice within one call. [`ServicerHealth`] tracks
//! consecutive failures per servicer; a servicer that fails `threshold`
//! times within `window` is skipped until `cooldown` has passed.
//!
//! Only servicers in a failure streak or cooldown are tracked, in a bounded
//! LRU; a success forgets the servicer.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::types::{Servicer, Session};

/// Servicers tracked at once; the least recently failing are forgotten first.
pub const DEFAULT_TRACKED_SERVICERS: usize = 1024;

#[derive(Debug, Default)]
struct HealthEntry {
    consecutive_failures: AtomicU32,
    /// Milliseconds since `ServicerHealth::epoch` when the streak began.
    streak_started_ms: AtomicU64,
    /// Milliseconds since `ServicerHealth::epoch` until which to skip.
    cooling_until_ms: AtomicU64,
}

pub struct ServicerHealth {
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    epoch: Instant,
    entries: Mutex<LruCache<String, Arc<HealthEntry>>>,
}

impl ServicerHealth {
    pub fn new(threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self::with_capacity(threshold, window, cooldown, DEFAULT_TRACKED_SERVICERS)
    }

    pub fn with_capacity(
        threshold: u32,
        window: Duration,
        cooldown: Duration,
        capacity: usize,
    ) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            cooldown,
            epoch: Instant::now(),
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    pub fn record_failure(&self, address: &str) {
        let entry = self.entry(address);
        let now = self.now_ms();

        let started = entry.streak_started_ms.load(Ordering::Relaxed);
        let current = entry.consecutive_failures.load(Ordering::Relaxed);
        if current == 0 || now.saturating_sub(started) > self.window.as_millis() as u64 {
            entry.streak_started_ms.store(now, Ordering::Relaxed);
            entry.consecutive_failures.store(0, Ordering::Relaxed);
        }

        let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.threshold {
            entry
                .cooling_until_ms
                .store(now + self.cooldown.as_millis() as u64, Ordering::Relaxed);
            entry.consecutive_failures.store(0, Ordering::Relaxed);
            tracing::warn!(
                servicer = %address,
                failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Servicer entering cooldown"
            );
        }
    }

    pub fn record_success(&self, address: &str) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(address);
        let was_cooling = removed
            .is_some_and(|entry| entry.cooling_until_ms.load(Ordering::Relaxed) > self.now_ms());
        if was_cooling {
            tracing::info!(servicer = %address, "Servicer recovered");
        }
    }

    pub fn is_cooling(&self, address: &str) -> bool {
        self.existing(address)
            .is_some_and(|entry| entry.cooling_until_ms.load(Ordering::Relaxed) > self.now_ms())
    }

    pub fn consecutive_failures(&self, address: &str) -> u32 {
        self.existing(address)
            .map(|entry| entry.consecutive_failures.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Number of servicers currently tracked.
    pub fn tracked(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn entry(&self, address: &str) -> Arc<HealthEntry> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(address) {
            return entry.clone();
        }
        let entry = Arc::new(HealthEntry::default());
        entries.put(address.to_string(), entry.clone());
        entry
    }

    fn existing(&self, address: &str) -> Option<Arc<HealthEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.peek(address).cloned()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/// Servicer cursor for a single relay call.
pub struct Selection {
    session: Arc<Session>,
    start: usize,
    tried: Vec<bool>,
}

impl Selection {
    pub fn new(session: Arc<Session>, entropy: u64) -> Self {
        let len = session.servicers.len();
        let start = if len == 0 {
            0
        } else {
            (entropy % len as u64) as usize
        };
        Self {
            session,
            start,
            tried: vec![false; len],
        }
    }

    /// Next untried servicer that is not cooling down. `None` once every
    /// servicer has been tried or the rest are all cooling down.
    pub fn next(&mut self, health: &ServicerHealth) -> Option<Servicer> {
        let len = self.tried.len();
        let pick = (0..len)
            .map(|i| (self.start + i) % len)
            .find(|&i| !self.tried[i] && !health.is_cooling(&self.session.servicers[i].address))?;

        self.tried[pick] = true;
        Some(self.session.servicers[pick].clone())
    }
}
