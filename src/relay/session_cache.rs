// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LRU cache of dispatched sessions.
//!
//! Keyed by (application key, chain, zone). An entry is dropped once its
//! soft TTL elapses or once the believed network height has moved past the
//! session window. Lookups take the read lock only.

use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::types::{Session, SessionKey};

struct CacheEntry {
    session: Arc<Session>,
    inserted_at: Instant,
}

pub struct SessionCache {
    cache: RwLock<LruCache<SessionKey, CacheEntry>>,
    ttl: Duration,
    session_block_frequency: u64,
}

impl SessionCache {
    /// - `capacity`: max number of (app, chain, zone) entries.
    /// - `ttl`: soft expiry for each entry.
    /// - `session_block_frequency`: blocks per session window.
    pub fn new(capacity: usize, ttl: Duration, session_block_frequency: u64) -> Self {
        Self {
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
            session_block_frequency,
        }
    }

    /// Fresh session for `key` at the believed `height`, if cached.
    pub fn get(&self, key: &SessionKey, height: u64) -> Option<Arc<Session>> {
        let stale = {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            let entry = cache.peek(key)?;
            if self.is_fresh(entry, height) {
                return Some(entry.session.clone());
            }
            entry.session.clone()
        };

        self.invalidate_if_current(key, &stale);
        None
    }

    /// Cached session for `key` regardless of freshness.
    pub fn peek(&self, key: &SessionKey) -> Option<Arc<Session>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.peek(key).map(|entry| entry.session.clone())
    }

    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.put(
            session.cache_key(),
            CacheEntry {
                session: session.clone(),
                inserted_at: Instant::now(),
            },
        );
        session
    }

    /// Drop the entry for `key` only if it still holds `session`, so a newer
    /// session installed by another task survives.
    pub fn invalidate_if_current(&self, key: &SessionKey, session: &Arc<Session>) -> bool {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let current = cache
            .peek(key)
            .is_some_and(|entry| Arc::ptr_eq(&entry.session, session));
        if current {
            cache.pop(key);
        }
        current
    }

    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, entry: &CacheEntry, height: u64) -> bool {
        if entry.inserted_at.elapsed() >= self.ttl {
            return false;
        }
        let window_end = entry
            .session
            .header
            .session_height
            .saturating_add(self.session_block_frequency);
        height < window_end
    }
}
