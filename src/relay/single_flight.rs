// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collapse concurrent calls for the same key into one execution.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it is in flight subscribe to the leader's result. If the
//! leader is dropped before finishing (its caller was cancelled), waiters
//! race to become the next leader.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, watch::Sender<Option<T>>>>,
}

enum Role<T> {
    Leader,
    Follower(watch::Receiver<Option<T>>),
}

impl<K, T> SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Run `work` for `key`, or wait for the run already in flight.
    pub async fn run<F, Fut>(&self, key: &K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            match self.join(key) {
                Role::Leader => {
                    let guard = LeaderGuard {
                        flight: self,
                        key: Some(key.clone()),
                    };
                    let value = work().await;
                    guard.complete(value.clone());
                    return value;
                }
                Role::Follower(mut rx) => {
                    tracing::debug!("Joining in-flight call");
                    let outcome = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
                    if let Ok(Some(value)) = outcome {
                        return value;
                    }
                    // Leader was dropped without a result; contend again.
                }
            }
        }
    }

    fn join(&self, key: &K) -> Role<T> {
        let mut calls = self.lock();
        match calls.get(key) {
            Some(tx) => Role::Follower(tx.subscribe()),
            None => {
                let (tx, _rx) = watch::channel(None);
                calls.insert(key.clone(), tx);
                Role::Leader
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, watch::Sender<Option<T>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the leader's entry on drop so a cancelled leader never strands
/// its followers.
struct LeaderGuard<'a, K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    flight: &'a SingleFlight<K, T>,
    key: Option<K>,
}

impl<K, T> LeaderGuard<'_, K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn complete(mut self, value: T) {
        if let Some(key) = self.key.take() {
            let tx = self.flight.lock().remove(&key);
            if let Some(tx) = tx {
                tx.send_replace(Some(value));
            }
        }
    }
}

impl<K, T> Drop for LeaderGuard<'_, K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.flight.lock().remove(&key);
        }
    }
}
