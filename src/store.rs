// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory correlation store for pending host registrations.
//!
//! Maps a correlation token to its [`CorrelationRecord`] for a fixed TTL.
//! The broker and the out-of-band completer only meet here, so every
//! operation is atomic per token and callers never see the lock.
//!
//! ## Expiry
//!
//! - Lazy: an expired entry reads as absent and is dropped on access
//! - Sweep: [`CorrelationStore::sweep_expired`] is driven by the
//!   [`ExpiryReaper`](crate::reaper::ExpiryReaper)
//!
//! Entries are never promoted in the LRU, so its order is creation order.
//! With one TTL for the whole store, expired entries always sit at the
//! cold end and a sweep stops at the first live one.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use thiserror::Error;
use tokio::sync::Notify;

use crate::models::CorrelationRecord;

/// Default lifetime of a pending registration (5 minutes).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

/// Default cap on concurrently pending registrations.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("correlation token already in use")]
    AlreadyExists,
    #[error("correlation record not found")]
    NotFound,
    #[error("correlation record already completed")]
    AlreadyCompleted,
    #[error("credential must not be empty")]
    EmptyCredential,
    #[error("pending registration limit reached ({0})")]
    CapacityExceeded(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

struct Entry {
    record: CorrelationRecord,
    deadline: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Process-wide, TTL-bound token → record map.
pub struct CorrelationStore {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
    capacity: usize,
    changed: Notify,
}

impl CorrelationStore {
    /// Create a store whose entries live for `ttl`, holding at most `capacity`.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            capacity: capacity.get(),
            changed: Notify::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a new record under its own token and start its TTL.
    ///
    /// Returns the record with `expires_at` stamped. A token that is
    /// still present (even if expired but not yet reaped) is never reused.
    pub fn create(&self, mut record: CorrelationRecord) -> StoreResult<CorrelationRecord> {
        let now = Instant::now();
        let mut entries = self.lock();

        if entries.contains(record.token.as_str()) {
            return Err(StoreError::AlreadyExists);
        }
        if entries.len() >= self.capacity {
            purge_expired(&mut entries, now);
            if entries.len() >= self.capacity {
                return Err(StoreError::CapacityExceeded(self.capacity));
            }
        }

        record.expires_at = deadline_timestamp(record.created_at, self.ttl);
        entries.put(
            record.token.as_str().to_string(),
            Entry {
                record: record.clone(),
                deadline: now + self.ttl,
            },
        );
        Ok(record)
    }

    /// Current record for `token`. Expired and absent look the same.
    pub fn get(&self, token: &str) -> StoreResult<CorrelationRecord> {
        let mut entries = self.lock();
        live_entry(&mut entries, token, Instant::now())
            .map(|entry| entry.record.clone())
            .ok_or(StoreError::NotFound)
    }

    /// Overwrite the mutable part of a record without touching its TTL.
    ///
    /// Only `user` and `credential` are taken from `record`; identity fields
    /// and timestamps of the stored record are kept. A completed record
    /// accepts only an identical write.
    pub fn update(&self, token: &str, record: CorrelationRecord) -> StoreResult<()> {
        let mut entries = self.lock();
        let entry = live_entry(&mut entries, token, Instant::now()).ok_or(StoreError::NotFound)?;

        if entry.record.is_complete() {
            let unchanged =
                entry.record.user == record.user && entry.record.credential == record.credential;
            return if unchanged {
                Ok(())
            } else {
                Err(StoreError::AlreadyCompleted)
            };
        }

        entry.record.user = record.user;
        entry.record.credential = record.credential;
        drop(entries);
        self.changed.notify_waiters();
        Ok(())
    }

    /// Perform the single terminal write: set `user` and `credential`.
    ///
    /// Exactly one call per token can succeed; later calls get
    /// [`StoreError::AlreadyCompleted`].
    pub fn complete(
        &self,
        token: &str,
        user: &str,
        credential: String,
    ) -> StoreResult<CorrelationRecord> {
        if credential.is_empty() {
            return Err(StoreError::EmptyCredential);
        }

        let mut entries = self.lock();
        let entry = live_entry(&mut entries, token, Instant::now()).ok_or(StoreError::NotFound)?;
        if entry.record.is_complete() {
            return Err(StoreError::AlreadyCompleted);
        }

        entry.record.user = Some(user.to_string());
        entry.record.credential = Some(credential);
        let record = entry.record.clone();
        drop(entries);
        self.changed.notify_waiters();
        Ok(record)
    }

    /// Remove the entry for `token`. Absent entries are not an error.
    ///
    /// Returns whether an entry was removed.
    pub fn delete(&self, token: &str) -> bool {
        self.lock().pop(token).is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.lock();
        purge_expired(&mut entries, Instant::now())
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Woken after every successful `update` or `complete`.
    pub(crate) fn changed(&self) -> &Notify {
        &self.changed
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL, DEFAULT_MAX_PENDING)
    }
}

/// Lookup that treats an expired entry as gone, removing it on the way.
fn live_entry<'a>(
    entries: &'a mut LruCache<String, Entry>,
    token: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.peek(token)?.is_expired(now) {
        entries.pop(token);
        return None;
    }
    entries.peek_mut(token)
}

fn purge_expired(entries: &mut LruCache<String, Entry>, now: Instant) -> usize {
    let mut removed = 0;
    loop {
        let expired = entries
            .peek_lru()
            .is_some_and(|(_, entry)| entry.is_expired(now));
        if !expired {
            return removed;
        }
        entries.pop_lru();
        removed += 1;
    }
}

fn deadline_timestamp(created_at: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| created_at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
