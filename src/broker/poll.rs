// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Completion watch for a pending registration.
//!
//! A background task re-reads the record at a fixed interval until it is
//! completed or gone. Store writes also wake it early, so the interval is
//! only an upper bound on detection latency. The result is delivered once
//! through a oneshot channel, so a session sees exactly one outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::models::CorrelationRecord;
use crate::store::{CorrelationStore, StoreError};
use crate::token::fingerprint;

/// Default poll period (500 ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Terminal result of watching a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Record carries a credential.
    Completed(CorrelationRecord),
    /// Record expired or was removed before completion.
    TimedOut,
}

/// Handle to a running watch. Dropping it stops the task.
pub struct CompletionWatch {
    outcome: oneshot::Receiver<PollOutcome>,
    task: JoinHandle<()>,
}

impl CompletionWatch {
    /// Wait for the outcome. Cancel-safe: can be used inside `select!`.
    pub async fn outcome(&mut self) -> PollOutcome {
        // A closed channel means the task died; treat it like a lost record.
        (&mut self.outcome).await.unwrap_or(PollOutcome::TimedOut)
    }
}

impl Drop for CompletionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start watching `token` in the background.
pub fn spawn_completion_watch(
    store: Arc<CorrelationStore>,
    token: String,
    interval: Duration,
) -> CompletionWatch {
    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let outcome = watch(&store, &token, interval).await;
        let _ = tx.send(outcome);
    });
    CompletionWatch { outcome: rx, task }
}

async fn watch(store: &CorrelationStore, token: &str, interval: Duration) -> PollOutcome {
    loop {
        // Register for wake-ups before reading so a write between the read
        // and the wait is not missed.
        let notified = store.changed().notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match store.get(token) {
            Ok(record) if record.is_complete() => return PollOutcome::Completed(record),
            Ok(_) => {}
            Err(StoreError::NotFound) => return PollOutcome::TimedOut,
            Err(e) => {
                trace!(token = %fingerprint(token), error = %e, "Unexpected store error while polling");
                return PollOutcome::TimedOut;
            }
        }

        tokio::select! {
            _ = &mut notified => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
