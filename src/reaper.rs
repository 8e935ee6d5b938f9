// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Reaper
//!
//! Background task that periodically drops expired correlation records.
//!
//! Reads already treat expired entries as absent, so the reaper is not
//! needed for correctness. It reclaims memory for sessions nobody will
//! touch again: the agent hung up and the completer never ran.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::store::CorrelationStore;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic sweeper for a [`CorrelationStore`].
pub struct ExpiryReaper {
    store: Arc<CorrelationStore>,
    sweep_interval: Duration,
}

impl ExpiryReaper {
    pub fn new(store: Arc<CorrelationStore>) -> Self {
        Self {
            store,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(reaper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Expiry reaper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry reaper shutting down");
                    return;
                }
            }

            let removed = self.store.sweep_expired();
            if removed > 0 {
                debug!(removed, "Expiry reaper: dropped expired registrations");
            }
        }
    }
}
