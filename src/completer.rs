// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External callback completer.
//!
//! Whatever finished the identity-provider exchange (an OAuth callback
//! handler, a login form, an operator tool) calls
//! [`complete_registration`] with the token it was handed back. It only
//! ever updates an existing record: it never creates or deletes one, and
//! only the first completion for a token takes effect.

use thiserror::Error;
use tracing::{info, warn};

use crate::models::CorrelationRecord;
use crate::store::{CorrelationStore, StoreError};
use crate::token::{fingerprint, is_well_formed};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompletionError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("registration session not found")]
    NotFound,
    #[error("registration session already completed")]
    AlreadyCompleted,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CompletionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => CompletionError::NotFound,
            StoreError::AlreadyCompleted => CompletionError::AlreadyCompleted,
            StoreError::EmptyCredential => {
                CompletionError::InvalidInput("credential must not be empty")
            }
            other => CompletionError::Store(other),
        }
    }
}

/// Write the resolved `user` and `credential` into the pending record for
/// `token`.
///
/// A token that could never have been issued reads as not found.
pub fn complete_registration(
    store: &CorrelationStore,
    token: &str,
    user: &str,
    credential: &str,
) -> Result<CorrelationRecord, CompletionError> {
    if !is_well_formed(token) {
        return Err(CompletionError::NotFound);
    }
    let user = user.trim();
    if user.is_empty() {
        return Err(CompletionError::InvalidInput("user must not be empty"));
    }
    if credential.is_empty() {
        return Err(CompletionError::InvalidInput("credential must not be empty"));
    }

    match store.complete(token, user, credential.to_string()) {
        Ok(record) => {
            info!(
                token = %fingerprint(token),
                host_id = %record.host_id,
                user = %user,
                "Registration completed by callback"
            );
            Ok(record)
        }
        Err(e) => {
            warn!(token = %fingerprint(token), error = %e, "Registration completion refused");
            Err(e.into())
        }
    }
}
