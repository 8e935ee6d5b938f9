// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Registration Data Models
//!
//! Wire and storage shapes for host registration sessions.
//!
//! ## Model Categories
//!
//! - **Agent messages**: the join request a host sends as the first frame
//!   on the registration socket ([`RegisterMessage`])
//! - **Correlation records**: the TTL-bound state parked in the
//!   [`CorrelationStore`](crate::store::CorrelationStore) while a join is pending
//! - **HTTP bodies**: requests accepted by the completion endpoint
//!
//! Secrets (`password`, `credential`) are redacted from every `Debug` impl.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::token::SessionToken;

// =============================================================================
// Agent Join Request
// =============================================================================

/// Identity of the host attempting to join.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegisterHost {
    /// Stable host identifier assigned by the agent.
    pub id: Uuid,
    /// Human-readable host name.
    #[serde(default)]
    pub name: String,
}

/// First message sent by an agent on the registration socket.
///
/// ```json
/// {"host": {"id": "...", "name": "edge-1"}, "password": "...", "network": "mesh", "user": "alice"}
/// ```
///
/// A present `user` selects the local-credential flow; without one the join
/// goes through the configured SSO provider.
#[derive(Clone, Deserialize)]
pub struct RegisterMessage {
    pub host: RegisterHost,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterMessageError {
    #[error("host id is missing")]
    MissingHostId,
    #[error("secret is required")]
    MissingSecret,
}

impl RegisterMessage {
    /// Requesting username, if one was supplied.
    pub fn username(&self) -> Option<&str> {
        non_blank(self.user.as_deref())
    }

    /// Requested network, if one was supplied.
    pub fn network_name(&self) -> Option<&str> {
        non_blank(self.network.as_deref())
    }

    /// Structural checks run before any state is created.
    ///
    /// A secret is required on both flows.
    pub fn validate(&self) -> Result<(), RegisterMessageError> {
        if self.host.id.is_nil() {
            return Err(RegisterMessageError::MissingHostId);
        }
        if self.password.is_empty() {
            return Err(RegisterMessageError::MissingSecret);
        }
        Ok(())
    }
}

impl fmt::Debug for RegisterMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterMessage")
            .field("host", &self.host)
            .field("password", &"<redacted>")
            .field("network", &self.network)
            .field("user", &self.user)
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// =============================================================================
// Correlation Record
// =============================================================================

/// Pending-registration state addressed by a correlation token.
///
/// `token`, host identity, network and timestamps are fixed at creation.
/// `user` and `credential` are written exactly once when the join completes.
#[derive(Clone, PartialEq, Eq)]
pub struct CorrelationRecord {
    pub token: SessionToken,
    pub host_id: Uuid,
    pub host_name: String,
    pub network: Option<String>,
    /// Principal that authenticated; unset for SSO until the callback lands.
    pub user: Option<String>,
    /// Opaque result payload; non-empty once the record is complete.
    pub credential: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CorrelationRecord {
    /// Build an uncompleted record for a validated join request.
    pub fn pending(token: SessionToken, request: &RegisterMessage) -> Self {
        let now = Utc::now();
        Self {
            token,
            host_id: request.host.id,
            host_name: request.host.name.clone(),
            network: request.network_name().map(str::to_string),
            user: None,
            credential: None,
            created_at: now,
            // The store stamps the real deadline on insert.
            expires_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }
}

impl fmt::Debug for CorrelationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRecord")
            .field("token", &self.token)
            .field("host_id", &self.host_id)
            .field("host_name", &self.host_name)
            .field("network", &self.network)
            .field("user", &self.user)
            .field("complete", &self.is_complete())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// HTTP Request Bodies
// =============================================================================

/// Body of `POST /api/v1/auth-register/{token}/complete`.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteRegistrationRequest {
    /// Username resolved by the identity provider.
    pub user: String,
    /// Credential to hand to the waiting host.
    pub credential: String,
}

impl fmt::Debug for CompleteRegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompleteRegistrationRequest")
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .finish()
    }
}
