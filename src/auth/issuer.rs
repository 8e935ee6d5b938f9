// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Join credential issuance for the local-credential flow.
//!
//! When a host authenticates with a username and secret, the broker mints
//! the credential itself instead of waiting for an external callback.
//! [`JwtJoinIssuer`] produces an HS256 JWT bound to the host, the user and
//! the requested network.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::CorrelationRecord;

/// Issuer claim on every join credential.
pub const JOIN_TOKEN_ISSUER: &str = "host-auth-broker";

/// Default lifetime of an issued join credential (24 hours).
pub const DEFAULT_JOIN_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("failed to sign join credential: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Mints the opaque credential handed to a host after local authentication.
pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, record: &CorrelationRecord, user: &str) -> Result<String, IssueError>;
}

/// Claims carried by a join credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinClaims {
    /// Host id
    pub sub: String,
    /// Host name
    pub name: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// HS256 join credential issuer.
pub struct JwtJoinIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtJoinIssuer {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: DEFAULT_JOIN_TOKEN_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate a credential previously minted by this issuer.
    pub fn verify(&self, credential: &str) -> Result<JoinClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[JOIN_TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        decode::<JoinClaims>(credential, &self.decoding_key, &validation).map(|data| data.claims)
    }
}

impl CredentialIssuer for JwtJoinIssuer {
    fn issue(&self, record: &CorrelationRecord, user: &str) -> Result<String, IssueError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = JoinClaims {
            sub: record.host_id.to_string(),
            name: record.host_name.clone(),
            user: user.to_string(),
            network: record.network.clone(),
            iss: JOIN_TOKEN_ISSUER.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegisterHost, RegisterMessage};
    use crate::token::SessionToken;

    fn record() -> CorrelationRecord {
        let request = RegisterMessage {
            host: RegisterHost {
                id: Uuid::new_v4(),
                name: "edge-7".into(),
            },
            password: "pw".into(),
            network: Some("mesh".into()),
            user: Some("alice".into()),
        };
        CorrelationRecord::pending(SessionToken::generate().unwrap(), &request)
    }

    #[test]
    fn issued_credential_round_trips_claims() {
        let issuer = JwtJoinIssuer::new(b"test-secret");
        let record = record();

        let credential = issuer.issue(&record, "alice").unwrap();
        let claims = issuer.verify(&credential).unwrap();

        assert_eq!(claims.sub, record.host_id.to_string());
        assert_eq!(claims.name, "edge-7");
        assert_eq!(claims.user, "alice");
        assert_eq!(claims.network.as_deref(), Some("mesh"));
        assert_eq!(claims.iss, JOIN_TOKEN_ISSUER);
        assert_eq!(claims.exp - claims.iat, DEFAULT_JOIN_TOKEN_TTL.as_secs() as i64);
    }

    #[test]
    fn each_issue_gets_a_fresh_id() {
        let issuer = JwtJoinIssuer::new(b"test-secret");
        let record = record();
        let a = issuer.verify(&issuer.issue(&record, "alice").unwrap()).unwrap();
        let b = issuer.verify(&issuer.issue(&record, "alice").unwrap()).unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn credential_from_other_secret_is_rejected() {
        let issuer = JwtJoinIssuer::new(b"secret-a");
        let other = JwtJoinIssuer::new(b"secret-b");
        let credential = issuer.issue(&record(), "alice").unwrap();
        assert!(other.verify(&credential).is_err());
    }
}
