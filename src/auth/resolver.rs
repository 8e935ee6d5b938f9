// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication strategy resolution for host join requests.
//!
//! ## Flows
//!
//! - **Local**: a username is present. Local auth must be enabled, the
//!   secret must verify, and a requested network must be permitted.
//! - **SSO**: no username. An identity provider must be configured; the
//!   agent is handed `https://<api-host>/api/oauth/register/<token>`.
//!
//! Every failure maps to a [`RejectReason`]. The reason is for server logs
//! only; the agent sees the same bare close frame for all of them.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::directory::{CredentialVerifier, NetworkAuthorizer};
use crate::models::RegisterMessage;
use crate::token::SessionToken;

/// Path prefix of the browser landing route for SSO joins.
pub const OAUTH_REGISTER_PATH: &str = "/api/oauth/register";

/// How a join request will be authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Credentials verified; the broker completes the record itself.
    Local { user: String },
    /// The agent must send a human to `redirect_url`.
    Sso { redirect_url: String },
}

/// Internal cause of a rejection. Never sent to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("local authentication is disabled")]
    LocalAuthDisabled,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user not permitted on requested network")]
    NetworkNotPermitted,
    #[error("no identity provider configured")]
    NoIdentityProvider,
    #[error("session could not be opened")]
    Unavailable,
}

/// Server switches the resolver consults.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub local_auth_enabled: bool,
    /// Name of the configured provider, `None` when SSO is off.
    pub identity_provider: Option<String>,
    /// Public `host[:port]` of the API, used in redirect URLs.
    pub api_host: String,
}

pub struct AuthStrategyResolver {
    settings: ResolverSettings,
    verifier: Arc<dyn CredentialVerifier>,
    authorizer: Arc<dyn NetworkAuthorizer>,
}

impl AuthStrategyResolver {
    pub fn new(
        settings: ResolverSettings,
        verifier: Arc<dyn CredentialVerifier>,
        authorizer: Arc<dyn NetworkAuthorizer>,
    ) -> Self {
        Self {
            settings,
            verifier,
            authorizer,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Decide the flow for `request` and, for local joins, authenticate it.
    pub async fn resolve(
        &self,
        request: &RegisterMessage,
        token: &SessionToken,
    ) -> Result<AuthStrategy, RejectReason> {
        match request.username() {
            Some(user) => {
                self.authenticate_local(user, &request.password, request.network_name())
                    .await?;
                Ok(AuthStrategy::Local {
                    user: user.to_string(),
                })
            }
            None => {
                if self.settings.identity_provider.is_none() {
                    return Err(RejectReason::NoIdentityProvider);
                }
                Ok(AuthStrategy::Sso {
                    redirect_url: self.redirect_url(token),
                })
            }
        }
    }

    /// Check that `user` may join `network`.
    pub async fn authorize_network(&self, user: &str, network: &str) -> Result<(), RejectReason> {
        self.authorizer
            .is_allowed(user, network)
            .await
            .map_err(|e| {
                debug!(user = %user, network = %network, error = %e, "Network access denied");
                RejectReason::NetworkNotPermitted
            })
    }

    /// Fully-qualified browser URL for an SSO join.
    pub fn redirect_url(&self, token: &SessionToken) -> String {
        format!(
            "https://{}{}/{}",
            self.settings.api_host,
            OAUTH_REGISTER_PATH,
            token.as_str()
        )
    }

    async fn authenticate_local(
        &self,
        user: &str,
        secret: &str,
        network: Option<&str>,
    ) -> Result<(), RejectReason> {
        if !self.settings.local_auth_enabled {
            return Err(RejectReason::LocalAuthDisabled);
        }

        self.verifier.verify(user, secret).await.map_err(|e| {
            debug!(user = %user, error = %e, "Credential verification failed");
            RejectReason::InvalidCredentials
        })?;

        if let Some(network) = network {
            self.authorize_network(user, network).await?;
        }
        Ok(())
    }
}
