// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::{AuthStrategyResolver, JwtJoinIssuer, ResolverSettings, StaticUserDirectory};
use crate::broker::{BrokerSettings, SessionBroker};
use crate::config::BrokerConfig;
use crate::context::ServerContext;
use crate::store::CorrelationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CorrelationStore>,
    pub broker: Arc<SessionBroker>,
    pub resolver: Arc<AuthStrategyResolver>,
    pub config: Arc<BrokerConfig>,
    pub context: Arc<ServerContext>,
}

impl AppState {
    pub fn new(
        config: BrokerConfig,
        context: ServerContext,
        directory: Arc<StaticUserDirectory>,
    ) -> Self {
        let store = Arc::new(CorrelationStore::new(
            config.session_ttl,
            config.max_pending_sessions,
        ));
        let resolver = Arc::new(AuthStrategyResolver::new(
            ResolverSettings {
                local_auth_enabled: config.local_auth_enabled,
                identity_provider: config
                    .identity_provider
                    .as_ref()
                    .map(|p| p.kind.as_str().to_string()),
                api_host: config.api_host.clone(),
            },
            directory.clone(),
            directory,
        ));
        let issuer = JwtJoinIssuer::new(join_secret(&config).as_bytes())
            .with_ttl(config.join_token_ttl);
        let broker = Arc::new(SessionBroker::new(
            store.clone(),
            resolver.clone(),
            Arc::new(issuer),
            BrokerSettings {
                poll_interval: config.poll_interval,
                revalidate_network_access: config.revalidate_network_access,
            },
        ));

        Self {
            store,
            broker,
            resolver,
            config: Arc::new(config),
            context: Arc::new(context),
        }
    }

    /// State with an empty user directory and a community context.
    pub fn for_config(config: BrokerConfig) -> Self {
        Self::new(
            config,
            ServerContext::default(),
            Arc::new(StaticUserDirectory::default()),
        )
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::for_config(BrokerConfig::default())
    }
}

/// Configured signing secret, or a fresh random one for this process.
fn join_secret(config: &BrokerConfig) -> String {
    config.join_secret.clone().unwrap_or_else(|| {
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
    })
}
