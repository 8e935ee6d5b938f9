// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Server edition and license limits.
//!
//! Carried explicitly in [`AppState`](crate::state::AppState) and reported
//! by the status endpoint. Nothing in the join path branches on it.

use std::str::FromStr;

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfigError;

pub const SERVER_EDITION_ENV: &str = "SERVER_EDITION";
pub const FREE_TIER_ENV: &str = "FREE_TIER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Edition {
    #[default]
    Community,
    Enterprise,
}

impl FromStr for Edition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "community" | "ce" => Ok(Edition::Community),
            "enterprise" | "ee" => Ok(Edition::Enterprise),
            other => Err(format!("unknown edition '{other}'")),
        }
    }
}

/// Resource caps attached to a license. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct LicenseLimits {
    pub servers: u32,
    pub users: u32,
    pub hosts: u32,
    pub clients: u32,
    pub networks: u32,
}

impl Default for LicenseLimits {
    fn default() -> Self {
        Self {
            servers: 1,
            users: 1,
            hosts: 0,
            clients: 0,
            networks: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerContext {
    pub edition: Edition,
    pub free_tier: bool,
    pub limits: LicenseLimits,
}

impl ServerContext {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let edition = match lookup(SERVER_EDITION_ENV).filter(|v| !v.trim().is_empty()) {
            None => Edition::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::InvalidValue(SERVER_EDITION_ENV, e))?,
        };
        let free_tier = lookup(FREE_TIER_ENV)
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "on" | "1"))
            .unwrap_or(false);

        Ok(Self {
            edition,
            free_tier,
            limits: LicenseLimits::default(),
        })
    }

    pub fn is_enterprise(&self) -> bool {
        self.edition == Edition::Enterprise
    }
}
