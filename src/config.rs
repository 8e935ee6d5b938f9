// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values, and the
//! [`BrokerConfig`] loaded from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8443` |
//! | `API_CONN_STRING` | Public API `host[:port]` used in redirect URLs | `localhost:8443` |
//! | `BASIC_AUTH` | Local username/secret joins (`yes`/`no`) | `yes` |
//! | `AUTH_PROVIDER` | `google`, `github`, `azure-ad` or `oidc` | unset (SSO off) |
//! | `CLIENT_ID` | OAuth client id | Required with a provider |
//! | `AZURE_TENANT` | Tenant for `azure-ad` | `common` |
//! | `OAUTH_AUTHORIZE_URL` | Provider authorize endpoint | Provider default, required for `oidc` |
//! | `OAUTH_CALLBACK_URL` | `redirect_uri` sent to the provider | `https://<api>/api/oauth/callback` |
//! | `SESSION_TTL_SECS` | Lifetime of a pending registration | `300` |
//! | `POLL_INTERVAL_MS` | Completion poll interval | `500` |
//! | `MAX_PENDING_SESSIONS` | Pending registration cap | `10000` |
//! | `REAPER_INTERVAL_SECS` | Expired-record sweep interval | `30` |
//! | `REVALIDATE_NETWORK_ACCESS` | Re-check network access on SSO completion | `yes` |
//! | `MASTER_KEY` | Bearer key for the completion endpoint | unset (endpoint off) |
//! | `JOIN_TOKEN_SECRET` | HS256 secret for local join credentials | random per process |
//! | `JOIN_TOKEN_TTL_SECS` | Lifetime of issued join credentials | `86400` |
//! | `USERS_FILE` | JSON user directory | unset (no users) |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::auth::issuer::DEFAULT_JOIN_TOKEN_TTL;
use crate::broker::DEFAULT_POLL_INTERVAL;
use crate::reaper::DEFAULT_SWEEP_INTERVAL;
use crate::store::{DEFAULT_MAX_PENDING, DEFAULT_SESSION_TTL};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Public API host embedded in SSO redirect URLs.
pub const API_CONN_STRING_ENV: &str = "API_CONN_STRING";

pub const BASIC_AUTH_ENV: &str = "BASIC_AUTH";
pub const AUTH_PROVIDER_ENV: &str = "AUTH_PROVIDER";
pub const CLIENT_ID_ENV: &str = "CLIENT_ID";
pub const AZURE_TENANT_ENV: &str = "AZURE_TENANT";
pub const OAUTH_AUTHORIZE_URL_ENV: &str = "OAUTH_AUTHORIZE_URL";
pub const OAUTH_CALLBACK_URL_ENV: &str = "OAUTH_CALLBACK_URL";

/// Correlation TTL in seconds. This is the session timeout.
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const POLL_INTERVAL_MS_ENV: &str = "POLL_INTERVAL_MS";
pub const MAX_PENDING_SESSIONS_ENV: &str = "MAX_PENDING_SESSIONS";
pub const REAPER_INTERVAL_SECS_ENV: &str = "REAPER_INTERVAL_SECS";
pub const REVALIDATE_NETWORK_ACCESS_ENV: &str = "REVALIDATE_NETWORK_ACCESS";

/// Bearer key guarding `POST /api/v1/auth-register/{token}/complete`.
///
/// # Default
/// Unset, which disables the endpoint.
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";

pub const JOIN_TOKEN_SECRET_ENV: &str = "JOIN_TOKEN_SECRET";
pub const JOIN_TOKEN_TTL_SECS_ENV: &str = "JOIN_TOKEN_TTL_SECS";
pub const USERS_FILE_ENV: &str = "USERS_FILE";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_API_HOST: &str = "localhost:8443";
const DEFAULT_AZURE_TENANT: &str = "common";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    GitHub,
    AzureAd,
    Oidc,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::GitHub => "github",
            ProviderKind::AzureAd => "azure-ad",
            ProviderKind::Oidc => "oidc",
        }
    }

    fn default_scopes(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "read:user user:email",
            _ => "openid email profile",
        }
    }

    fn default_authorize_url(&self, azure_tenant: &str) -> Option<String> {
        match self {
            ProviderKind::Google => {
                Some("https://accounts.google.com/o/oauth2/v2/auth".to_string())
            }
            ProviderKind::GitHub => Some("https://github.com/login/oauth/authorize".to_string()),
            ProviderKind::AzureAd => Some(format!(
                "https://login.microsoftonline.com/{azure_tenant}/oauth2/v2.0/authorize"
            )),
            ProviderKind::Oidc => None,
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(ProviderKind::Google),
            "github" => Ok(ProviderKind::GitHub),
            "azure-ad" | "azuread" | "azure" => Ok(ProviderKind::AzureAd),
            "oidc" => Ok(ProviderKind::Oidc),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// OAuth client settings for the SSO flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProviderConfig {
    pub kind: ProviderKind,
    pub client_id: String,
    pub authorize_url: Url,
    pub callback_url: Url,
    pub scopes: String,
}

impl IdentityProviderConfig {
    /// Provider authorize URL carrying `token` as the OAuth `state`.
    pub fn authorization_url(&self, token: &str) -> Url {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.callback_url.as_str())
            .append_pair("scope", &self.scopes)
            .append_pair("state", token);
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Clone)]
pub struct BrokerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Public `host[:port]` of the API.
    pub api_host: String,
    pub local_auth_enabled: bool,
    pub identity_provider: Option<IdentityProviderConfig>,
    pub session_ttl: Duration,
    pub poll_interval: Duration,
    pub max_pending_sessions: usize,
    pub sweep_interval: Duration,
    pub revalidate_network_access: bool,
    pub master_key: Option<String>,
    pub join_secret: Option<String>,
    pub join_token_ttl: Duration,
    pub users_file: Option<PathBuf>,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            api_host: DEFAULT_API_HOST.to_string(),
            local_auth_enabled: true,
            identity_provider: None,
            session_ttl: DEFAULT_SESSION_TTL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_pending_sessions: DEFAULT_MAX_PENDING,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            revalidate_network_access: true,
            master_key: None,
            join_secret: None,
            join_token_ttl: DEFAULT_JOIN_TOKEN_TTL,
            users_file: None,
            tls: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("bind", &self.bind_addr())
            .field("api_host", &self.api_host)
            .field("local_auth_enabled", &self.local_auth_enabled)
            .field("identity_provider", &self.identity_provider)
            .field("session_ttl", &self.session_ttl)
            .field("poll_interval", &self.poll_interval)
            .field("max_pending_sessions", &self.max_pending_sessions)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("join_secret", &self.join_secret.as_ref().map(|_| "<redacted>"))
            .field("users_file", &self.users_file)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

impl BrokerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a custom variable lookup.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let host = parse_or(&get, HOST_ENV, defaults.host)?;
        let port = parse_or(&get, PORT_ENV, defaults.port)?;
        let api_host = get(API_CONN_STRING_ENV).unwrap_or(defaults.api_host);
        let local_auth_enabled = flag_or(&get, BASIC_AUTH_ENV, true)?;

        let identity_provider = match get(AUTH_PROVIDER_ENV) {
            None => None,
            Some(raw) => {
                let kind = raw
                    .parse::<ProviderKind>()
                    .map_err(|e| ConfigError::InvalidValue(AUTH_PROVIDER_ENV, e))?;
                let client_id = get(CLIENT_ID_ENV).ok_or(ConfigError::MissingVar(CLIENT_ID_ENV))?;
                let tenant =
                    get(AZURE_TENANT_ENV).unwrap_or_else(|| DEFAULT_AZURE_TENANT.to_string());
                let authorize_url = get(OAUTH_AUTHORIZE_URL_ENV)
                    .or_else(|| kind.default_authorize_url(&tenant))
                    .ok_or(ConfigError::MissingVar(OAUTH_AUTHORIZE_URL_ENV))?;
                let callback_url = get(OAUTH_CALLBACK_URL_ENV)
                    .unwrap_or_else(|| format!("https://{api_host}/api/oauth/callback"));
                Some(IdentityProviderConfig {
                    kind,
                    client_id,
                    authorize_url: parse_url(OAUTH_AUTHORIZE_URL_ENV, &authorize_url)?,
                    callback_url: parse_url(OAUTH_CALLBACK_URL_ENV, &callback_url)?,
                    scopes: kind.default_scopes().to_string(),
                })
            }
        };

        let session_ttl = Duration::from_secs(positive_or(
            &get,
            SESSION_TTL_SECS_ENV,
            DEFAULT_SESSION_TTL.as_secs(),
        )?);
        let poll_interval = Duration::from_millis(positive_or(
            &get,
            POLL_INTERVAL_MS_ENV,
            millis(DEFAULT_POLL_INTERVAL),
        )?);
        let max_pending_sessions =
            positive_or(&get, MAX_PENDING_SESSIONS_ENV, DEFAULT_MAX_PENDING as u64)? as usize;
        let sweep_interval = Duration::from_secs(positive_or(
            &get,
            REAPER_INTERVAL_SECS_ENV,
            DEFAULT_SWEEP_INTERVAL.as_secs(),
        )?);
        let revalidate_network_access = flag_or(&get, REVALIDATE_NETWORK_ACCESS_ENV, true)?;
        let join_token_ttl = Duration::from_secs(positive_or(
            &get,
            JOIN_TOKEN_TTL_SECS_ENV,
            DEFAULT_JOIN_TOKEN_TTL.as_secs(),
        )?);

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::MissingVar(TLS_CERT_PATH_ENV)),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    LOG_FORMAT_ENV,
                    format!("expected 'json' or 'pretty', got '{other}'"),
                ))
            }
        };

        Ok(Self {
            host,
            port,
            api_host,
            local_auth_enabled,
            identity_provider,
            session_ttl,
            poll_interval,
            max_pending_sessions,
            sweep_interval,
            revalidate_network_access,
            master_key: get(MASTER_KEY_ENV),
            join_secret: get(JOIN_TOKEN_SECRET_ENV),
            join_token_ttl,
            users_file: get(USERS_FILE_ENV).map(PathBuf::from),
            tls,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
    }
}

fn positive_or<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, key, default)? {
        0 => Err(ConfigError::InvalidValue(key, "must be greater than zero".into())),
        value => Ok(value),
    }
}

fn flag_or<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key,
            format!("expected yes/no, got '{other}'"),
        )),
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidValue(key, e.to_string()))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
