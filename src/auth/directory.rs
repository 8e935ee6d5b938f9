// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential verification and network authorization collaborators.
//!
//! The broker never decides who a user is or where they may join; it asks
//! a [`CredentialVerifier`] and a [`NetworkAuthorizer`]. Both return a
//! [`DirectoryError`] whose detail stays server-side: the resolver collapses
//! every variant into one undifferentiated rejection.
//!
//! [`StaticUserDirectory`] implements both from a JSON users file. Secrets
//! are stored as Argon2 PHC strings:
//!
//! ```json
//! {"users": [
//!   {"username": "alice", "password_hash": "$argon2id$v=19$m=19456,t=2,p=1$...", "role": "admin"},
//!   {"username": "bob", "password_hash": "$argon2id$...", "networks": ["mesh-a"]}
//! ]}
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2,
};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

use super::Role;

/// Verified in place of a missing user's hash so unknown and known
/// usernames cost the same.
const UNKNOWN_USER_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$aG9zdC1hdXRoLWJyb2tlcg$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unknown user")]
    UnknownUser,
    #[error("secret does not match")]
    BadSecret,
    #[error("user is not permitted on network")]
    NotPermitted,
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// `verify(username, secret) -> ok | reject`
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, secret: &str) -> Result<(), DirectoryError>;
}

/// `is_allowed(username, network) -> ok | reject`
#[async_trait]
pub trait NetworkAuthorizer: Send + Sync {
    async fn is_allowed(&self, username: &str, network: &str) -> Result<(), DirectoryError>;
}

/// One entry of the users file.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    pub username: String,
    /// Argon2 PHC string of the user's secret.
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub networks: Vec<String>,
}

#[derive(Deserialize)]
struct DirectoryFile {
    users: Vec<DirectoryUser>,
}

#[derive(Debug, Error)]
pub enum DirectoryLoadError {
    #[error("failed to read users file: {0}")]
    Io(#[from] io::Error),
    #[error("failed to parse users file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("user {0}: password_hash must be an Argon2 PHC string")]
    InvalidHash(String),
    #[error("failed to hash secret: {0}")]
    Hashing(String),
    #[error("user {0} is listed more than once")]
    DuplicateUser(String),
}

struct StoredUser {
    password_hash: String,
    role: Role,
    networks: HashSet<String>,
}

/// Read-only user directory held in memory.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, StoredUser>,
}

impl StaticUserDirectory {
    /// Load the directory from a JSON users file.
    pub fn load(path: &Path) -> Result<Self, DirectoryLoadError> {
        let file = File::open(path)?;
        let parsed: DirectoryFile = serde_json::from_reader(BufReader::new(file))?;
        Self::from_users(parsed.users)
    }

    pub fn from_users(
        users: impl IntoIterator<Item = DirectoryUser>,
    ) -> Result<Self, DirectoryLoadError> {
        let mut directory = Self::default();
        for user in users {
            let key = normalize_username(&user.username);
            if !is_argon2_phc(&user.password_hash) {
                return Err(DirectoryLoadError::InvalidHash(user.username));
            }
            if directory.users.contains_key(&key) {
                return Err(DirectoryLoadError::DuplicateUser(user.username));
            }
            directory.users.insert(
                key,
                StoredUser {
                    password_hash: user.password_hash,
                    role: user.role,
                    networks: user.networks.into_iter().collect(),
                },
            );
        }
        Ok(directory)
    }

    /// Add a user from a plaintext secret, hashing it with Argon2id.
    pub fn with_user(
        mut self,
        username: &str,
        secret: &str,
        role: Role,
        networks: &[&str],
    ) -> Result<Self, DirectoryLoadError> {
        self.users.insert(
            normalize_username(username),
            StoredUser {
                password_hash: hash_secret(secret)?,
                role,
                networks: networks.iter().map(|n| n.to_string()).collect(),
            },
        );
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticUserDirectory {
    async fn verify(&self, username: &str, secret: &str) -> Result<(), DirectoryError> {
        let user = self.users.get(&normalize_username(username));
        let stored = user
            .map_or(UNKNOWN_USER_HASH, |u| u.password_hash.as_str())
            .to_owned();
        let secret = secret.to_owned();
        let matched = tokio::task::spawn_blocking(move || verify_secret(&secret, &stored))
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
        match user {
            Some(_) if matched => Ok(()),
            Some(_) => Err(DirectoryError::BadSecret),
            None => Err(DirectoryError::UnknownUser),
        }
    }
}

#[async_trait]
impl NetworkAuthorizer for StaticUserDirectory {
    async fn is_allowed(&self, username: &str, network: &str) -> Result<(), DirectoryError> {
        let user = self
            .users
            .get(&normalize_username(username))
            .ok_or(DirectoryError::UnknownUser)?;
        if user.role.joins_any_network() || user.networks.contains(network) {
            Ok(())
        } else {
            Err(DirectoryError::NotPermitted)
        }
    }
}

/// Canonical username form: trimmed, NFKC-normalized, lowercased.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().nfkc().collect::<String>().to_lowercase()
}

/// Hash a secret into an Argon2id PHC string with a fresh salt.
pub fn hash_secret(secret: &str) -> Result<String, DirectoryLoadError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DirectoryLoadError::Hashing(e.to_string()))
}

fn verify_secret(secret: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
        .and_then(|parsed| Argon2::default().verify_password(secret.as_bytes(), &parsed))
        .is_ok()
}

fn is_argon2_phc(phc: &str) -> bool {
    PasswordHash::new(phc)
        .map(|parsed| Algorithm::new(parsed.algorithm.as_str()).is_ok())
        .unwrap_or(false)
}
