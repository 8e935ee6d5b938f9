// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Correlation token generation.
//!
//! A correlation token links an agent's pending registration to the
//! out-of-band completion that finalizes it. Anyone holding the token can
//! complete or observe the join, so it is treated as a bearer secret:
//!
//! - 32 bytes from the operating system CSPRNG (`ring::rand::SystemRandom`)
//! - Encoded as unpadded URL-safe base64, always [`TOKEN_LEN`] characters
//! - Never logged; logs carry [`SessionToken::fingerprint`] instead

use std::fmt;

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Entropy per token in bytes (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Length of the encoded token in characters.
pub const TOKEN_LEN: usize = 43;

/// Number of hex characters in a log fingerprint.
const FINGERPRINT_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("system random source unavailable")]
    Entropy,
}

/// An unguessable correlation token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draw a fresh token from the system CSPRNG.
    pub fn generate() -> Result<Self, TokenError> {
        let mut bytes = [0u8; TOKEN_BYTES];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| TokenError::Entropy)?;
        Ok(Self(Base64UrlUnpadded::encode_string(&bytes)))
    }

    /// Accept a token received from the outside (URL path, callback state).
    ///
    /// Returns `None` unless the input has the exact shape of a generated token.
    pub fn parse(raw: &str) -> Option<Self> {
        is_well_formed(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, non-reversible identifier safe to put in logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check length and alphabet without decoding.
pub fn is_well_formed(raw: &str) -> bool {
    raw.len() == TOKEN_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Log fingerprint for any raw token string.
pub fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let mut out = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
