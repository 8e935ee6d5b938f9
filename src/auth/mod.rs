// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Decides how a joining host authenticates, and guards the trusted HTTP
//! surface used by the out-of-band completer.
//!
//! ## Join Flow
//!
//! 1. Host sends its join request over the registration socket
//! 2. [`AuthStrategyResolver`] picks a flow:
//!    - username present → local credentials, checked via
//!      [`CredentialVerifier`] and [`NetworkAuthorizer`]
//!    - no username → SSO redirect to the configured provider
//! 3. Local joins get a credential from a [`CredentialIssuer`]; SSO joins
//!    wait for the completer to deposit one
//!
//! ## Security
//!
//! - Rejections are uniform: the agent never learns which check failed
//! - Directory secrets are stored as Argon2id PHC hashes
//! - The master key is compared as a SHA-256 digest in constant time
//! - The completion endpoint requires the server master key

pub mod directory;
pub mod error;
pub mod extractor;
pub mod issuer;
pub mod resolver;
pub mod roles;

pub use directory::{
    CredentialVerifier, DirectoryError, NetworkAuthorizer, StaticUserDirectory,
};
pub use error::AuthError;
pub use extractor::MasterKey;
pub use issuer::{CredentialIssuer, JwtJoinIssuer};
pub use resolver::{AuthStrategy, AuthStrategyResolver, RejectReason, ResolverSettings};
pub use roles::Role;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two byte strings without short-circuiting on the first mismatch.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Compare two secrets of arbitrary length via their digests.
pub(crate) fn secrets_match(provided: &str, expected: &str) -> bool {
    constant_time_eq(
        &Sha256::digest(provided.as_bytes()),
        &Sha256::digest(expected.as_bytes()),
    )
}
