// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor guarding the trusted completion endpoint.
//!
//! The out-of-band completer (the component that finished the OAuth
//! exchange) proves itself with the server's master key:
//!
//! ```rust,ignore
//! async fn complete(_: MasterKey, Path(token): Path<String>) -> impl IntoResponse {
//!     // caller holds the master key
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{secrets_match, AuthError};
use crate::state::AppState;

/// Proof that the request carried `Authorization: Bearer <MASTER_KEY>`.
pub struct MasterKey;

impl FromRequestParts<AppState> for MasterKey {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .master_key
            .as_deref()
            .ok_or(AuthError::CompletionDisabled)?;

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let provided = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or(AuthError::InvalidAuthHeader)?;

        if secrets_match(provided, expected) {
            Ok(MasterKey)
        } else {
            Err(AuthError::InvalidMasterKey)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use axum::http::Request;

    fn state(master_key: Option<&str>) -> AppState {
        let config = BrokerConfig {
            master_key: master_key.map(str::to_string),
            ..BrokerConfig::default()
        };
        AppState::for_config(config)
    }

    async fn extract(state: &AppState, header: Option<&str>) -> Result<MasterKey, AuthError> {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        MasterKey::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn accepts_matching_key() {
        let state = state(Some("s3cret"));
        assert!(extract(&state, Some("Bearer s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_missing_malformed_and_wrong_keys() {
        let state = state(Some("s3cret"));
        assert!(matches!(
            extract(&state, None).await,
            Err(AuthError::MissingAuthHeader)
        ));
        assert!(matches!(
            extract(&state, Some("Basic s3cret")).await,
            Err(AuthError::InvalidAuthHeader)
        ));
        assert!(matches!(
            extract(&state, Some("Bearer nope")).await,
            Err(AuthError::InvalidMasterKey)
        ));
    }

    #[tokio::test]
    async fn disabled_without_master_key() {
        let state = state(None);
        assert!(matches!(
            extract(&state, Some("Bearer anything")).await,
            Err(AuthError::CompletionDisabled)
        ));
    }
}
