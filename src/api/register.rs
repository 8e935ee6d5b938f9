// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent-facing registration socket and the browser landing route for
//! SSO joins.

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::{Redirect, Response},
};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;
use crate::token::{fingerprint, is_well_formed};

/// Open a host registration session.
///
/// The first frame must be the JSON join request. The server answers with
/// either the SSO redirect URL followed by the credential, the credential
/// alone (local login), or a bare close frame.
#[utoipa::path(
    get,
    path = "/api/v1/auth-register/host",
    tag = "Registration",
    responses(
        (status = 101, description = "Switching to the registration websocket"),
        (status = 400, description = "Not a websocket upgrade request")
    )
)]
pub async fn host_register(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let broker = state.broker.clone();
    ws.on_upgrade(move |socket| async move {
        broker.run_session(socket).await;
    })
}

/// Browser landing page for an SSO join.
///
/// Sends the user to the identity provider with the correlation token as
/// the OAuth `state`.
#[utoipa::path(
    get,
    path = "/api/oauth/register/{token}",
    tag = "Registration",
    params(("token" = String, Path, description = "Correlation token from the redirect URL")),
    responses(
        (status = 307, description = "Redirect to the identity provider"),
        (status = 404, description = "Unknown or expired session, or SSO disabled"),
        (status = 409, description = "Session already completed")
    )
)]
pub async fn oauth_register(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Redirect, ApiError> {
    let not_found = || ApiError::not_found("registration session not found");

    let provider = state
        .config
        .identity_provider
        .as_ref()
        .ok_or_else(not_found)?;
    if !is_well_formed(&token) {
        return Err(not_found());
    }
    let record = state.store.get(&token).map_err(|_| not_found())?;
    if record.is_complete() {
        return Err(ApiError::conflict("registration already completed"));
    }

    debug!(
        token = %fingerprint(&token),
        host_id = %record.host_id,
        provider = provider.kind.as_str(),
        "Redirecting to identity provider"
    );
    Ok(Redirect::temporary(
        provider.authorization_url(&token).as_str(),
    ))
}
