// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::auth::MasterKey;
use crate::completer::complete_registration;
use crate::error::ApiError;
use crate::models::CompleteRegistrationRequest;
use crate::state::AppState;

/// Deposit the outcome of an out-of-band login into a pending session.
///
/// Called by the component that finished the identity-provider exchange.
/// The waiting host receives `credential` on its registration socket.
#[utoipa::path(
    post,
    path = "/api/v1/auth-register/{token}/complete",
    tag = "Registration",
    security(("bearerAuth" = [])),
    params(("token" = String, Path, description = "Correlation token")),
    request_body = CompleteRegistrationRequest,
    responses(
        (status = 204, description = "Registration completed"),
        (status = 400, description = "Empty user or credential"),
        (status = 401, description = "Missing or invalid master key"),
        (status = 403, description = "Completion endpoint disabled"),
        (status = 404, description = "Unknown or expired session"),
        (status = 409, description = "Session already completed")
    )
)]
pub async fn complete(
    _: MasterKey,
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<CompleteRegistrationRequest>,
) -> Result<StatusCode, ApiError> {
    complete_registration(&state.store, &token, &request.user, &request.credential)?;
    Ok(StatusCode::NO_CONTENT)
}
