// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::context::{Edition, LicenseLimits};
use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Correlation store headroom ("ok" or "full").
    pub sessions: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Server edition, limits and registration settings.
#[derive(Debug, Serialize, ToSchema)]
pub struct ServerStatus {
    pub edition: Edition,
    pub free_tier: bool,
    pub limits: LicenseLimits,
    pub local_auth_enabled: bool,
    /// Configured SSO provider, if any.
    pub identity_provider: Option<String>,
    pub pending_registrations: usize,
    pub session_ttl_secs: u64,
}

fn check_sessions(state: &AppState) -> String {
    if state.store.len() < state.store.capacity() {
        "ok".to_string()
    } else {
        "full".to_string()
    }
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let sessions = check_sessions(&state);
    let all_ok = sessions == "ok";

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            sessions,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 503 while the store cannot take new registrations.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[utoipa::path(
    get,
    path = "/api/server/status",
    tag = "Health",
    responses(
        (status = 200, description = "Server status", body = ServerStatus)
    )
)]
pub async fn server_status(State(state): State<AppState>) -> Json<ServerStatus> {
    Json(ServerStatus {
        edition: state.context.edition,
        free_tier: state.context.free_tier,
        limits: state.context.limits,
        local_auth_enabled: state.config.local_auth_enabled,
        identity_provider: state
            .config
            .identity_provider
            .as_ref()
            .map(|p| p.kind.as_str().to_string()),
        pending_registrations: state.store.len(),
        session_ttl_secs: state.store.ttl().as_secs(),
    })
}
