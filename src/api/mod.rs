// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info_span, Span};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::health::{HealthChecks, HealthResponse, ReadyResponse, ServerStatus},
    context::{Edition, LicenseLimits},
    models::CompleteRegistrationRequest,
    state::AppState,
};

pub mod health;
pub mod register;
pub mod registrations;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth-register/host", get(register::host_register))
        .route(
            "/auth-register/{token}/complete",
            post(registrations::complete),
        );

    let api_routes = Router::new()
        .nest("/v1", v1_routes)
        .route("/oauth/register/{token}", get(register::oauth_register))
        .route("/server/status", get(health::server_status));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Request span carrying the route template, never the raw URI: tokens
/// travel in the path and must stay out of the logs.
fn request_span(request: &Request<Body>) -> Span {
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str);
    info_span!("request", method = %request.method(), matched_path)
}

/// Bearer scheme for the master-key protected completion endpoint.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        health::server_status,
        register::host_register,
        register::oauth_register,
        registrations::complete
    ),
    components(
        schemas(
            CompleteRegistrationRequest,
            ReadyResponse,
            HealthChecks,
            HealthResponse,
            ServerStatus,
            Edition,
            LicenseLimits
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Registration", description = "Host join sessions and their completion"),
        (name = "Health", description = "Probes and server status")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, IdentityProviderConfig, ProviderKind};
    use crate::models::{CorrelationRecord, RegisterHost, RegisterMessage};
    use crate::token::SessionToken;
    use axum::{
        body::to_bytes,
        http::{header, StatusCode},
    };
    use std::io;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;
    use url::Url;
    use uuid::Uuid;

    const MASTER_KEY: &str = "master-key";

    fn sso_config() -> BrokerConfig {
        BrokerConfig {
            api_host: "api.mesh.example".into(),
            identity_provider: Some(IdentityProviderConfig {
                kind: ProviderKind::Google,
                client_id: "client-123".into(),
                authorize_url: Url::parse("https://accounts.google.com/o/oauth2/v2/auth").unwrap(),
                callback_url: Url::parse("https://api.mesh.example/api/oauth/callback").unwrap(),
                scopes: "openid email profile".into(),
            }),
            master_key: Some(MASTER_KEY.into()),
            ..BrokerConfig::default()
        }
    }

    fn open_session(state: &AppState) -> String {
        let message = RegisterMessage {
            host: RegisterHost {
                id: Uuid::new_v4(),
                name: "edge-1".into(),
            },
            password: "agent-secret".into(),
            network: None,
            user: None,
        };
        let token = SessionToken::generate().unwrap();
        state
            .store
            .create(CorrelationRecord::pending(token, &message))
            .unwrap()
            .token
            .as_str()
            .to_string()
    }

    fn complete_request(token: &str, auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/auth-register/{token}/complete"))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// Log sink shared with a test subscriber.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn request_logs_carry_route_template_not_token() {
        let sink = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer({
                let sink = sink.clone();
                move || sink.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let state = AppState::for_config(sso_config());
        let token = open_session(&state);
        let app = router(state);

        let landing = app
            .clone()
            .oneshot(get_request(&format!("/api/oauth/register/{token}")))
            .await
            .unwrap();
        assert_eq!(landing.status(), StatusCode::TEMPORARY_REDIRECT);

        let completed = app
            .oneshot(complete_request(
                &token,
                Some(&format!("Bearer {MASTER_KEY}")),
                r#"{"user":"alice","credential":"jwt"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(completed.status(), StatusCode::NO_CONTENT);

        let logs = sink.contents();
        assert!(logs.contains("started processing request"), "{logs}");
        assert!(logs.contains("/api/oauth/register/{token}"), "{logs}");
        assert!(logs.contains("/api/v1/auth-register/{token}/complete"), "{logs}");
        assert!(!logs.contains(&token), "raw token leaked into logs:\n{logs}");
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_probes_report_ok() {
        let app = router(AppState::default());
        for uri in ["/health", "/health/live", "/health/ready"] {
            let response = app.clone().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn status_reports_context_and_pending_count() {
        let state = AppState::for_config(sso_config());
        open_session(&state);

        let response = router(state).oneshot(get_request("/api/server/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["edition"], "community");
        assert_eq!(body["limits"]["servers"], 1);
        assert_eq!(body["identity_provider"], "google");
        assert_eq!(body["pending_registrations"], 1);
        assert_eq!(body["session_ttl_secs"], 300);
    }

    #[tokio::test]
    async fn complete_endpoint_lifecycle() {
        let state = AppState::for_config(sso_config());
        let token = open_session(&state);
        let app = router(state.clone());
        let bearer = format!("Bearer {MASTER_KEY}");
        let body = r#"{"user":"alice","credential":"jwt"}"#;

        let response = app
            .clone()
            .oneshot(complete_request(&token, Some(&bearer), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.store.get(&token).unwrap().is_complete());

        let again = app
            .clone()
            .oneshot(complete_request(&token, Some(&bearer), body))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let unknown = SessionToken::generate().unwrap();
        let missing = app
            .oneshot(complete_request(unknown.as_str(), Some(&bearer), body))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn complete_endpoint_requires_master_key() {
        let state = AppState::for_config(sso_config());
        let token = open_session(&state);
        let app = router(state.clone());
        let body = r#"{"user":"alice","credential":"jwt"}"#;

        let anonymous = app
            .clone()
            .oneshot(complete_request(&token, None, body))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(complete_request(&token, Some("Bearer guess"), body))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert!(!state.store.get(&token).unwrap().is_complete());

        let disabled = router(AppState::default())
            .oneshot(complete_request(&token, Some("Bearer guess"), body))
            .await
            .unwrap();
        assert_eq!(disabled.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn complete_endpoint_rejects_empty_credential() {
        let state = AppState::for_config(sso_config());
        let token = open_session(&state);
        let response = router(state)
            .oneshot(complete_request(
                &token,
                Some(&format!("Bearer {MASTER_KEY}")),
                r#"{"user":"alice","credential":""}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oauth_landing_redirects_pending_session() {
        let state = AppState::for_config(sso_config());
        let token = open_session(&state);

        let response = router(state)
            .oneshot(get_request(&format!("/api/oauth/register/{token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let url = Url::parse(location).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let state_param = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned());
        assert_eq!(state_param.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn oauth_landing_rejects_unknown_completed_or_disabled() {
        let state = AppState::for_config(sso_config());
        let app = router(state.clone());

        let unknown = SessionToken::generate().unwrap();
        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/oauth/register/{}", unknown.as_str())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let token = open_session(&state);
        state.store.complete(&token, "alice", "jwt".into()).unwrap();
        let response = app
            .oneshot(get_request(&format!("/api/oauth/register/{token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let no_sso = AppState::default();
        let token = open_session(&no_sso);
        let response = router(no_sso)
            .oneshot(get_request(&format!("/api/oauth/register/{token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn registration_socket_requires_upgrade() {
        let response = router(AppState::default())
            .oneshot(get_request("/api/v1/auth-register/host"))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
