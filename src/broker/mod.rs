// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Registration Session Broker
//!
//! Drives one agent connection from join request to close.
//!
//! ## Session Flow
//!
//! 1. Read one join request; malformed input drops the session silently
//! 2. Open a correlation record under a fresh token
//! 3. Resolve the auth strategy:
//!    - local: issue the credential and complete the record in place
//!    - SSO: send the redirect URL and wait for the completer
//! 4. Watch the record until it is completed or expires, while also
//!    watching the agent for a hang-up
//! 5. Relay the credential, if any
//! 6. Delete the record and send a single close frame
//!
//! Every rejection ends in the same bare close frame. The internal reason
//! is only logged.

pub mod connection;
pub mod poll;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};

use crate::auth::{AuthStrategy, AuthStrategyResolver, CredentialIssuer, RejectReason};
use crate::models::{CorrelationRecord, RegisterMessage};
use crate::store::{CorrelationStore, StoreError};
use crate::token::SessionToken;

pub use connection::{AgentConnection, AgentMessage, ConnectionError, FrameKind};
pub use poll::{spawn_completion_watch, CompletionWatch, PollOutcome, DEFAULT_POLL_INTERVAL};

/// Attempts at drawing an unused correlation token.
const TOKEN_ATTEMPTS: usize = 3;

/// Tunables for the broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Upper bound between two reads of a pending record.
    pub poll_interval: Duration,
    /// Re-check network access for the user an SSO completion names.
    pub revalidate_network_access: bool,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            revalidate_network_access: true,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Opener was missing, malformed or invalid. Nothing was sent.
    Dropped,
    /// Authentication or session setup failed. A close frame was sent.
    Rejected,
    /// The credential was relayed.
    Completed,
    /// The record expired before completion.
    TimedOut,
    /// The agent went away mid-session.
    Disconnected,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionOutcome::Dropped => "dropped",
            SessionOutcome::Rejected => "rejected",
            SessionOutcome::Completed => "completed",
            SessionOutcome::TimedOut => "timed_out",
            SessionOutcome::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

pub struct SessionBroker {
    store: Arc<CorrelationStore>,
    resolver: Arc<AuthStrategyResolver>,
    issuer: Arc<dyn CredentialIssuer>,
    settings: BrokerSettings,
}

impl SessionBroker {
    pub fn new(
        store: Arc<CorrelationStore>,
        resolver: Arc<AuthStrategyResolver>,
        issuer: Arc<dyn CredentialIssuer>,
        settings: BrokerSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            issuer,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<CorrelationStore> {
        &self.store
    }

    /// Run one registration session to completion.
    ///
    /// Never fails: every error ends this session only and is reported
    /// through the returned outcome and the logs.
    pub async fn run_session<C: AgentConnection>(&self, mut conn: C) -> SessionOutcome {
        let Some((request, kind)) = read_join_request(&mut conn).await else {
            return SessionOutcome::Dropped;
        };

        let span = info_span!(
            "registration",
            host_id = %request.host.id,
            host_name = %request.host.name,
            network = request.network_name().unwrap_or("-"),
            token = field::Empty,
        );
        self.serve(conn, request, kind).instrument(span).await
    }

    async fn serve<C: AgentConnection>(
        &self,
        mut conn: C,
        request: RegisterMessage,
        kind: FrameKind,
    ) -> SessionOutcome {
        let outcome = match self.open(&request) {
            Ok(record) => {
                Span::current().record("token", field::display(record.token.fingerprint()));
                let token = record.token.as_str().to_owned();
                let outcome = self.drive(&mut conn, &request, record, kind).await;
                if !self.store.delete(&token) {
                    debug!("Correlation record already gone at cleanup");
                }
                outcome
            }
            Err(reason) => {
                warn!(reason = %reason, "Could not open registration session");
                SessionOutcome::Rejected
            }
        };

        if outcome != SessionOutcome::Disconnected {
            if let Err(e) = conn.send(AgentMessage::Close).await {
                debug!(error = %e, "Failed to send close frame");
            }
        }
        info!(outcome = %outcome, "Registration session closed");
        outcome
    }

    /// Create the pending record, drawing a new token on collision.
    fn open(&self, request: &RegisterMessage) -> Result<CorrelationRecord, RejectReason> {
        for attempt in 1..=TOKEN_ATTEMPTS {
            let token = SessionToken::generate().map_err(|e| {
                error!(error = %e, "Failed to generate correlation token");
                RejectReason::Unavailable
            })?;
            match self.store.create(CorrelationRecord::pending(token, request)) {
                Ok(record) => return Ok(record),
                Err(StoreError::AlreadyExists) => {
                    warn!(attempt, "Correlation token collision, regenerating");
                }
                Err(e) => {
                    warn!(error = %e, "Correlation store refused new session");
                    return Err(RejectReason::Unavailable);
                }
            }
        }
        Err(RejectReason::Unavailable)
    }

    async fn drive<C: AgentConnection>(
        &self,
        conn: &mut C,
        request: &RegisterMessage,
        record: CorrelationRecord,
        kind: FrameKind,
    ) -> SessionOutcome {
        let strategy = match self.resolver.resolve(request, &record.token).await {
            Ok(strategy) => strategy,
            Err(reason) => {
                warn!(reason = %reason, "Registration rejected");
                return SessionOutcome::Rejected;
            }
        };

        let via_sso = match strategy {
            AuthStrategy::Local { user } => {
                if let Err(reason) = self.complete_locally(&record, &user) {
                    warn!(reason = %reason, "Registration rejected");
                    return SessionOutcome::Rejected;
                }
                false
            }
            AuthStrategy::Sso { redirect_url } => {
                if let Err(e) = conn.send(kind.wrap(redirect_url)).await {
                    debug!(error = %e, "Failed to send redirect");
                    return SessionOutcome::Disconnected;
                }
                info!("Awaiting SSO completion");
                true
            }
        };

        let mut watch = spawn_completion_watch(
            self.store.clone(),
            record.token.as_str().to_owned(),
            self.settings.poll_interval,
        );
        let polled = tokio::select! {
            biased;
            outcome = watch.outcome() => outcome,
            () = wait_for_hangup(conn) => {
                info!("Agent disconnected while awaiting completion");
                return SessionOutcome::Disconnected;
            }
        };

        let completed = match polled {
            PollOutcome::Completed(completed) => completed,
            PollOutcome::TimedOut => {
                info!("Registration timed out");
                return SessionOutcome::TimedOut;
            }
        };

        if via_sso && self.settings.revalidate_network_access {
            if let (Some(user), Some(network)) =
                (completed.user.as_deref(), completed.network.as_deref())
            {
                if let Err(reason) = self.resolver.authorize_network(user, network).await {
                    warn!(user = %user, reason = %reason, "SSO completion rejected");
                    return SessionOutcome::Rejected;
                }
            }
        }

        let Some(credential) = completed.credential else {
            return SessionOutcome::TimedOut;
        };
        if let Err(e) = conn.send(kind.wrap(credential)).await {
            debug!(error = %e, "Failed to relay credential");
            return SessionOutcome::Disconnected;
        }
        info!(user = completed.user.as_deref().unwrap_or("-"), "Registration completed");
        SessionOutcome::Completed
    }

    /// Zero-wait completion for an already authenticated local join.
    fn complete_locally(&self, record: &CorrelationRecord, user: &str) -> Result<(), RejectReason> {
        let credential = self.issuer.issue(record, user).map_err(|e| {
            error!(error = %e, "Failed to issue join credential");
            RejectReason::Unavailable
        })?;
        self.store
            .complete(record.token.as_str(), user, credential)
            .map(drop)
            .map_err(|e| {
                warn!(error = %e, "Failed to complete local registration");
                RejectReason::Unavailable
            })
    }
}

/// Read and validate the opener. `None` means drop the session.
async fn read_join_request<C: AgentConnection>(
    conn: &mut C,
) -> Option<(RegisterMessage, FrameKind)> {
    let (parsed, kind) = match conn.recv().await? {
        Ok(AgentMessage::Text(text)) => (
            serde_json::from_str::<RegisterMessage>(&text),
            FrameKind::Text,
        ),
        Ok(AgentMessage::Binary(bytes)) => (
            serde_json::from_slice::<RegisterMessage>(&bytes),
            FrameKind::Binary,
        ),
        Ok(AgentMessage::Close) => return None,
        Err(e) => {
            debug!(error = %e, "Agent connection failed before join request");
            return None;
        }
    };

    let request = match parsed {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed join request");
            return None;
        }
    };
    if let Err(e) = request.validate() {
        debug!(host_id = %request.host.id, error = %e, "Invalid join request");
        return None;
    }
    Some((request, kind))
}

/// Resolves once the agent closes or the transport fails.
async fn wait_for_hangup<C: AgentConnection>(conn: &mut C) {
    loop {
        match conn.recv().await {
            None | Some(Err(_)) | Some(Ok(AgentMessage::Close)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use uuid::Uuid;

    use super::connection::testing::{pair, AgentEnd};
    use super::*;
    use crate::auth::{JwtJoinIssuer, ResolverSettings, Role, StaticUserDirectory};
    use crate::completer::complete_registration;
    use crate::token::is_well_formed;

    const REDIRECT_PREFIX: &str = "https://api.example.com/api/oauth/register/";
    const JOIN_SECRET: &[u8] = b"broker-test-secret";

    struct Harness {
        broker: Arc<SessionBroker>,
        store: Arc<CorrelationStore>,
    }

    fn harness_with(store: CorrelationStore, provider: Option<&str>, revalidate: bool) -> Harness {
        let store = Arc::new(store);
        let directory = Arc::new(
            StaticUserDirectory::default()
                .with_user("alice", "secret", Role::User, &["mesh"])
                .unwrap(),
        );
        let resolver = Arc::new(AuthStrategyResolver::new(
            ResolverSettings {
                local_auth_enabled: true,
                identity_provider: provider.map(str::to_string),
                api_host: "api.example.com".into(),
            },
            directory.clone(),
            directory,
        ));
        let broker = SessionBroker::new(
            store.clone(),
            resolver,
            Arc::new(JwtJoinIssuer::new(JOIN_SECRET)),
            BrokerSettings {
                poll_interval: POLL_INTERVAL,
                revalidate_network_access: revalidate,
            },
        );
        Harness {
            broker: Arc::new(broker),
            store,
        }
    }

    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    fn harness(provider: Option<&str>) -> Harness {
        harness_with(CorrelationStore::default(), provider, true)
    }

    fn join(user: Option<&str>, password: &str, network: Option<&str>) -> String {
        json!({
            "host": {"id": Uuid::new_v4(), "name": "edge-1"},
            "password": password,
            "network": network,
            "user": user,
        })
        .to_string()
    }

    fn start(
        harness: &Harness,
        opener: AgentMessage,
    ) -> (tokio::task::JoinHandle<SessionOutcome>, AgentEnd) {
        let (conn, agent) = pair();
        agent.tx.send(opener).unwrap();
        let broker = harness.broker.clone();
        let session = tokio::spawn(async move { broker.run_session(conn).await });
        (session, agent)
    }

    async fn expect_redirect(agent: &mut AgentEnd) -> String {
        match agent.rx.recv().await {
            Some(AgentMessage::Text(url)) => url
                .strip_prefix(REDIRECT_PREFIX)
                .expect("redirect URL has the registration prefix")
                .to_string(),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn local_flow_relays_issued_credential() {
        let h = harness(Some("google"));
        let (session, mut agent) = start(
            &h,
            AgentMessage::Text(join(Some("alice"), "secret", Some("mesh"))),
        );

        assert_eq!(session.await.unwrap(), SessionOutcome::Completed);
        let frames = agent.drain().await;
        assert_eq!(frames.len(), 2, "credential then close, no redirect");
        let AgentMessage::Text(credential) = &frames[0] else {
            panic!("expected credential payload, got {:?}", frames[0]);
        };
        assert!(!credential.starts_with("https://"));
        assert_eq!(frames[1], AgentMessage::Close);

        let claims = JwtJoinIssuer::new(JOIN_SECRET).verify(credential).unwrap();
        assert_eq!(claims.user, "alice");
        assert_eq!(claims.network.as_deref(), Some("mesh"));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn sso_flow_waits_for_completer() {
        let h = harness(Some("github"));
        let (session, mut agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", Some("mesh"))));

        let token = expect_redirect(&mut agent).await;
        assert!(is_well_formed(&token));
        assert!(h.store.get(&token).is_ok());

        complete_registration(&h.store, &token, "alice", "sso-credential").unwrap();

        assert_eq!(session.await.unwrap(), SessionOutcome::Completed);
        assert_eq!(
            agent.drain().await,
            vec![
                AgentMessage::Text("sso-credential".into()),
                AgentMessage::Close
            ]
        );
        assert_eq!(h.store.get(&token), Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn uncompleted_session_times_out_within_ttl_and_one_interval() {
        let ttl = Duration::from_millis(300);
        let h = harness_with(CorrelationStore::new(ttl, 16), Some("google"), true);
        let started = Instant::now();
        let (session, mut agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", None)));
        let token = expect_redirect(&mut agent).await;

        let outcome = tokio::time::timeout(Duration::from_secs(5), session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, SessionOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= ttl, "timed out early after {elapsed:?}");
        assert!(
            elapsed < ttl + POLL_INTERVAL + Duration::from_millis(100),
            "timed out late after {elapsed:?}"
        );
        assert_eq!(agent.drain().await, vec![AgentMessage::Close]);
        assert_eq!(h.store.get(&token), Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn rejections_are_indistinguishable() {
        let with_provider = harness(Some("google"));
        let without_provider = harness(None);

        let cases = [
            (&with_provider, join(Some("alice"), "wrong", None)),
            (&with_provider, join(Some("alice"), "secret", Some("other"))),
            (&without_provider, join(None, "agent-secret", Some("mesh"))),
        ];

        for (h, opener) in cases {
            let (session, mut agent) = start(h, AgentMessage::Text(opener));
            assert_eq!(session.await.unwrap(), SessionOutcome::Rejected);
            assert_eq!(agent.drain().await, vec![AgentMessage::Close]);
            assert!(h.store.is_empty());
        }
    }

    #[tokio::test]
    async fn malformed_opener_is_dropped_silently() {
        let h = harness(Some("google"));
        let openers = [
            AgentMessage::Text("not json".into()),
            AgentMessage::Text(json!({"password": "x"}).to_string()),
            AgentMessage::Text(join(Some("alice"), "", None)),
            AgentMessage::Close,
        ];

        for opener in openers {
            let (session, mut agent) = start(&h, opener);
            assert_eq!(session.await.unwrap(), SessionOutcome::Dropped);
            assert!(agent.drain().await.is_empty());
        }
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn sso_opener_without_secret_is_dropped() {
        let h = harness(Some("google"));
        let openers = [
            AgentMessage::Text(join(None, "", Some("mesh"))),
            AgentMessage::Text(join(None, "", None)),
            AgentMessage::Binary(join(None, "", None).into_bytes()),
        ];

        for opener in openers {
            let (session, mut agent) = start(&h, opener);
            assert_eq!(session.await.unwrap(), SessionOutcome::Dropped);
            assert!(agent.drain().await.is_empty());
        }
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn agent_hangup_ends_session_and_deletes_record() {
        let h = harness(Some("google"));
        let (session, mut agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", None)));
        let token = expect_redirect(&mut agent).await;

        agent.tx.send(AgentMessage::Text("still there?".into())).unwrap();
        agent.tx.send(AgentMessage::Close).unwrap();

        assert_eq!(session.await.unwrap(), SessionOutcome::Disconnected);
        assert!(agent.rx.recv().await.is_none());
        assert_eq!(h.store.get(&token), Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn sso_completion_is_revalidated_against_network() {
        let h = harness(Some("google"));
        let (session, mut agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", Some("mesh"))));
        let token = expect_redirect(&mut agent).await;

        complete_registration(&h.store, &token, "mallory", "sso-credential").unwrap();

        assert_eq!(session.await.unwrap(), SessionOutcome::Rejected);
        assert_eq!(agent.drain().await, vec![AgentMessage::Close]);
    }

    #[tokio::test]
    async fn revalidation_can_be_switched_off() {
        let h = harness_with(CorrelationStore::default(), Some("google"), false);
        let (session, mut agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", Some("mesh"))));
        let token = expect_redirect(&mut agent).await;

        complete_registration(&h.store, &token, "mallory", "sso-credential").unwrap();

        assert_eq!(session.await.unwrap(), SessionOutcome::Completed);
        assert_eq!(
            agent.drain().await,
            vec![
                AgentMessage::Text("sso-credential".into()),
                AgentMessage::Close
            ]
        );
    }

    #[tokio::test]
    async fn replies_mirror_binary_opener() {
        let h = harness(None);
        let opener = join(Some("alice"), "secret", None).into_bytes();
        let (session, mut agent) = start(&h, AgentMessage::Binary(opener));

        assert_eq!(session.await.unwrap(), SessionOutcome::Completed);
        let frames = agent.drain().await;
        assert!(matches!(frames[0], AgentMessage::Binary(_)));
        assert_eq!(frames[1], AgentMessage::Close);
    }

    #[tokio::test]
    async fn full_store_rejects_new_session() {
        let h = harness_with(
            CorrelationStore::new(Duration::from_secs(60), 1),
            Some("google"),
            true,
        );
        let (first, mut first_agent) =
            start(&h, AgentMessage::Text(join(None, "agent-secret", None)));
        expect_redirect(&mut first_agent).await;

        let (second, mut second_agent) = start(
            &h,
            AgentMessage::Text(join(Some("alice"), "secret", None)),
        );
        assert_eq!(second.await.unwrap(), SessionOutcome::Rejected);
        assert_eq!(second_agent.drain().await, vec![AgentMessage::Close]);

        first.abort();
    }
}
