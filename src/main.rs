// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use host_auth_broker::{
    api::router,
    auth::StaticUserDirectory,
    config::{BrokerConfig, TlsPaths},
    context::ServerContext,
    logging,
    reaper::ExpiryReaper,
    state::AppState,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Grace period for in-flight requests once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    let config = match BrokerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(config.log_format);

    let context = match ServerContext::from_env() {
        Ok(context) => context,
        Err(e) => {
            error!(error = %e, "Invalid server context");
            std::process::exit(1);
        }
    };

    let directory = match &config.users_file {
        Some(path) => match StaticUserDirectory::load(path) {
            Ok(directory) => {
                info!(path = %path.display(), users = directory.len(), "Loaded user directory");
                directory
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to load user directory");
                std::process::exit(1);
            }
        },
        None => {
            warn!("USERS_FILE not set; local credential joins will be rejected");
            StaticUserDirectory::default()
        }
    };
    if config.join_secret.is_none() {
        warn!("JOIN_TOKEN_SECRET not set; join credentials will not verify across restarts");
    }
    if config.identity_provider.is_some() && config.master_key.is_none() {
        warn!("MASTER_KEY not set; SSO joins cannot be completed over HTTP");
    }

    let addr = config.bind_addr();
    let tls = config.tls.clone();
    info!(config = ?config, edition = ?context.edition, "Starting host auth broker");

    let state = AppState::new(config, context, Arc::new(directory));
    let shutdown = CancellationToken::new();
    let reaper = ExpiryReaper::new(state.store.clone()).with_interval(state.config.sweep_interval);
    let reaper_task = tokio::spawn(reaper.run(shutdown.clone()));

    let app = router(state);
    match tls {
        Some(paths) => serve_tls(app, addr, &paths, shutdown.clone()).await,
        None => serve_plain(app, addr, shutdown.clone()).await,
    }

    shutdown.cancel();
    let _ = reaper_task.await;
    info!("Server stopped");
}

async fn serve_tls(app: axum::Router, addr: SocketAddr, paths: &TlsPaths, shutdown: CancellationToken) {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .expect("Failed to load TLS certificate and key");

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal(shutdown).await;
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    info!(%addr, "Listening on https (docs at /docs)");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .expect("HTTPS server failed");
}

async fn serve_plain(app: axum::Router, addr: SocketAddr, shutdown: CancellationToken) {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    info!(%addr, "Listening on http (docs at /docs)");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .expect("HTTP server failed");
}

/// Resolves on Ctrl+C, SIGTERM, or when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
