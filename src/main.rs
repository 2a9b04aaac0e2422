// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relational_token_service::{
    api::router,
    auth::{JwtCodec, TokenService},
    config::{AppConfig, LogFormat, JWT_KEY_ENV},
    notify::{LogNotifier, NotificationSink, WebhookNotifier},
    state::AppState,
    storage::CredentialDatabase,
};

/// Grace period for in-flight requests and pending alerts on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => {}
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);
    info!(?config, "Loaded configuration");
    if config.dev_signing_key {
        warn!("{JWT_KEY_ENV} not set, using the development signing key");
    }

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let database = CredentialDatabase::open(&config.database_path())?;
    info!(path = %config.database_path().display(), "Opened credential database");

    let codec = JwtCodec::new(config.jwt_algorithm, &config.jwt_key)?
        .with_ttls(config.access_ttl, config.refresh_ttl);

    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook {
        Some(url) => {
            info!(url = %url, "Origin alerts delivered by webhook");
            Arc::new(WebhookNotifier::new(url.clone(), config.policy.notify_timeout)?)
        }
        None => {
            info!("Origin alerts written to the log");
            Arc::new(LogNotifier)
        }
    };

    let service = TokenService::new(Arc::new(codec), Arc::new(database), notifier)
        .with_policy(config.policy);
    let state = AppState::new(service)
        .with_forwarded_for(config.trust_forwarded_for)
        .with_request_timeout(config.request_timeout);
    let service = Arc::clone(&state.service);
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let shutdown = CancellationToken::new();
    let handle = Handle::new();
    tokio::spawn(watch_signals(shutdown.clone()));
    tokio::spawn({
        let shutdown = shutdown.clone();
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            info!("Shutting down");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let addr = config.bind_addr;
    match &config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert, &tls.key).await?;
            info!("Relational token service listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await?;
        }
        None => {
            info!("Relational token service listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await?;
        }
    }

    // Server stopped on its own; release the signal watcher
    shutdown.cancel();

    let notifications = service.notifications();
    notifications.close();
    if tokio::time::timeout(SHUTDOWN_GRACE, notifications.wait())
        .await
        .is_err()
    {
        warn!(pending = notifications.len(), "Dropping undelivered origin alerts");
    }
    info!("Shutdown complete");
    Ok(())
}
