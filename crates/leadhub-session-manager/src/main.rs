mod hook;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    Router,
    routing::{get, post},
};
use chrono::TimeDelta;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use leadhub_session::manager::SessionManager;
use leadhub_session::provider::ProviderConfig;

use crate::routes::AppState;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "leadhub_session_manager=debug,leadhub_session=debug,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("LEADHUB_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: LEADHUB_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       This must match the central hub's secret.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    let hook_token = std::env::var("LEADHUB_HOOK_TOKEN").unwrap_or_default();
    if hook_token.is_empty() {
        eprintln!("FATAL: LEADHUB_HOOK_TOKEN is unset.");
        eprintln!("       This must match the central hub's hook token.");
        std::process::exit(1);
    }

    let host = std::env::var("LEADHUB_SM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LEADHUB_SM_PORT")
        .unwrap_or_else(|_| "4100".into())
        .parse()?;
    let hub_url =
        std::env::var("LEADHUB_HUB_URL").unwrap_or_else(|_| "http://127.0.0.1:4000".into());

    let provider_kind = std::env::var("LEADHUB_PROVIDER").unwrap_or_else(|_| "bridge".into());
    let bridge_cmd = std::env::var("LEADHUB_BRIDGE_CMD")
        .unwrap_or_else(|_| "node whatsapp-bridge/index.js".into());
    let session_dir: PathBuf = std::env::var("LEADHUB_SESSION_DIR")
        .unwrap_or_else(|_| "./wa-session".into())
        .into();
    let qr_max_age_secs: i64 = std::env::var("LEADHUB_QR_MAX_AGE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let provider_config = ProviderConfig {
        kind: provider_kind,
        bridge_cmd,
        session_dir,
    };

    // One session per process: manager + hook forwarder + QR supervisor.
    let (hook_tx, hook_rx) = mpsc::channel(256);
    let manager = SessionManager::new(
        provider_config,
        TimeDelta::seconds(qr_max_age_secs),
        hook_tx,
    );

    tokio::spawn(hook::run_hook_forwarder(hook_rx, hub_url.clone(), hook_token));
    tokio::spawn(manager.clone().run_qr_refresh());

    let state = AppState {
        manager,
        jwt_secret,
    };

    let app = Router::new()
        .route("/connect", post(routes::connect))
        .route("/status", get(routes::status))
        .route("/qr", get(routes::qr))
        .route("/send", post(routes::send))
        .route("/disconnect", post(routes::disconnect))
        .route("/health", get(routes::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("LeadHub session manager listening on {}", addr);
    info!("Forwarding events to hub at {}", hub_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
