use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use leadhub_api::auth::{self, AppState, AppStateInner};
use leadhub_api::middleware::require_auth;
use leadhub_api::session::SessionClient;
use leadhub_api::{campaigns, destinatarios, listener, sender, session};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadhub=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("LEADHUB_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: LEADHUB_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       It must match the session manager's secret.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    let hook_token = std::env::var("LEADHUB_HOOK_TOKEN").unwrap_or_default();
    if hook_token.is_empty() {
        eprintln!("FATAL: LEADHUB_HOOK_TOKEN is unset.");
        eprintln!("       It must match the session manager's hook token.");
        std::process::exit(1);
    }

    let host = std::env::var("LEADHUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LEADHUB_PORT")
        .unwrap_or_else(|_| "4000".into())
        .parse()?;
    let db_path = std::env::var("LEADHUB_DB_PATH").unwrap_or_else(|_| "leadhub.db".into());
    let session_manager_url = std::env::var("LEADHUB_SESSION_MANAGER_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:4100".into());
    let auto_reply = std::env::var("LEADHUB_AUTO_REPLY")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let send_delay_ms: u64 = std::env::var("LEADHUB_SEND_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);

    // Init database
    let db = leadhub_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let session = SessionClient::new(&session_manager_url, &jwt_secret)?;
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        session,
        hook_token,
        auto_reply,
        send_delay: Duration::from_millis(send_delay_ms),
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        // Webhook from the session manager; shared-token auth, not JWT.
        .route("/api/listener/inbound", post(listener::inbound))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/campaigns", post(campaigns::create).get(campaigns::list))
        .route(
            "/api/campaigns/{campaign_id}",
            get(campaigns::get).put(campaigns::update).delete(campaigns::delete),
        )
        .route(
            "/api/campaigns/{campaign_id}/destinatarios",
            post(destinatarios::add).get(destinatarios::list),
        )
        .route(
            "/api/campaigns/{campaign_id}/destinatarios/{dest_id}",
            delete(destinatarios::remove),
        )
        .route("/api/sender/prepare", post(sender::prepare))
        .route("/api/sender/confirm", post(sender::confirm))
        .route("/api/sender/batches/{id}", get(sender::batch_status))
        .route("/api/sender/batches/{id}/cancel", post(sender::cancel))
        .route("/api/listener/messages", get(listener::list_messages))
        .route(
            "/api/listener/ia/{phone}",
            get(listener::get_ia).put(listener::set_ia),
        )
        .route("/api/leads", get(listener::list_leads))
        .route("/api/leads/{id}", put(listener::update_lead))
        .route("/api/session/connect", post(session::connect))
        .route("/api/session/status", get(session::status))
        .route("/api/session/qr", get(session::qr))
        .route("/api/session/disconnect", post(session::disconnect))
        .route("/api/session/send", post(session::send))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("LeadHub server listening on {}", addr);
    info!("Session manager at {}", session_manager_url);

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
