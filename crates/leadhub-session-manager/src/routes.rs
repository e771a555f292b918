use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::info;

use leadhub_session::manager::{SessionError, SessionManager};
use leadhub_types::api::{
    Claims, ErrorBody, QrResponse, SendMessageRequest, SendMessageResponse,
    SessionStatusResponse,
};

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager,
    pub jwt_secret: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn envelope(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: true,
            code: code.to_string(),
            message: message.into(),
        }),
    )
}

fn session_error(e: SessionError) -> ApiError {
    match e {
        SessionError::AlreadyActive | SessionError::NotReady(_) => {
            envelope(StatusCode::CONFLICT, "conflict", e.to_string())
        }
        SessionError::Provider(source) => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("session provider failed: {}", source),
        ),
    }
}

// ── Auth helper ─────────────────────────────────────────────────────────

fn extract_claims(headers: &HeaderMap, jwt_secret: &str) -> Result<Claims, ApiError> {
    let unauthorized = || envelope(StatusCode::UNAUTHORIZED, "unauthorized", "authentication required");

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    let token_data = jsonwebtoken::decode::<Claims>(
        auth_header,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map_err(|_| unauthorized())?;

    Ok(token_data.claims)
}

// ── Handlers ────────────────────────────────────────────────────────────

/// POST /connect — start the WhatsApp session. 409 while one is already
/// starting or live.
pub async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;

    let status = state.manager.connect().await.map_err(session_error)?;
    info!("session connect requested by {}", claims.username);

    Ok(Json(SessionStatusResponse::from(&status)))
}

/// GET /status — current session status; the dashboard polls this.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    extract_claims(&headers, &state.jwt_secret)?;

    let status = state.manager.status().await;
    Ok(Json(SessionStatusResponse::from(&status)))
}

/// GET /qr — the pending login QR, base64-encoded for the dashboard.
pub async fn qr(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    extract_claims(&headers, &state.jwt_secret)?;

    let (payload, issued_at) = state.manager.qr().await.ok_or_else(|| {
        envelope(StatusCode::NOT_FOUND, "not_found", "no QR code pending")
    })?;

    Ok(Json(QrResponse {
        qr: B64.encode(payload.as_bytes()),
        issued_at,
    }))
}

/// POST /send — deliver one message through the live session.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    extract_claims(&headers, &state.jwt_secret)?;

    if req.phone.is_empty() || !req.phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(envelope(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("invalid phone: {}", req.phone),
        ));
    }
    if req.body.trim().is_empty() {
        return Err(envelope(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "message body is empty",
        ));
    }

    let wa_message_id = state
        .manager
        .send_text(&req.phone, &req.body)
        .await
        .map_err(session_error)?;

    Ok(Json(SendMessageResponse { wa_message_id }))
}

/// POST /disconnect — logout and destroy the client.
pub async fn disconnect(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;

    let status = state.manager.disconnect().await;
    info!("session disconnected by {}", claims.username);

    Ok(Json(SessionStatusResponse::from(&status)))
}

/// GET /health — liveness, no auth.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
