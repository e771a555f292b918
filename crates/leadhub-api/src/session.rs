use std::time::Duration;

use axum::{Json, extract::State, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::Method;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use leadhub_types::api::{
    Claims, ErrorBody, QrResponse, SendMessageRequest, SendMessageResponse,
    SessionStatusResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::util::normalize_phone;

/// The bridge side can take up to 30 s to ack a send; leave headroom.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(40);

/// Minted service tokens are short-lived; they only cover one proxy call.
const SERVICE_TOKEN_TTL_MINUTES: i64 = 5;

/// HTTP client for the session-manager microservice. The hub signs its own
/// service tokens with the shared JWT secret rather than forwarding
/// end-user credentials.
#[derive(Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    jwt_secret: String,
}

impl SessionClient {
    pub fn new(base_url: &str, jwt_secret: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_secret: jwt_secret.to_string(),
        })
    }

    pub async fn connect(&self) -> Result<SessionStatusResponse, ApiError> {
        self.request(Method::POST, "/connect", None).await
    }

    pub async fn status(&self) -> Result<SessionStatusResponse, ApiError> {
        self.request(Method::GET, "/status", None).await
    }

    pub async fn qr(&self) -> Result<QrResponse, ApiError> {
        self.request(Method::GET, "/qr", None).await
    }

    pub async fn disconnect(&self) -> Result<SessionStatusResponse, ApiError> {
        self.request(Method::POST, "/disconnect", None).await
    }

    pub async fn send(&self, phone: &str, body: &str) -> Result<SendMessageResponse, ApiError> {
        let payload = serde_json::json!({ "phone": phone, "body": body });
        self.request(Method::POST, "/send", Some(payload)).await
    }

    fn service_token(&self) -> Result<String, ApiError> {
        let claims = Claims {
            sub: Uuid::nil(),
            username: "leadhub-server".into(),
            exp: (chrono::Utc::now() + chrono::Duration::minutes(SERVICE_TOKEN_TTL_MINUTES))
                .timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| ApiError::Internal(e.into()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(self.service_token()?);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| ApiError::Upstream(format!("bad upstream body: {}", e)));
        }

        // Surface the session manager's own envelope where possible.
        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.message)
            .unwrap_or_else(|_| format!("upstream returned {}", status));

        Err(match status.as_u16() {
            400 => ApiError::BadRequest(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            _ => ApiError::Upstream(message),
        })
    }
}

// -- Proxy handlers: pure pass-through to the session manager --

pub async fn connect(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.session.connect().await?))
}

pub async fn status(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.session.status().await?))
}

pub async fn qr(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.session.qr().await?))
}

pub async fn disconnect(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.session.disconnect().await?))
}

/// Manual one-off send from the dashboard, outside any campaign.
pub async fn send(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid phone: {}", req.phone)))?;
    if req.body.trim().is_empty() {
        return Err(ApiError::BadRequest("message body is empty".into()));
    }

    Ok(Json(state.session.send(&phone, &req.body).await?))
}
