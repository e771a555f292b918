use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadhub_db::models::LeadRow;
use leadhub_types::api::{
    Claims, IaFlagResponse, InboundMessageResponse, LeadResponse, LeadStatus, SetIaFlagRequest,
    UpdateLeadRequest,
};
use leadhub_types::events::{HOOK_TOKEN_HEADER, HookEvent};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::util::{normalize_phone, parse_sqlite_ts};

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub phone: Option<String>,
}

fn default_limit() -> u32 {
    50
}

/// Webhook endpoint the session manager pushes events into. Authenticated
/// by shared token, not by a user JWT.
pub async fn inbound(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<HookEvent>,
) -> ApiResult<impl IntoResponse> {
    let token = headers
        .get(HOOK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if token != state.hook_token {
        return Err(ApiError::Unauthorized);
    }

    match event {
        HookEvent::MessageReceived {
            phone,
            body,
            wa_message_id,
            received_at,
        } => {
            handle_inbound_message(&state, phone, body, wa_message_id, received_at).await?;
        }
        HookEvent::StatusChanged { state: s, connected } => {
            info!("session status update: {} (connected={})", s, connected);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn handle_inbound_message(
    state: &AppState,
    phone: String,
    body: String,
    wa_message_id: Option<String>,
    received_at: DateTime<Utc>,
) -> Result<(), ApiError> {
    state.db.insert_inbound(
        &Uuid::new_v4().to_string(),
        &phone,
        &body,
        wa_message_id.as_deref(),
        &received_at.to_rfc3339(),
    )?;

    let replied = state.db.mark_replied_by_phone(&phone)?;
    if replied > 0 {
        debug!("{}: {} destinatario(s) marked replied", phone, replied);
    }

    // First inbound from an unknown phone becomes a lead, attributed to the
    // owner of whichever campaign targeted it.
    let owner = state.db.find_destinatario_owner(&phone)?;
    let created = state.db.upsert_lead(
        &Uuid::new_v4().to_string(),
        owner.as_deref(),
        &phone,
        None,
        "inbound",
    )?;
    if created {
        info!("new lead captured from {}", phone);
    }

    // The IA flag gates the canned auto-reply, per phone.
    if state.db.is_ia_enabled(&phone)? {
        if let Some(reply) = state.auto_reply.clone() {
            let session = state.session.clone();
            let to = phone.clone();
            tokio::spawn(async move {
                if let Err(e) = session.send(&to, &reply).await {
                    warn!("auto-reply to {} failed: {}", to, e);
                }
            });
        }
    }

    Ok(())
}

pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let phone = match query.phone.as_deref() {
        Some(raw) => Some(
            normalize_phone(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid phone: {}", raw)))?,
        ),
        None => None,
    };

    let rows = state
        .db
        .list_inbound(phone.as_deref(), query.limit.min(200))?;

    let messages: Vec<InboundMessageResponse> = rows
        .into_iter()
        .map(|row| InboundMessageResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt inbound id '{}': {}", row.id, e);
                Uuid::default()
            }),
            phone: row.phone,
            body: row.body,
            wa_message_id: row.wa_message_id,
            received_at: parse_sqlite_ts(&row.received_at),
        })
        .collect();

    Ok(Json(messages))
}

pub async fn get_ia(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let phone = normalize_phone(&phone)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid phone: {}", phone)))?;

    let flag = state.db.get_ia_flag(&phone)?;
    Ok(Json(match flag {
        Some(row) => IaFlagResponse {
            phone: row.phone,
            enabled: row.enabled,
            updated_at: Some(parse_sqlite_ts(&row.updated_at)),
        },
        None => IaFlagResponse {
            phone,
            enabled: false,
            updated_at: None,
        },
    }))
}

pub async fn set_ia(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<SetIaFlagRequest>,
) -> ApiResult<impl IntoResponse> {
    let phone = normalize_phone(&phone)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid phone: {}", phone)))?;

    state.db.set_ia_flag(&phone, req.enabled)?;
    info!("IA flag for {} -> {}", phone, req.enabled);

    Ok(Json(IaFlagResponse {
        phone,
        enabled: req.enabled,
        updated_at: Some(Utc::now()),
    }))
}

pub async fn list_leads(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.db.list_leads(&claims.sub.to_string())?;
    let leads: Vec<LeadResponse> = rows.into_iter().map(lead_response).collect();
    Ok(Json(leads))
}

pub async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateLeadRequest>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.db.update_lead(
        &id.to_string(),
        &claims.sub.to_string(),
        req.name.as_deref(),
        req.status,
    )?;
    if !updated {
        return Err(ApiError::NotFound("lead not found".into()));
    }

    let row = state
        .db
        .get_lead(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound("lead not found".into()))?;
    Ok(Json(lead_response(row)))
}

fn lead_response(row: LeadRow) -> LeadResponse {
    LeadResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt lead id '{}': {}", row.id, e);
            Uuid::default()
        }),
        phone: row.phone,
        name: row.name,
        source: row.source,
        status: LeadStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt lead status '{}' on '{}'", row.status, row.id);
            LeadStatus::New
        }),
        created_at: parse_sqlite_ts(&row.created_at),
    }
}
