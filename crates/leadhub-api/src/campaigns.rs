use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use leadhub_db::models::CampaignRow;
use leadhub_types::api::{
    CampaignResponse, CampaignStatus, Claims, CreateCampaignRequest, UpdateCampaignRequest,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::util::parse_sqlite_ts;

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() || name.len() > 120 {
        return Err(ApiError::BadRequest(
            "campaign name must be 1-120 characters".into(),
        ));
    }
    if req.message.trim().is_empty() {
        return Err(ApiError::BadRequest("campaign message is empty".into()));
    }

    let id = Uuid::new_v4();
    let owner = claims.sub.to_string();
    state
        .db
        .create_campaign(&id.to_string(), &owner, name, &req.message)?;

    let row = state
        .db
        .get_campaign(&id.to_string(), &owner)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("campaign vanished after insert")))?;

    Ok((StatusCode::CREATED, Json(campaign_response(row, 0))))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.db.list_campaigns(&claims.sub.to_string())?;

    let campaigns: Vec<CampaignResponse> = rows
        .into_iter()
        .map(|(row, count)| campaign_response(row, count))
        .collect();

    Ok(Json(campaigns))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .db
        .get_campaign(&id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;
    let count = state.db.count_destinatarios(&row.id)?;

    Ok(Json(campaign_response(row, count)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCampaignRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(name) = req.name.as_deref() {
        if name.trim().is_empty() || name.len() > 120 {
            return Err(ApiError::BadRequest(
                "campaign name must be 1-120 characters".into(),
            ));
        }
    }
    if let Some(message) = req.message.as_deref() {
        if message.trim().is_empty() {
            return Err(ApiError::BadRequest("campaign message is empty".into()));
        }
    }

    let owner = claims.sub.to_string();
    let updated = state.db.update_campaign(
        &id.to_string(),
        &owner,
        req.name.as_deref().map(str::trim),
        req.message.as_deref(),
        req.status,
    )?;
    if !updated {
        return Err(ApiError::NotFound("campaign not found".into()));
    }

    let row = state
        .db
        .get_campaign(&id.to_string(), &owner)?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;
    let count = state.db.count_destinatarios(&row.id)?;

    Ok(Json(campaign_response(row, count)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state
        .db
        .delete_campaign(&id.to_string(), &claims.sub.to_string())?;
    if !deleted {
        return Err(ApiError::NotFound("campaign not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn campaign_response(row: CampaignRow, destinatario_count: u64) -> CampaignResponse {
    CampaignResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt campaign id '{}': {}", row.id, e);
            Uuid::default()
        }),
        name: row.name,
        message: row.message,
        status: CampaignStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt campaign status '{}' on '{}'", row.status, row.id);
            CampaignStatus::Draft
        }),
        destinatario_count,
        created_at: parse_sqlite_ts(&row.created_at),
        updated_at: parse_sqlite_ts(&row.updated_at),
    }
}
