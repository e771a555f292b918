use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use leadhub_db::models::DestinatarioRow;
use leadhub_types::api::{
    AddDestinatarioRequest, Claims, DestinatarioResponse, DestinatarioStatus,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::util::normalize_phone;

pub async fn add(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddDestinatarioRequest>,
) -> ApiResult<impl IntoResponse> {
    // Ownership gate before touching the list.
    state
        .db
        .get_campaign(&campaign_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;

    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid phone: {}", req.phone)))?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("destinatario name is empty".into()));
    }

    let (inserted, row) = state.db.add_destinatario(
        &Uuid::new_v4().to_string(),
        &campaign_id.to_string(),
        &phone,
        name,
    )?;

    let status = if inserted {
        StatusCode::CREATED
    } else {
        // Duplicate phone on the same campaign: idempotent no-op.
        StatusCode::OK
    };
    Ok((status, Json(destinatario_response(row, inserted))))
}

pub async fn list(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .get_campaign(&campaign_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;

    let rows = state.db.list_destinatarios(&campaign_id.to_string())?;
    let list: Vec<DestinatarioResponse> = rows
        .into_iter()
        .map(|row| destinatario_response(row, false))
        .collect();

    Ok(Json(list))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((campaign_id, dest_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .get_campaign(&campaign_id.to_string(), &claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;

    let deleted = state
        .db
        .delete_destinatario(&campaign_id.to_string(), &dest_id.to_string())?;
    if !deleted {
        return Err(ApiError::NotFound("destinatario not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn destinatario_response(row: DestinatarioRow, inserted: bool) -> DestinatarioResponse {
    DestinatarioResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt destinatario id '{}': {}", row.id, e);
            Uuid::default()
        }),
        campaign_id: row.campaign_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt campaign_id '{}' on destinatario '{}': {}", row.campaign_id, row.id, e);
            Uuid::default()
        }),
        phone: row.phone,
        name: row.name,
        status: DestinatarioStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt destinatario status '{}' on '{}'", row.status, row.id);
            DestinatarioStatus::Pending
        }),
        inserted,
    }
}
