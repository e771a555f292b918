use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use leadhub_db::models::{DestinatarioRow, EnvioRow};
use leadhub_types::api::{
    BatchStatusResponse, Claims, ConfirmSendRequest, DestinatarioStatus, EnvioPreview,
    EnvioResponse, EnvioStatus, PrepareSendRequest, PrepareSendResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::util::{parse_sqlite_ts, render_template};

/// Phase one: resolve the campaign's pending recipients, render each
/// message, and store the batch for operator review. Nothing is sent yet.
pub async fn prepare(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PrepareSendRequest>,
) -> ApiResult<impl IntoResponse> {
    let owner = claims.sub.to_string();
    let campaign = state
        .db
        .get_campaign(&req.campaign_id.to_string(), &owner)?
        .ok_or_else(|| ApiError::NotFound("campaign not found".into()))?;

    if campaign.status == "archived" {
        return Err(ApiError::Conflict("campaign is archived".into()));
    }

    let pending = state.db.pending_destinatarios(&campaign.id)?;
    if pending.is_empty() {
        return Err(ApiError::Conflict(
            "campaign has no pending destinatarios".into(),
        ));
    }

    let batch_id = Uuid::new_v4();
    let (rows, previews) = render_batch(&campaign.message, &pending);
    state
        .db
        .insert_envio_batch(&batch_id.to_string(), &campaign.id, &rows)?;

    info!(
        "batch {} prepared: {} envios for campaign '{}'",
        batch_id,
        previews.len(),
        campaign.name
    );

    Ok((
        StatusCode::CREATED,
        Json(PrepareSendResponse {
            batch_id,
            campaign_id: req.campaign_id,
            envios: previews,
        }),
    ))
}

/// Phase two: dispatch a prepared batch in the background. Returns 202 with
/// the batch snapshot; progress is polled via `GET /batches/{id}`.
pub async fn confirm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ConfirmSendRequest>,
) -> ApiResult<impl IntoResponse> {
    let batch_id = req.batch_id.to_string();
    let envios = authorize_batch(&state, &batch_id, &claims)?;

    if envios.is_empty() {
        return Err(ApiError::Conflict(
            "batch already dispatched or cancelled".into(),
        ));
    }

    info!("batch {} confirmed: dispatching {} envios", batch_id, envios.len());
    tokio::spawn(dispatch_batch(state.clone(), batch_id.clone(), envios));

    let snapshot = batch_snapshot(&state, req.batch_id)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authorize_batch(&state, &batch_id.to_string(), &claims)?;
    Ok(Json(batch_snapshot(&state, batch_id)?))
}

/// Cancel whatever is still waiting in the batch. Idempotent; envios the
/// dispatcher already picked up keep their outcome.
pub async fn cancel(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    authorize_batch(&state, &batch_id.to_string(), &claims)?;

    let cancelled = state.db.cancel_batch(&batch_id.to_string())?;
    info!("batch {}: {} envios cancelled", batch_id, cancelled);

    Ok(Json(batch_snapshot(&state, batch_id)?))
}

/// Batch lookup + tenant check. Returns the still-prepared envios.
fn authorize_batch(
    state: &AppState,
    batch_id: &str,
    claims: &Claims,
) -> Result<Vec<EnvioRow>, ApiError> {
    let (_, owner_id) = state
        .db
        .batch_header(batch_id)?
        .ok_or_else(|| ApiError::NotFound("batch not found".into()))?;
    if owner_id != claims.sub.to_string() {
        // Another tenant's batch looks like a missing one.
        return Err(ApiError::NotFound("batch not found".into()));
    }
    Ok(state.db.prepared_envios(batch_id)?)
}

/// Render the batch rows and operator previews for a set of recipients.
fn render_batch(
    message: &str,
    pending: &[DestinatarioRow],
) -> (Vec<(String, String, String, String)>, Vec<EnvioPreview>) {
    let mut rows = Vec::with_capacity(pending.len());
    let mut previews = Vec::with_capacity(pending.len());

    for dest in pending {
        let envio_id = Uuid::new_v4();
        let body = render_template(message, &dest.name, &dest.phone);
        rows.push((
            envio_id.to_string(),
            dest.id.clone(),
            dest.phone.clone(),
            body.clone(),
        ));
        previews.push(EnvioPreview {
            id: envio_id,
            phone: dest.phone.clone(),
            name: dest.name.clone(),
            body,
        });
    }

    (rows, previews)
}

/// Background dispatch: one envio at a time through the session manager,
/// paced by the configured delay so the account does not get flagged.
async fn dispatch_batch(state: AppState, batch_id: String, envios: Vec<EnvioRow>) {
    for envio in envios {
        let claimed = match state.db.claim_envio(&envio.id) {
            Ok(c) => c,
            Err(e) => {
                warn!("batch {}: claim failed for envio {}: {}", batch_id, envio.id, e);
                continue;
            }
        };
        if !claimed {
            // Cancelled between confirm and pickup.
            continue;
        }

        let outcome = state.session.send(&envio.phone, &envio.body).await;
        let result = match outcome {
            Ok(_) => {
                state
                    .db
                    .set_envio_status(&envio.id, EnvioStatus::Sent, None)
                    .and_then(|_| {
                        state
                            .db
                            .set_destinatario_status(&envio.destinatario_id, DestinatarioStatus::Sent)
                    })
            }
            Err(e) => {
                warn!("batch {}: send to {} failed: {}", batch_id, envio.phone, e);
                state
                    .db
                    .set_envio_status(&envio.id, EnvioStatus::Failed, Some(&e.to_string()))
                    .and_then(|_| {
                        state.db.set_destinatario_status(
                            &envio.destinatario_id,
                            DestinatarioStatus::Failed,
                        )
                    })
            }
        };
        if let Err(e) = result {
            warn!("batch {}: status update failed for {}: {}", batch_id, envio.id, e);
        }

        tokio::time::sleep(state.send_delay).await;
    }

    info!("batch {} dispatch finished", batch_id);
}

fn batch_snapshot(state: &AppState, batch_id: Uuid) -> Result<BatchStatusResponse, ApiError> {
    let (campaign_id, _) = state
        .db
        .batch_header(&batch_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("batch not found".into()))?;
    let (total, sent, failed, pending) = state.db.batch_counts(&batch_id.to_string())?;
    let envios = state
        .db
        .list_envios(&batch_id.to_string())?
        .into_iter()
        .map(envio_response)
        .collect();

    Ok(BatchStatusResponse {
        batch_id,
        campaign_id: campaign_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt campaign_id '{}' on batch '{}': {}", campaign_id, batch_id, e);
            Uuid::default()
        }),
        total,
        sent,
        failed,
        pending,
        envios,
    })
}

fn envio_response(row: EnvioRow) -> EnvioResponse {
    EnvioResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt envio id '{}': {}", row.id, e);
            Uuid::default()
        }),
        phone: row.phone,
        body: row.body,
        status: EnvioStatus::parse(&row.status).unwrap_or_else(|| {
            warn!("Corrupt envio status '{}' on '{}'", row.status, row.id);
            EnvioStatus::Failed
        }),
        error: row.error,
        sent_at: row.sent_at.as_deref().map(parse_sqlite_ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dest(id: &str, phone: &str, name: &str) -> DestinatarioRow {
        DestinatarioRow {
            id: id.into(),
            campaign_id: "c1".into(),
            phone: phone.into(),
            name: name.into(),
            status: "pending".into(),
            created_at: "2026-08-07 10:00:00".into(),
        }
    }

    #[test]
    fn render_batch_personalizes_each_recipient() {
        let pending = vec![
            dest("d1", "5215511111111", "Ana"),
            dest("d2", "5215522222222", "Luis"),
        ];

        let (rows, previews) = render_batch("Hola {{nombre}}!", &pending);

        assert_eq!(rows.len(), 2);
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].body, "Hola Ana!");
        assert_eq!(previews[1].body, "Hola Luis!");
        // Row carries the destinatario it came from.
        assert_eq!(rows[0].1, "d1");
        assert_eq!(rows[0].2, "5215511111111");
        // Preview ids match the stored envio ids.
        assert_eq!(rows[0].0, previews[0].id.to_string());
    }
}
