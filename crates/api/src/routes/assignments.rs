//! Assignment routes: the HTTP surface of the consistency engine.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use domain::models::site::RosterEntry;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// Request body for assigning a unit to a site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignEquipmentRequest {
    pub equipment_id: Uuid,
}

/// Request body for moving a unit to another site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignEquipmentRequest {
    pub to_site_id: Uuid,
}

/// Assign a unit to a site.
///
/// POST /api/v1/sites/:site_id/equipment
///
/// Admin or the site's chief.
pub async fn assign_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<Uuid>,
    Json(request): Json<AssignEquipmentRequest>,
) -> Result<(StatusCode, Json<RosterEntry>), ApiError> {
    let engine = state.assignment_engine();
    let entry = engine
        .assign(&current.principal, site_id, request.equipment_id, Utc::now())
        .await?;

    tracing::info!(
        %site_id,
        equipment_id = %request.equipment_id,
        entry_id = %entry.id,
        user_id = %current.principal.id,
        "Equipment assigned"
    );

    Ok((StatusCode::CREATED, Json(entry)))
}

/// Return a unit from a site, closing the given roster entry.
///
/// DELETE /api/v1/sites/:site_id/equipment/:entry_id
///
/// Admin or the site's chief.
pub async fn return_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((site_id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RosterEntry>, ApiError> {
    let engine = state.assignment_engine();
    let entry = engine
        .return_equipment(&current.principal, site_id, entry_id, Utc::now())
        .await?;

    tracing::info!(
        %site_id,
        %entry_id,
        equipment_id = %entry.equipment_id,
        user_id = %current.principal.id,
        "Equipment returned"
    );

    Ok(Json(entry))
}

/// Move a unit to another site.
///
/// POST /api/v1/equipment/:equipment_id/reassign
///
/// A return followed by an assign; the caller must be allowed to do
/// both. The unit is briefly unassigned between the two steps.
pub async fn reassign_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(equipment_id): Path<Uuid>,
    Json(request): Json<ReassignEquipmentRequest>,
) -> Result<Json<RosterEntry>, ApiError> {
    let engine = state.assignment_engine();
    let entry = engine
        .reassign(
            &current.principal,
            equipment_id,
            request.to_site_id,
            Utc::now(),
        )
        .await?;

    tracing::info!(
        %equipment_id,
        to_site_id = %request.to_site_id,
        entry_id = %entry.id,
        user_id = %current.principal.id,
        "Equipment reassigned"
    );

    Ok(Json(entry))
}
