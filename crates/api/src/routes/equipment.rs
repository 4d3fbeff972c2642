//! Equipment inventory routes.
//!
//! The inventory is global: any authenticated principal may read it.
//! Mutations are Admin-only, and the identifier is immutable after
//! creation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain::models::equipment::{
    CreateEquipmentRequest, Equipment, EquipmentDetail, EquipmentSummary, UpdateEquipmentRequest,
};
use domain::policy::{self, Action};
use persistence::repositories::EquipmentRepository;
use shared::pagination::{decode_cursor, encode_cursor};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// Query parameters for the inventory listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEquipmentQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// Paginated inventory response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEquipmentResponse {
    pub data: Vec<EquipmentSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// List the inventory, newest first.
///
/// GET /api/v1/equipment
pub async fn list_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListEquipmentQuery>,
) -> Result<Json<ListEquipmentResponse>, ApiError> {
    policy::authorize(&current.principal, &Action::ListEquipment)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let after = query
        .cursor
        .as_deref()
        .map(decode_cursor)
        .transpose()
        .map_err(|_| ApiError::Validation("Invalid cursor".to_string()))?;

    let repo = EquipmentRepository::new(state.pool.clone());
    let data = repo.list_page(limit, after).await?;

    // A full page means there may be more; the cursor points past its
    // last row.
    let next_cursor = if data.len() as i64 == limit {
        data.last().map(|e| encode_cursor(e.created_at, e.id))
    } else {
        None
    };

    Ok(Json(ListEquipmentResponse { data, next_cursor }))
}

/// Create a unit.
///
/// POST /api/v1/equipment
///
/// Admin only.
pub async fn create_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateEquipmentRequest>,
) -> Result<(StatusCode, Json<Equipment>), ApiError> {
    policy::authorize(&current.principal, &Action::CreateEquipment)?;

    request.validate()?;

    let repo = EquipmentRepository::new(state.pool.clone());
    let equipment = repo.create(&request, current.principal.id).await?;

    tracing::info!(
        equipment_id = %equipment.id,
        identifier = %equipment.identifier,
        "Equipment created"
    );

    Ok((StatusCode::CREATED, Json(equipment)))
}

/// Get a unit with its usage history.
///
/// GET /api/v1/equipment/:equipment_id
pub async fn get_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(equipment_id): Path<Uuid>,
) -> Result<Json<EquipmentDetail>, ApiError> {
    policy::authorize(&current.principal, &Action::ViewEquipmentDetail)?;

    let repo = EquipmentRepository::new(state.pool.clone());
    let equipment = repo
        .find_by_id(equipment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Equipment not found".to_string()))?;

    let current_site_name = repo.current_site_name(&equipment).await?;
    let usage_history = repo.usage_history(equipment_id).await?;

    Ok(Json(EquipmentDetail {
        equipment,
        current_site_name,
        usage_history,
    }))
}

/// Update a unit.
///
/// PUT /api/v1/equipment/:equipment_id
///
/// Admin only. Setting `Maintenance`/`OutOfService` while the unit is at
/// a site does not auto-return it; the unit stays on the roster until an
/// explicit return.
pub async fn update_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(equipment_id): Path<Uuid>,
    Json(patch): Json<UpdateEquipmentRequest>,
) -> Result<Json<Equipment>, ApiError> {
    policy::authorize(&current.principal, &Action::UpdateEquipment)?;

    patch.validate()?;
    patch.check_status().map_err(ApiError::Validation)?;

    let repo = EquipmentRepository::new(state.pool.clone());
    let equipment = repo.update(equipment_id, &patch).await?;

    Ok(Json(equipment))
}

/// Delete response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEquipmentResponse {
    pub deleted: bool,
    /// Whether the unit had to be force-returned first.
    pub was_returned: bool,
}

/// Delete a unit.
///
/// DELETE /api/v1/equipment/:equipment_id
///
/// Admin only. An assigned unit is force-returned first, so no dangling
/// roster entry survives the deletion.
pub async fn delete_equipment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(equipment_id): Path<Uuid>,
) -> Result<Json<DeleteEquipmentResponse>, ApiError> {
    policy::authorize(&current.principal, &Action::DeleteEquipment)?;

    let engine = state.assignment_engine();
    let was_returned = engine
        .force_return_equipment(&current.principal, equipment_id, Utc::now())
        .await?;

    let repo = EquipmentRepository::new(state.pool.clone());
    repo.delete(equipment_id).await?;

    tracing::info!(
        %equipment_id,
        was_returned,
        admin_id = %current.principal.id,
        "Equipment deleted"
    );

    Ok(Json(DeleteEquipmentResponse {
        deleted: true,
        was_returned,
    }))
}
