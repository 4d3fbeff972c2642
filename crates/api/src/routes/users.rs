//! User management routes.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use domain::models::user::{Role, UpdateUserRequest, UserResponse};
use persistence::repositories::UserRepository;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// Update the caller's own profile.
///
/// PUT /api/v1/users/:user_id
///
/// A user may only update their own name.
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if current.principal.id != user_id {
        return Err(ApiError::Forbidden(
            "You can only update your own profile".to_string(),
        ));
    }

    request.validate()?;

    let repo = UserRepository::new(state.pool.clone());
    let user = repo.update_name(user_id, &request.name).await?;

    Ok(Json(user.into()))
}

/// Request body for a role change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRoleRequest {
    pub role: Role,
}

/// Change a user's role.
///
/// PUT /api/v1/users/:user_id/role
///
/// Admin only.
pub async fn set_role(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if !current.principal.role.is_admin() {
        return Err(ApiError::Forbidden(
            "Only administrators can change roles".to_string(),
        ));
    }

    let repo = UserRepository::new(state.pool.clone());
    let user = repo.set_role(user_id, request.role).await?;

    tracing::info!(
        admin_id = %current.principal.id,
        user_id = %user.id,
        role = %user.role,
        "User role changed"
    );

    Ok(Json(user.into()))
}
