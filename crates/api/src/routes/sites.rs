//! Site management routes.
//!
//! Every mutation consults the authorization policy first; the list
//! endpoint applies the policy's visibility filter.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use domain::models::site::{
    CreateSiteRequest, Site, SiteDetail, SiteSummary, UpdateSiteRequest,
};
use domain::policy::{self, Action};
use domain::stores::StoreError;
use persistence::repositories::SiteRepository;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;

/// List response wrapper.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSitesResponse {
    pub data: Vec<SiteSummary>,
    pub count: usize,
}

/// List sites visible to the caller.
///
/// GET /api/v1/sites
pub async fn list_sites(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<ListSitesResponse>, ApiError> {
    let visibility = policy::site_visibility(&current.principal);

    let repo = SiteRepository::new(state.pool.clone());
    let sites = repo.list(visibility).await?;
    let count = sites.len();

    Ok(Json(ListSitesResponse { data: sites, count }))
}

/// Create a site.
///
/// POST /api/v1/sites
///
/// Admin only.
pub async fn create_site(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<CreateSiteRequest>,
) -> Result<(StatusCode, Json<Site>), ApiError> {
    policy::authorize(&current.principal, &Action::CreateSite)?;

    request.validate()?;
    request.check_dates().map_err(ApiError::Validation)?;

    let repo = SiteRepository::new(state.pool.clone());
    let site = repo
        .create(&request, current.principal.id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => {
                ApiError::Validation("The designated chief does not exist".to_string())
            }
            other => ApiError::from(other),
        })?;

    tracing::info!(site_id = %site.id, chief_id = %site.chief_id, "Site created");

    Ok((StatusCode::CREATED, Json(site)))
}

/// Get a site with its roster.
///
/// GET /api/v1/sites/:site_id
pub async fn get_site(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<Uuid>,
) -> Result<Json<SiteDetail>, ApiError> {
    let repo = SiteRepository::new(state.pool.clone());
    let site = repo
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Site not found".to_string()))?;

    policy::authorize(&current.principal, &Action::ViewSite(&site))?;

    let chief_name = repo.chief_name(&site).await?;
    let equipment = repo.roster(site_id).await?;

    Ok(Json(SiteDetail {
        site,
        chief_name,
        equipment,
    }))
}

/// Update a site.
///
/// PUT /api/v1/sites/:site_id
///
/// Admin for any field; the site's chief for status and progress only.
pub async fn update_site(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<Uuid>,
    Json(patch): Json<UpdateSiteRequest>,
) -> Result<Json<Site>, ApiError> {
    let repo = SiteRepository::new(state.pool.clone());
    let site = repo
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Site not found".to_string()))?;

    policy::authorize(
        &current.principal,
        &Action::UpdateSite {
            site: &site,
            patch: &patch,
        },
    )?;

    patch.validate()?;
    if patch.is_empty() {
        return Err(ApiError::Validation("No fields to update".to_string()));
    }

    let updated = repo.update(site_id, &patch).await?;

    Ok(Json(updated))
}

/// Delete response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSiteResponse {
    pub deleted: bool,
    /// How many units were force-returned before deletion.
    pub returned_equipment: usize,
}

/// Delete a site.
///
/// DELETE /api/v1/sites/:site_id
///
/// Admin only. All open roster entries are force-returned first; the
/// deletion is refused if any forced return fails.
pub async fn delete_site(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(site_id): Path<Uuid>,
) -> Result<Json<DeleteSiteResponse>, ApiError> {
    let repo = SiteRepository::new(state.pool.clone());
    let site = repo
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Site not found".to_string()))?;

    policy::authorize(&current.principal, &Action::DeleteSite(&site))?;

    let engine = state.assignment_engine();
    let returned_equipment = engine
        .force_return_site(&current.principal, site_id, Utc::now())
        .await?;

    repo.delete(site_id).await?;

    tracing::info!(
        %site_id,
        returned_equipment,
        admin_id = %current.principal.id,
        "Site deleted"
    );

    Ok(Json(DeleteSiteResponse {
        deleted: true,
        returned_equipment,
    }))
}
