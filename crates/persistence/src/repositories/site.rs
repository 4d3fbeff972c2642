//! Site repository: CRUD, list views, and the roster entry operations
//! behind the domain `SiteStore` contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::error::ConflictKind;
use domain::models::site::{
    CreateSiteRequest, RosterEntry, RosterEntryView, Site, SiteSummary, UpdateSiteRequest,
};
use domain::policy::SiteVisibility;
use domain::stores::{SiteStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{
    RosterEntryEntity, RosterEntryWithEquipmentEntity, SiteEntity, SiteSummaryEntity,
};
use crate::repositories::{is_fk_violation, is_unique_violation, map_sqlx};

const SITE_COLUMNS: &str = "id, name, created_by, chief_id, address, city, latitude, longitude, \
     client_name, client_phone, client_email, status, start_date, estimated_end_date, \
     actual_end_date, budget_estimated, budget_actual, description, progress, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, site_id, equipment_id, assigned_date, return_date";

/// Repository for site-related database operations.
#[derive(Clone)]
pub struct SiteRepository {
    pool: PgPool,
}

impl SiteRepository {
    /// Creates a new SiteRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a site.
    pub async fn create(
        &self,
        request: &CreateSiteRequest,
        created_by: Uuid,
    ) -> Result<Site, StoreError> {
        let entity = sqlx::query_as::<_, SiteEntity>(&format!(
            r#"
            INSERT INTO sites (
                id, name, created_by, chief_id, address, city, latitude, longitude,
                client_name, client_phone, client_email, status, start_date,
                estimated_end_date, budget_estimated, budget_actual, description,
                progress, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'Planned', $12, $13, $14, 0, $15, 0, $16, $16)
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(created_by)
        .bind(request.chief_id)
        .bind(&request.address)
        .bind(&request.city)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(&request.client_name)
        .bind(&request.client_phone)
        .bind(&request.client_email)
        .bind(request.start_date)
        .bind(request.estimated_end_date)
        .bind(request.budget_estimated)
        .bind(&request.description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                // The chief reference does not resolve to a user.
                StoreError::NotFound
            } else {
                map_sqlx(e)
            }
        })?;

        entity.into_domain()
    }

    /// Finds a site by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Site>, StoreError> {
        let entity = sqlx::query_as::<_, SiteEntity>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        entity.map(SiteEntity::into_domain).transpose()
    }

    /// Lists sites visible to the caller, newest first, with the chief's
    /// name and the open roster entry count denormalized in.
    pub async fn list(&self, visibility: SiteVisibility) -> Result<Vec<SiteSummary>, StoreError> {
        let base = r#"
            SELECT s.id, s.name, s.city, s.chief_id, u.name AS chief_name, s.status,
                   s.progress, s.start_date, s.estimated_end_date,
                   (SELECT COUNT(*) FROM site_equipment se
                     WHERE se.site_id = s.id AND se.return_date IS NULL) AS open_equipment_count
            FROM sites s
            JOIN users u ON u.id = s.chief_id
        "#;

        let entities: Vec<SiteSummaryEntity> = match visibility {
            SiteVisibility::All => {
                sqlx::query_as(&format!("{base} ORDER BY s.created_at DESC"))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx)?
            }
            SiteVisibility::ChiefOf(chief_id) => {
                sqlx::query_as(&format!(
                    "{base} WHERE s.chief_id = $1 ORDER BY s.created_at DESC"
                ))
                .bind(chief_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?
            }
        };

        entities
            .into_iter()
            .map(SiteSummaryEntity::into_domain)
            .collect()
    }

    /// The chief's display name, for detail views.
    pub async fn chief_name(&self, site: &Site) -> Result<String, StoreError> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM users WHERE id = $1")
            .bind(site.chief_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(name.map(|(n,)| n).unwrap_or_default())
    }

    /// Full roster of a site (open and historical), oldest first, with
    /// equipment references denormalized in.
    pub async fn roster(&self, site_id: Uuid) -> Result<Vec<RosterEntryView>, StoreError> {
        let entities: Vec<RosterEntryWithEquipmentEntity> = sqlx::query_as(
            r#"
            SELECT se.id, se.equipment_id, e.name AS equipment_name,
                   e.identifier AS equipment_identifier, se.assigned_date, se.return_date
            FROM site_equipment se
            JOIN equipment e ON e.id = se.equipment_id
            WHERE se.site_id = $1
            ORDER BY se.assigned_date ASC, se.id ASC
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(entities.into_iter().map(RosterEntryView::from).collect())
    }

    /// Applies a field patch. Absent fields are left untouched; which
    /// fields the caller may touch has already been decided by the
    /// authorization policy.
    pub async fn update(
        &self,
        id: Uuid,
        patch: &UpdateSiteRequest,
    ) -> Result<Site, StoreError> {
        let entity = sqlx::query_as::<_, SiteEntity>(&format!(
            r#"
            UPDATE sites
            SET name = COALESCE($2, name),
                chief_id = COALESCE($3, chief_id),
                address = COALESCE($4, address),
                city = COALESCE($5, city),
                client_name = COALESCE($6, client_name),
                status = COALESCE($7, status),
                progress = COALESCE($8, progress),
                actual_end_date = COALESCE($9, actual_end_date),
                budget_estimated = COALESCE($10, budget_estimated),
                budget_actual = COALESCE($11, budget_actual),
                description = COALESCE($12, description),
                updated_at = $13
            WHERE id = $1
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(patch.chief_id)
        .bind(&patch.address)
        .bind(&patch.city)
        .bind(&patch.client_name)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.progress)
        .bind(patch.actual_end_date)
        .bind(patch.budget_estimated)
        .bind(patch.budget_actual)
        .bind(&patch.description)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_fk_violation(&e) {
                StoreError::NotFound
            } else {
                map_sqlx(e)
            }
        })?
        .ok_or(StoreError::NotFound)?;

        entity.into_domain()
    }

    /// Deletes a site. Refused while any roster entry is still open; the
    /// caller is expected to have force-returned everything first.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sites
            WHERE id = $1
              AND NOT EXISTS (
                SELECT 1 FROM site_equipment
                WHERE site_id = $1 AND return_date IS NULL
              )
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match exists {
            Some(_) => Err(StoreError::Conflict(ConflictKind::InUse)),
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl SiteStore for SiteRepository {
    async fn get(&self, id: Uuid) -> Result<Site, StoreError> {
        self.find_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    async fn add_roster_entry(
        &self,
        site_id: Uuid,
        equipment_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, StoreError> {
        // The NOT EXISTS guard enforces the per-site uniqueness locally;
        // the partial unique index on open entries is the storage-level
        // backstop against an open entry elsewhere.
        let inserted = sqlx::query_as::<_, RosterEntryEntity>(&format!(
            r#"
            INSERT INTO site_equipment (id, site_id, equipment_id, assigned_date)
            SELECT $1, $2, $3, $4
            WHERE EXISTS (SELECT 1 FROM sites WHERE id = $2)
              AND NOT EXISTS (
                SELECT 1 FROM site_equipment
                WHERE site_id = $2 AND equipment_id = $3 AND return_date IS NULL
              )
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(site_id)
        .bind(equipment_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                // Open entry at another site won the race.
                StoreError::Conflict(ConflictKind::AlreadyAssigned)
            } else if is_fk_violation(&e) {
                StoreError::NotFound
            } else {
                map_sqlx(e)
            }
        })?;

        if let Some(entity) = inserted {
            return Ok(entity.into());
        }

        let site_exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sites WHERE id = $1")
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if site_exists.is_none() {
            return Err(StoreError::NotFound);
        }

        Err(StoreError::Conflict(ConflictKind::AlreadyOpenHere))
    }

    async fn close_roster_entry(
        &self,
        site_id: Uuid,
        entry_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, StoreError> {
        let closed = sqlx::query_as::<_, RosterEntryEntity>(&format!(
            r#"
            UPDATE site_equipment
            SET return_date = $3
            WHERE id = $2 AND site_id = $1 AND return_date IS NULL
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(site_id)
        .bind(entry_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if let Some(entity) = closed {
            return Ok(entity.into());
        }

        let existing: Option<RosterEntryEntity> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM site_equipment WHERE id = $2 AND site_id = $1"
        ))
        .bind(site_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match existing {
            Some(_) => Err(StoreError::Conflict(ConflictKind::AlreadyClosed)),
            None => Err(StoreError::NotFound),
        }
    }

    async fn reopen_roster_entry(
        &self,
        site_id: Uuid,
        entry_id: Uuid,
    ) -> Result<RosterEntry, StoreError> {
        let entity = sqlx::query_as::<_, RosterEntryEntity>(&format!(
            r#"
            UPDATE site_equipment
            SET return_date = NULL
            WHERE id = $2 AND site_id = $1
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(site_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::NotFound)?;

        Ok(entity.into())
    }

    async fn open_roster_entries(&self, site_id: Uuid) -> Result<Vec<RosterEntry>, StoreError> {
        let entities: Vec<RosterEntryEntity> = sqlx::query_as(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM site_equipment
            WHERE site_id = $1 AND return_date IS NULL
            ORDER BY assigned_date ASC, id ASC
            "#
        ))
        .bind(site_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(entities.into_iter().map(RosterEntry::from).collect())
    }

    async fn find_open_entry(
        &self,
        site_id: Uuid,
        equipment_id: Uuid,
    ) -> Result<Option<RosterEntry>, StoreError> {
        let entity: Option<RosterEntryEntity> = sqlx::query_as(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM site_equipment
            WHERE site_id = $1 AND equipment_id = $2 AND return_date IS NULL
            "#
        ))
        .bind(site_id)
        .bind(equipment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(entity.map(RosterEntry::from))
    }
}
