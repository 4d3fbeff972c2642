//! Equipment repository: CRUD, list views, and the compare-and-set
//! assignment primitive behind the domain `EquipmentStore` contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::error::ConflictKind;
use domain::models::equipment::{
    CreateEquipmentRequest, Equipment, EquipmentSummary, UpdateEquipmentRequest, UsageRecord,
};
use domain::stores::{AssignmentTarget, EquipmentStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{EquipmentEntity, EquipmentWithSiteEntity, UsageRecordEntity};
use crate::repositories::{is_unique_violation, map_sqlx};

const EQUIPMENT_COLUMNS: &str = "id, name, kind, identifier, status, created_by, \
     current_site_id, assigned_to_user_id, brand, model, year, serial_number, \
     last_maintenance, next_maintenance_due, total_hours, created_at, updated_at";

/// Repository for equipment-related database operations.
#[derive(Clone)]
pub struct EquipmentRepository {
    pool: PgPool,
}

impl EquipmentRepository {
    /// Creates a new EquipmentRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a unit. A duplicate identifier surfaces as a conflict.
    pub async fn create(
        &self,
        request: &CreateEquipmentRequest,
        created_by: Uuid,
    ) -> Result<Equipment, StoreError> {
        let entity = sqlx::query_as::<_, EquipmentEntity>(&format!(
            r#"
            INSERT INTO equipment (
                id, name, kind, identifier, status, created_by, brand, model, year,
                serial_number, last_maintenance, next_maintenance_due, total_hours,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, 'Available', $5, $6, $7, $8, $9, $10, $11, 0, $12, $12)
            RETURNING {EQUIPMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(request.kind.as_str())
        .bind(&request.identifier)
        .bind(created_by)
        .bind(&request.brand)
        .bind(&request.model)
        .bind(request.year)
        .bind(&request.serial_number)
        .bind(request.last_maintenance)
        .bind(request.next_maintenance_due)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(ConflictKind::DuplicateIdentifier)
            } else {
                map_sqlx(e)
            }
        })?;

        entity.into_domain()
    }

    /// Finds a unit by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Equipment>, StoreError> {
        let entity = sqlx::query_as::<_, EquipmentEntity>(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        entity.map(EquipmentEntity::into_domain).transpose()
    }

    /// One page of the inventory, newest first, with the current site
    /// name denormalized in. `after` is the `(created_at, id)` pair of
    /// the previous page's last row.
    pub async fn list_page(
        &self,
        limit: i64,
        after: Option<(DateTime<Utc>, Uuid)>,
    ) -> Result<Vec<EquipmentSummary>, StoreError> {
        let base = r#"
            SELECT e.id, e.name, e.kind, e.identifier, e.status,
                   e.current_site_id, s.name AS current_site_name, e.created_at
            FROM equipment e
            LEFT JOIN sites s ON s.id = e.current_site_id
        "#;

        let entities: Vec<EquipmentWithSiteEntity> = match after {
            Some((created_at, id)) => {
                sqlx::query_as(&format!(
                    "{base} WHERE (e.created_at, e.id) < ($2, $3) \
                     ORDER BY e.created_at DESC, e.id DESC LIMIT $1"
                ))
                .bind(limit)
                .bind(created_at)
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?
            }
            None => {
                sqlx::query_as(&format!(
                    "{base} ORDER BY e.created_at DESC, e.id DESC LIMIT $1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?
            }
        };

        entities
            .into_iter()
            .map(EquipmentWithSiteEntity::into_domain)
            .collect()
    }

    /// The current site's name, for detail views.
    pub async fn current_site_name(
        &self,
        equipment: &Equipment,
    ) -> Result<Option<String>, StoreError> {
        let Some(site_id) = equipment.location.current_site_id else {
            return Ok(None);
        };

        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM sites WHERE id = $1")
            .bind(site_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(name.map(|(n,)| n))
    }

    /// A unit's full usage history, oldest stint first.
    pub async fn usage_history(&self, equipment_id: Uuid) -> Result<Vec<UsageRecord>, StoreError> {
        let entities: Vec<UsageRecordEntity> = sqlx::query_as(
            r#"
            SELECT id, equipment_id, site_id, start_date, end_date, hours_used
            FROM equipment_usage
            WHERE equipment_id = $1
            ORDER BY start_date ASC, id ASC
            "#,
        )
        .bind(equipment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(entities.into_iter().map(UsageRecord::from).collect())
    }

    /// Applies a field patch. The identifier is immutable and absent from
    /// the patch type. `Available` in the patch clears an administrative
    /// override and recomputes the assignment-driven status from the
    /// unit's location; `Maintenance`/`OutOfService` set the override.
    pub async fn update(
        &self,
        id: Uuid,
        patch: &UpdateEquipmentRequest,
    ) -> Result<Equipment, StoreError> {
        let entity = sqlx::query_as::<_, EquipmentEntity>(&format!(
            r#"
            UPDATE equipment
            SET name = COALESCE($2, name),
                kind = COALESCE($3, kind),
                status = CASE
                    WHEN $4::text IS NULL THEN status
                    WHEN $4 = 'Available' THEN
                        CASE WHEN current_site_id IS NULL THEN 'Available' ELSE 'InUse' END
                    ELSE $4
                END,
                brand = COALESCE($5, brand),
                model = COALESCE($6, model),
                year = COALESCE($7, year),
                serial_number = COALESCE($8, serial_number),
                last_maintenance = COALESCE($9, last_maintenance),
                next_maintenance_due = COALESCE($10, next_maintenance_due),
                total_hours = COALESCE($11, total_hours),
                updated_at = $12
            WHERE id = $1
            RETURNING {EQUIPMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(patch.kind.map(|k| k.as_str()))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(&patch.brand)
        .bind(&patch.model)
        .bind(patch.year)
        .bind(&patch.serial_number)
        .bind(patch.last_maintenance)
        .bind(patch.next_maintenance_due)
        .bind(patch.total_hours)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::NotFound)?;

        entity.into_domain()
    }

    /// Deletes a unit. Refused while it is assigned; the caller is
    /// expected to have force-returned it first.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM equipment WHERE id = $1 AND current_site_id IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM equipment WHERE id = $1")
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
impl EquipmentStore for EquipmentRepository {
    async fn get(&self, id: Uuid) -> Result<Equipment, StoreError> {
        self.find_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    /// Guarded single-row update: the row is written only when its
    /// current `current_site_id` matches the expected prior value, so two
    /// racing assigns resolve at the database rather than at the earlier
    /// read check. The usage history write rides in the same transaction;
    /// both touch only this aggregate.
    async fn set_assignment_state(
        &self,
        id: Uuid,
        expected_prior_site: Option<Uuid>,
        target: AssignmentTarget,
    ) -> Result<Equipment, StoreError> {
        let target_site = target.site_id();

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let updated = sqlx::query_as::<_, EquipmentEntity>(&format!(
            r#"
            UPDATE equipment
            SET current_site_id = $2,
                assigned_to_user_id = CASE
                    WHEN $2::uuid IS NULL THEN NULL
                    ELSE assigned_to_user_id
                END,
                status = CASE
                    WHEN status IN ('Maintenance', 'OutOfService') THEN status
                    WHEN $2::uuid IS NULL THEN 'Available'
                    ELSE 'InUse'
                END,
                updated_at = $4
            WHERE id = $1
              AND current_site_id IS NOT DISTINCT FROM $3
              AND ($2::uuid IS NULL OR status NOT IN ('Maintenance', 'OutOfService'))
            RETURNING {EQUIPMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(target_site)
        .bind(expected_prior_site)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let Some(entity) = updated else {
            tx.rollback().await.ok();
            // Zero rows: missing record, an idempotent re-apply, or a
            // genuine conflict. Disambiguate against the current row.
            let current = self.find_by_id(id).await?.ok_or(StoreError::NotFound)?;
            if current.location.current_site_id == target_site {
                return Ok(current);
            }
            return Err(StoreError::Conflict(ConflictKind::AlreadyAssigned));
        };

        match target {
            AssignmentTarget::Assigned { site_id, date } => {
                sqlx::query(
                    r#"
                    INSERT INTO equipment_usage (id, equipment_id, site_id, start_date)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(id)
                .bind(site_id)
                .bind(date)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            }
            AssignmentTarget::Cleared { date } => {
                sqlx::query(
                    r#"
                    UPDATE equipment_usage
                    SET end_date = $2
                    WHERE equipment_id = $1 AND end_date IS NULL
                    "#,
                )
                .bind(id)
                .bind(date)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            }
        }

        tx.commit().await.map_err(map_sqlx)?;

        entity.into_domain()
    }
}

// Status literals in the SQL above must stay in sync with
// `EquipmentStatus::as_str`.
#[cfg(test)]
mod tests {
    use domain::models::equipment::EquipmentStatus;

    #[test]
    fn status_literals_match_domain_encoding() {
        assert_eq!(EquipmentStatus::Available.as_str(), "Available");
        assert_eq!(EquipmentStatus::InUse.as_str(), "InUse");
        assert_eq!(EquipmentStatus::Maintenance.as_str(), "Maintenance");
        assert_eq!(EquipmentStatus::OutOfService.as_str(), "OutOfService");
    }
}
