//! Equipment entities.

use chrono::{DateTime, Utc};
use domain::models::equipment::{
    Equipment, EquipmentKind, EquipmentLocation, EquipmentStatus, EquipmentSummary,
    Specifications, UsageRecord,
};
use domain::stores::StoreError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Row mapping for the `equipment` table.
#[derive(Debug, Clone, FromRow)]
pub struct EquipmentEntity {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub identifier: String,
    pub status: String,
    pub created_by: Uuid,
    pub current_site_id: Option<Uuid>,
    pub assigned_to_user_id: Option<Uuid>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub serial_number: Option<String>,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
    pub total_hours: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EquipmentEntity {
    pub fn into_domain(self) -> Result<Equipment, StoreError> {
        let kind = EquipmentKind::from_str(&self.kind).map_err(|e| {
            StoreError::Backend(format!("corrupt equipment row {}: {}", self.id, e))
        })?;
        let status = EquipmentStatus::from_str(&self.status).map_err(|e| {
            StoreError::Backend(format!("corrupt equipment row {}: {}", self.id, e))
        })?;

        Ok(Equipment {
            id: self.id,
            name: self.name,
            kind,
            identifier: self.identifier,
            status,
            created_by: self.created_by,
            location: EquipmentLocation {
                current_site_id: self.current_site_id,
                assigned_to_user_id: self.assigned_to_user_id,
            },
            specifications: Specifications {
                brand: self.brand,
                model: self.model,
                year: self.year,
                serial_number: self.serial_number,
            },
            last_maintenance: self.last_maintenance,
            next_maintenance_due: self.next_maintenance_due,
            total_hours: self.total_hours,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Equipment row joined with its current site's name for list views.
#[derive(Debug, Clone, FromRow)]
pub struct EquipmentWithSiteEntity {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub identifier: String,
    pub status: String,
    pub current_site_id: Option<Uuid>,
    pub current_site_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EquipmentWithSiteEntity {
    pub fn into_domain(self) -> Result<EquipmentSummary, StoreError> {
        let kind = EquipmentKind::from_str(&self.kind).map_err(|e| {
            StoreError::Backend(format!("corrupt equipment row {}: {}", self.id, e))
        })?;
        let status = EquipmentStatus::from_str(&self.status).map_err(|e| {
            StoreError::Backend(format!("corrupt equipment row {}: {}", self.id, e))
        })?;

        Ok(EquipmentSummary {
            id: self.id,
            name: self.name,
            kind,
            identifier: self.identifier,
            status,
            current_site_id: self.current_site_id,
            current_site_name: self.current_site_name,
            created_at: self.created_at,
        })
    }
}

/// Row mapping for the `equipment_usage` table.
#[derive(Debug, Clone, FromRow)]
pub struct UsageRecordEntity {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub site_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub hours_used: Option<f64>,
}

impl From<UsageRecordEntity> for UsageRecord {
    fn from(e: UsageRecordEntity) -> Self {
        UsageRecord {
            id: e.id,
            equipment_id: e.equipment_id,
            site_id: e.site_id,
            start_date: e.start_date,
            end_date: e.end_date,
            hours_used: e.hours_used,
        }
    }
}
