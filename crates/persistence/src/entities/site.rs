//! Site and roster entry entities.

use chrono::{DateTime, Utc};
use domain::models::site::{
    ClientInfo, RosterEntry, RosterEntryView, Site, SiteLocation, SiteStatus, SiteSummary,
};
use domain::stores::StoreError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Row mapping for the `sites` table.
#[derive(Debug, Clone, FromRow)]
pub struct SiteEntity {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub chief_id: Uuid,
    pub address: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub client_name: String,
    pub client_phone: Option<String>,
    pub client_email: Option<String>,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub estimated_end_date: DateTime<Utc>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub budget_estimated: f64,
    pub budget_actual: f64,
    pub description: Option<String>,
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SiteEntity {
    pub fn into_domain(self) -> Result<Site, StoreError> {
        let status = SiteStatus::from_str(&self.status)
            .map_err(|e| StoreError::Backend(format!("corrupt site row {}: {}", self.id, e)))?;

        Ok(Site {
            id: self.id,
            name: self.name,
            created_by: self.created_by,
            chief_id: self.chief_id,
            location: SiteLocation {
                address: self.address,
                city: self.city,
                latitude: self.latitude,
                longitude: self.longitude,
            },
            client: ClientInfo {
                name: self.client_name,
                phone: self.client_phone,
                email: self.client_email,
            },
            status,
            start_date: self.start_date,
            estimated_end_date: self.estimated_end_date,
            actual_end_date: self.actual_end_date,
            budget_estimated: self.budget_estimated,
            budget_actual: self.budget_actual,
            description: self.description,
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row mapping for site list queries, joined with the chief's name and
/// the open roster entry count.
#[derive(Debug, Clone, FromRow)]
pub struct SiteSummaryEntity {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub chief_id: Uuid,
    pub chief_name: String,
    pub status: String,
    pub progress: i32,
    pub start_date: DateTime<Utc>,
    pub estimated_end_date: DateTime<Utc>,
    pub open_equipment_count: i64,
}

impl SiteSummaryEntity {
    pub fn into_domain(self) -> Result<SiteSummary, StoreError> {
        let status = SiteStatus::from_str(&self.status)
            .map_err(|e| StoreError::Backend(format!("corrupt site row {}: {}", self.id, e)))?;

        Ok(SiteSummary {
            id: self.id,
            name: self.name,
            city: self.city,
            chief_id: self.chief_id,
            chief_name: self.chief_name,
            status,
            progress: self.progress,
            start_date: self.start_date,
            estimated_end_date: self.estimated_end_date,
            open_equipment_count: self.open_equipment_count,
        })
    }
}

/// Row mapping for the `site_equipment` table.
#[derive(Debug, Clone, FromRow)]
pub struct RosterEntryEntity {
    pub id: Uuid,
    pub site_id: Uuid,
    pub equipment_id: Uuid,
    pub assigned_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl From<RosterEntryEntity> for RosterEntry {
    fn from(e: RosterEntryEntity) -> Self {
        RosterEntry {
            id: e.id,
            site_id: e.site_id,
            equipment_id: e.equipment_id,
            assigned_date: e.assigned_date,
            return_date: e.return_date,
        }
    }
}

/// Roster entry joined with the referenced unit for detail views.
#[derive(Debug, Clone, FromRow)]
pub struct RosterEntryWithEquipmentEntity {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub equipment_name: String,
    pub equipment_identifier: String,
    pub assigned_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl From<RosterEntryWithEquipmentEntity> for RosterEntryView {
    fn from(e: RosterEntryWithEquipmentEntity) -> Self {
        RosterEntryView {
            id: e.id,
            equipment_id: e.equipment_id,
            equipment_name: e.equipment_name,
            equipment_identifier: e.equipment_identifier,
            assigned_date: e.assigned_date,
            return_date: e.return_date,
        }
    }
}
