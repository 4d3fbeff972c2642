//! Site (construction project) domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle status of a construction site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteStatus {
    Planned,
    InProgress,
    Paused,
    Completed,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Planned => "Planned",
            SiteStatus::InProgress => "InProgress",
            SiteStatus::Paused => "Paused",
            SiteStatus::Completed => "Completed",
        }
    }
}

impl FromStr for SiteStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Planned" => Ok(SiteStatus::Planned),
            "InProgress" => Ok(SiteStatus::InProgress),
            "Paused" => Ok(SiteStatus::Paused),
            "Completed" => Ok(SiteStatus::Completed),
            _ => Err(format!("Invalid site status: {}", s)),
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Postal location of a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteLocation {
    pub address: String,
    pub city: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Client commissioning the site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A construction site.
///
/// The equipment roster is part of this aggregate but is loaded
/// separately; see [`RosterEntry`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    /// The Chef responsible for this site.
    pub chief_id: Uuid,
    pub location: SiteLocation,
    pub client: ClientInfo,
    pub status: SiteStatus,
    pub start_date: DateTime<Utc>,
    pub estimated_end_date: DateTime<Utc>,
    pub actual_end_date: Option<DateTime<Utc>>,
    pub budget_estimated: f64,
    pub budget_actual: f64,
    pub description: Option<String>,
    /// Completion percentage, 0-100.
    pub progress: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stint of one equipment unit at one site.
///
/// An entry with `return_date = None` is open: the unit is currently at
/// the site. At most one entry per unit may be open globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: Uuid,
    pub site_id: Uuid,
    pub equipment_id: Uuid,
    pub assigned_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl RosterEntry {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Request payload for creating a site.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSiteRequest {
    #[validate(length(min = 1, max = 200, message = "Site name must be 1-200 characters"))]
    pub name: String,

    pub chief_id: Uuid,

    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,

    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: Option<f64>,

    #[validate(length(min = 1, message = "Client name is required"))]
    pub client_name: String,

    pub client_phone: Option<String>,

    #[validate(email(message = "Invalid client email"))]
    pub client_email: Option<String>,

    pub start_date: DateTime<Utc>,

    pub estimated_end_date: DateTime<Utc>,

    #[validate(range(min = 0.0, message = "Estimated budget must be non-negative"))]
    pub budget_estimated: f64,

    pub description: Option<String>,
}

impl CreateSiteRequest {
    /// Date-ordering check that `validator` cannot express per-field.
    pub fn check_dates(&self) -> Result<(), String> {
        if self.estimated_end_date < self.start_date {
            return Err("Estimated end date cannot precede the start date".to_string());
        }
        Ok(())
    }
}

/// Field-patch payload for updating a site.
///
/// Every field is optional; only present fields are written. Which fields
/// a given principal may touch is the authorization policy's decision,
/// not this type's.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSiteRequest {
    #[validate(length(min = 1, max = 200, message = "Site name must be 1-200 characters"))]
    pub name: Option<String>,

    pub chief_id: Option<Uuid>,

    #[validate(length(min = 1, message = "Address cannot be empty"))]
    pub address: Option<String>,

    #[validate(length(min = 1, message = "City cannot be empty"))]
    pub city: Option<String>,

    #[validate(length(min = 1, message = "Client name cannot be empty"))]
    pub client_name: Option<String>,

    pub status: Option<SiteStatus>,

    #[validate(custom(function = "shared::validation::validate_progress"))]
    pub progress: Option<i32>,

    pub actual_end_date: Option<DateTime<Utc>>,

    #[validate(range(min = 0.0, message = "Budget must be non-negative"))]
    pub budget_estimated: Option<f64>,

    #[validate(range(min = 0.0, message = "Budget must be non-negative"))]
    pub budget_actual: Option<f64>,

    pub description: Option<String>,
}

impl UpdateSiteRequest {
    /// True when the patch only touches the fields a site's Chef may
    /// edit: status and progress.
    pub fn touches_only_chief_editable(&self) -> bool {
        self.name.is_none()
            && self.chief_id.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.client_name.is_none()
            && self.actual_end_date.is_none()
            && self.budget_estimated.is_none()
            && self.budget_actual.is_none()
            && self.description.is_none()
    }

    /// True when no field is present at all.
    pub fn is_empty(&self) -> bool {
        self.touches_only_chief_editable() && self.status.is_none() && self.progress.is_none()
    }
}

/// Compact site view for list responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub chief_id: Uuid,
    pub chief_name: String,
    pub status: SiteStatus,
    pub progress: i32,
    pub start_date: DateTime<Utc>,
    pub estimated_end_date: DateTime<Utc>,
    pub open_equipment_count: i64,
}

/// A roster entry denormalized with the referenced unit, for detail views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntryView {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub equipment_name: String,
    pub equipment_identifier: String,
    pub assigned_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

/// Full site view for detail responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetail {
    #[serde(flatten)]
    pub site: Site,
    pub chief_name: String,
    pub equipment: Vec<RosterEntryView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch() -> UpdateSiteRequest {
        UpdateSiteRequest::default()
    }

    #[test]
    fn status_round_trip() {
        for status in [
            SiteStatus::Planned,
            SiteStatus::InProgress,
            SiteStatus::Paused,
            SiteStatus::Completed,
        ] {
            assert_eq!(SiteStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(SiteStatus::from_str("Demolished").is_err());
    }

    #[test]
    fn status_and_progress_are_chief_editable() {
        let mut p = patch();
        p.status = Some(SiteStatus::InProgress);
        p.progress = Some(40);
        assert!(p.touches_only_chief_editable());
    }

    #[test]
    fn name_is_not_chief_editable() {
        let mut p = patch();
        p.status = Some(SiteStatus::InProgress);
        p.name = Some("New name".to_string());
        assert!(!p.touches_only_chief_editable());
    }

    #[test]
    fn empty_patch_detected() {
        assert!(patch().is_empty());
        let mut p = patch();
        p.progress = Some(10);
        assert!(!p.is_empty());
    }

    #[test]
    fn date_ordering_checked() {
        let now = Utc::now();
        let req = CreateSiteRequest {
            name: "Quai des Docks".to_string(),
            chief_id: Uuid::new_v4(),
            address: "12 rue du Port".to_string(),
            city: "Nantes".to_string(),
            latitude: None,
            longitude: None,
            client_name: "Port Authority".to_string(),
            client_phone: None,
            client_email: None,
            start_date: now,
            estimated_end_date: now - chrono::Duration::days(1),
            budget_estimated: 100_000.0,
            description: None,
        };
        assert!(req.check_dates().is_err());
    }
}
