//! Equipment (tracked physical unit) domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Category of a tracked unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentKind {
    Vehicle,
    PowerTool,
    HandTool,
    HeavyMachine,
    Scaffolding,
    SafetyEquipment,
    Other,
}

impl EquipmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentKind::Vehicle => "Vehicle",
            EquipmentKind::PowerTool => "PowerTool",
            EquipmentKind::HandTool => "HandTool",
            EquipmentKind::HeavyMachine => "HeavyMachine",
            EquipmentKind::Scaffolding => "Scaffolding",
            EquipmentKind::SafetyEquipment => "SafetyEquipment",
            EquipmentKind::Other => "Other",
        }
    }
}

impl FromStr for EquipmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vehicle" => Ok(EquipmentKind::Vehicle),
            "PowerTool" => Ok(EquipmentKind::PowerTool),
            "HandTool" => Ok(EquipmentKind::HandTool),
            "HeavyMachine" => Ok(EquipmentKind::HeavyMachine),
            "Scaffolding" => Ok(EquipmentKind::Scaffolding),
            "SafetyEquipment" => Ok(EquipmentKind::SafetyEquipment),
            "Other" => Ok(EquipmentKind::Other),
            _ => Err(format!("Invalid equipment kind: {}", s)),
        }
    }
}

impl fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Availability status of a unit.
///
/// `Available` and `InUse` are assignment-driven: `InUse` holds exactly
/// while the unit sits at a site. `Maintenance` and `OutOfService` are
/// administrative overrides; while one is set, assignment transitions do
/// not touch the status and new assignments are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipmentStatus {
    Available,
    InUse,
    Maintenance,
    OutOfService,
}

impl EquipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentStatus::Available => "Available",
            EquipmentStatus::InUse => "InUse",
            EquipmentStatus::Maintenance => "Maintenance",
            EquipmentStatus::OutOfService => "OutOfService",
        }
    }

    /// True for the administrative override statuses that refuse new
    /// assignments and suppress assignment-driven status changes.
    pub fn blocks_assignment(&self) -> bool {
        matches!(self, EquipmentStatus::Maintenance | EquipmentStatus::OutOfService)
    }

    /// The assignment-driven status for a given location.
    pub fn derived(current_site_id: Option<Uuid>) -> Self {
        if current_site_id.is_some() {
            EquipmentStatus::InUse
        } else {
            EquipmentStatus::Available
        }
    }
}

impl FromStr for EquipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(EquipmentStatus::Available),
            "InUse" => Ok(EquipmentStatus::InUse),
            "Maintenance" => Ok(EquipmentStatus::Maintenance),
            "OutOfService" => Ok(EquipmentStatus::OutOfService),
            _ => Err(format!("Invalid equipment status: {}", s)),
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a unit currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentLocation {
    pub current_site_id: Option<Uuid>,
    pub assigned_to_user_id: Option<Uuid>,
}

/// Manufacturer details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specifications {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub serial_number: Option<String>,
}

/// A tracked physical unit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Equipment {
    pub id: Uuid,
    pub name: String,
    pub kind: EquipmentKind,
    /// Globally unique inventory identifier; immutable after creation.
    pub identifier: String,
    pub status: EquipmentStatus,
    pub created_by: Uuid,
    pub location: EquipmentLocation,
    pub specifications: Specifications,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
    pub total_hours: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Equipment {
    /// Invariant check: `InUse` exactly when located at a site, unless an
    /// administrative override status is in effect.
    pub fn assignment_state_consistent(&self) -> bool {
        if self.status.blocks_assignment() {
            return true;
        }
        (self.status == EquipmentStatus::InUse) == self.location.current_site_id.is_some()
    }
}

/// One stint of a unit's usage history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub site_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub hours_used: Option<f64>,
}

/// Request payload for creating a unit.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEquipmentRequest {
    #[validate(length(min = 1, max = 200, message = "Equipment name must be 1-200 characters"))]
    pub name: String,

    pub kind: EquipmentKind,

    #[validate(length(min = 1, max = 64, message = "Identifier must be 1-64 characters"))]
    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub identifier: String,

    pub brand: Option<String>,
    pub model: Option<String>,

    #[validate(custom(function = "shared::validation::validate_year"))]
    pub year: Option<i32>,

    pub serial_number: Option<String>,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
}

/// Field-patch payload for updating a unit.
///
/// The identifier is immutable and deliberately absent. `Available`
/// clears an administrative override; `Maintenance`/`OutOfService` set
/// one. `InUse` is assignment-driven and is not accepted here.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEquipmentRequest {
    #[validate(length(min = 1, max = 200, message = "Equipment name must be 1-200 characters"))]
    pub name: Option<String>,

    pub kind: Option<EquipmentKind>,

    pub status: Option<EquipmentStatus>,

    pub brand: Option<String>,
    pub model: Option<String>,

    #[validate(custom(function = "shared::validation::validate_year"))]
    pub year: Option<i32>,

    pub serial_number: Option<String>,
    pub last_maintenance: Option<DateTime<Utc>>,
    pub next_maintenance_due: Option<DateTime<Utc>>,

    #[validate(range(min = 0.0, message = "Total hours must be non-negative"))]
    pub total_hours: Option<f64>,
}

impl UpdateEquipmentRequest {
    /// Rejects the one status value callers may not set directly.
    pub fn check_status(&self) -> Result<(), String> {
        if self.status == Some(EquipmentStatus::InUse) {
            return Err(
                "Status 'InUse' is assignment-driven; assign the unit to a site instead"
                    .to_string(),
            );
        }
        Ok(())
    }
}

/// Compact unit view for list responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentSummary {
    pub id: Uuid,
    pub name: String,
    pub kind: EquipmentKind,
    pub identifier: String,
    pub status: EquipmentStatus,
    pub current_site_id: Option<Uuid>,
    pub current_site_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full unit view for detail responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentDetail {
    #[serde(flatten)]
    pub equipment: Equipment,
    pub current_site_name: Option<String>,
    pub usage_history: Vec<UsageRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        for kind in [
            EquipmentKind::Vehicle,
            EquipmentKind::PowerTool,
            EquipmentKind::HandTool,
            EquipmentKind::HeavyMachine,
            EquipmentKind::Scaffolding,
            EquipmentKind::SafetyEquipment,
            EquipmentKind::Other,
        ] {
            assert_eq!(EquipmentKind::from_str(kind.as_str()).unwrap(), kind);
        }
        assert!(EquipmentKind::from_str("Drone").is_err());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            EquipmentStatus::Available,
            EquipmentStatus::InUse,
            EquipmentStatus::Maintenance,
            EquipmentStatus::OutOfService,
        ] {
            assert_eq!(EquipmentStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn override_statuses_block_assignment() {
        assert!(EquipmentStatus::Maintenance.blocks_assignment());
        assert!(EquipmentStatus::OutOfService.blocks_assignment());
        assert!(!EquipmentStatus::Available.blocks_assignment());
        assert!(!EquipmentStatus::InUse.blocks_assignment());
    }

    #[test]
    fn derived_status_follows_location() {
        assert_eq!(
            EquipmentStatus::derived(Some(Uuid::new_v4())),
            EquipmentStatus::InUse
        );
        assert_eq!(EquipmentStatus::derived(None), EquipmentStatus::Available);
    }

    #[test]
    fn in_use_not_settable_through_update() {
        let patch = UpdateEquipmentRequest {
            status: Some(EquipmentStatus::InUse),
            ..Default::default()
        };
        assert!(patch.check_status().is_err());

        let patch = UpdateEquipmentRequest {
            status: Some(EquipmentStatus::Maintenance),
            ..Default::default()
        };
        assert!(patch.check_status().is_ok());
    }
}
