//! Store contracts for the two aggregates.
//!
//! The assignment consistency engine is written against these traits so
//! the cross-aggregate sequencing can be exercised without a database.
//! Each method is individually atomic; nothing here spans both
//! aggregates — that composition is the engine's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ConflictKind;
use crate::models::equipment::Equipment;
use crate::models::site::{RosterEntry, Site};

/// Errors surfaced by a store operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(ConflictKind),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Target of a `set_assignment_state` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentTarget {
    /// Place the unit at a site, opening a usage record.
    Assigned { site_id: Uuid, date: DateTime<Utc> },
    /// Clear the assignment, closing the open usage record.
    Cleared { date: DateTime<Utc> },
}

impl AssignmentTarget {
    pub fn site_id(&self) -> Option<Uuid> {
        match self {
            AssignmentTarget::Assigned { site_id, .. } => Some(*site_id),
            AssignmentTarget::Cleared { .. } => None,
        }
    }
}

/// Contract of the equipment store, as seen by the engine.
///
/// `set_assignment_state` is the serialization point for concurrent
/// assignment attempts: it is a per-record compare-and-set. It succeeds
/// only when the record's current `current_site_id` equals
/// `expected_prior_site`; otherwise it fails with
/// `Conflict(AlreadyAssigned)` even when two requests raced past an
/// earlier read check. Re-applying an already-reached target state is a
/// no-op success, which is what makes the engine's retry safe.
#[async_trait]
pub trait EquipmentStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Equipment, StoreError>;

    /// Compare-and-set of the assignment-driven state.
    ///
    /// Semantics:
    /// - missing record: `NotFound`
    /// - record already in the target state: success, no change
    /// - `current_site_id != expected_prior_site`: `Conflict(AlreadyAssigned)`
    /// - assigning a unit whose status is `Maintenance`/`OutOfService`:
    ///   `Conflict(AlreadyAssigned)`
    ///
    /// On success the status follows the location (`InUse` at a site,
    /// `Available` off-site) unless an administrative override status is
    /// set, and the unit's usage history is opened or closed to match.
    async fn set_assignment_state(
        &self,
        id: Uuid,
        expected_prior_site: Option<Uuid>,
        target: AssignmentTarget,
    ) -> Result<Equipment, StoreError>;
}

/// Contract of the site store, as seen by the engine.
#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Site, StoreError>;

    /// Appends an open roster entry. Refuses a second open entry for the
    /// same unit at this site with `Conflict(AlreadyOpenHere)`; an open
    /// entry elsewhere surfaces as `Conflict(AlreadyAssigned)`. This
    /// method alone cannot verify the cross-aggregate invariant — the
    /// engine's write ordering does.
    async fn add_roster_entry(
        &self,
        site_id: Uuid,
        equipment_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, StoreError>;

    /// Closes an open roster entry, setting its return date. A second
    /// close fails with `Conflict(AlreadyClosed)`.
    async fn close_roster_entry(
        &self,
        site_id: Uuid,
        entry_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, StoreError>;

    /// Reopens a just-closed entry. Compensation path only: the engine
    /// uses this to revert a close whose matching equipment write failed.
    async fn reopen_roster_entry(
        &self,
        site_id: Uuid,
        entry_id: Uuid,
    ) -> Result<RosterEntry, StoreError>;

    /// All open entries at a site, in assignment order.
    async fn open_roster_entries(&self, site_id: Uuid) -> Result<Vec<RosterEntry>, StoreError>;

    /// The open entry for a unit at a site, if any.
    async fn find_open_entry(
        &self,
        site_id: Uuid,
        equipment_id: Uuid,
    ) -> Result<Option<RosterEntry>, StoreError>;
}
