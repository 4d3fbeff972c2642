//! Assignment consistency engine.
//!
//! Keeps an equipment unit's assignment state and a site's roster
//! mutually consistent across the two independently stored aggregates.
//! No cross-aggregate transaction is assumed: each transition is a fixed
//! two-write sequence with compensation, and every write is idempotent
//! for a given target state so an interrupted operation is safe to
//! re-attempt wholesale.
//!
//! Write ordering:
//! - `assign` writes the equipment side first. A unit marked in-use with
//!   no roster entry is the conservative failure: it cannot be
//!   double-booked while the sequence is repaired.
//! - `return` closes the roster entry first, for the mirrored reason: a
//!   closed entry with the unit still marked in-use keeps the unit
//!   unavailable rather than falsely available.
//!
//! When the second write fails, the engine retries it once with the
//! already-recorded date, then reverts the first write and reports
//! `PartialFailure` rather than leaving divergent state unresolved.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ConflictKind, DomainError};
use crate::models::site::RosterEntry;
use crate::models::user::Principal;
use crate::policy::{self, Action};
use crate::stores::{AssignmentTarget, EquipmentStore, SiteStore, StoreError};

/// Orchestrates assignment transitions across both stores.
#[derive(Clone)]
pub struct AssignmentEngine<E, S> {
    equipment: E,
    sites: S,
}

fn site_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound => DomainError::NotFound("site"),
        StoreError::Conflict(kind) => DomainError::Conflict(kind),
        StoreError::Backend(msg) => DomainError::Storage(msg),
    }
}

fn equipment_err(e: StoreError) -> DomainError {
    match e {
        StoreError::NotFound => DomainError::NotFound("equipment"),
        StoreError::Conflict(kind) => DomainError::Conflict(kind),
        StoreError::Backend(msg) => DomainError::Storage(msg),
    }
}

impl<E, S> AssignmentEngine<E, S>
where
    E: EquipmentStore,
    S: SiteStore,
{
    pub fn new(equipment: E, sites: S) -> Self {
        Self { equipment, sites }
    }

    /// Assigns a unit to a site, opening a roster entry.
    pub async fn assign(
        &self,
        principal: &Principal,
        site_id: Uuid,
        equipment_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, DomainError> {
        let site = self.sites.get(site_id).await.map_err(site_err)?;
        policy::authorize(principal, &Action::AssignEquipment(&site))?;

        let unit = self.equipment.get(equipment_id).await.map_err(equipment_err)?;
        // Read-side availability check. Advisory only: the authoritative
        // rejection happens at the compare-and-set below, so two requests
        // racing past this point still resolve to a single winner.
        if unit.location.current_site_id.is_some() || unit.status.blocks_assignment() {
            return Err(DomainError::Conflict(ConflictKind::AlreadyAssigned));
        }

        // Step A: claim the unit. If this fails, no roster entry exists
        // and both aggregates are untouched.
        self.equipment
            .set_assignment_state(
                equipment_id,
                None,
                AssignmentTarget::Assigned { site_id, date },
            )
            .await
            .map_err(equipment_err)?;

        // Step B: record the roster entry.
        match self.sites.add_roster_entry(site_id, equipment_id, date).await {
            Ok(entry) => Ok(entry),
            Err(StoreError::Conflict(kind)) => {
                // Deterministic refusal; retrying cannot help. Release the
                // unit and surface the conflict unchanged.
                self.revert_claim(equipment_id, site_id, date, "assign").await;
                Err(DomainError::Conflict(kind))
            }
            Err(first_err) => {
                tracing::warn!(
                    %site_id,
                    %equipment_id,
                    error = %first_err,
                    "roster write failed after equipment was claimed; retrying"
                );
                match self.sites.add_roster_entry(site_id, equipment_id, date).await {
                    Ok(entry) => Ok(entry),
                    Err(second_err) => {
                        tracing::error!(
                            %site_id,
                            %equipment_id,
                            error = %second_err,
                            "roster write failed after bounded retry; reverting equipment claim"
                        );
                        self.revert_claim(equipment_id, site_id, date, "assign").await;
                        Err(DomainError::PartialFailure {
                            operation: "assign",
                            completed: "equipment",
                            failed: "site roster",
                        })
                    }
                }
            }
        }
    }

    /// Returns a unit from a site, closing the given roster entry.
    pub async fn return_equipment(
        &self,
        principal: &Principal,
        site_id: Uuid,
        entry_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, DomainError> {
        let site = self.sites.get(site_id).await.map_err(site_err)?;
        policy::authorize(principal, &Action::ReturnEquipment(&site))?;

        // Step A: close the roster entry. The unit stays marked in-use
        // until the equipment write lands, which is the conservative side.
        let entry = self
            .sites
            .close_roster_entry(site_id, entry_id, date)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => DomainError::NotFound("roster entry"),
                StoreError::Conflict(kind) => DomainError::Conflict(kind),
                StoreError::Backend(msg) => DomainError::Storage(msg),
            })?;

        // Step B: release the unit, expecting it to still point here.
        let clear = AssignmentTarget::Cleared { date };
        match self
            .equipment
            .set_assignment_state(entry.equipment_id, Some(site_id), clear)
            .await
        {
            Ok(_) => Ok(entry),
            Err(StoreError::Backend(first_err)) => {
                tracing::warn!(
                    %site_id,
                    entry_id = %entry.id,
                    equipment_id = %entry.equipment_id,
                    error = %first_err,
                    "equipment release failed after roster entry was closed; retrying"
                );
                match self
                    .equipment
                    .set_assignment_state(entry.equipment_id, Some(site_id), clear)
                    .await
                {
                    Ok(_) => Ok(entry),
                    Err(second_err) => {
                        tracing::error!(
                            %site_id,
                            entry_id = %entry.id,
                            equipment_id = %entry.equipment_id,
                            error = %second_err,
                            "equipment release failed after bounded retry; reopening roster entry"
                        );
                        self.reopen_entry(site_id, entry.id, "return").await;
                        Err(DomainError::PartialFailure {
                            operation: "return",
                            completed: "site roster",
                            failed: "equipment",
                        })
                    }
                }
            }
            Err(other) => {
                // NotFound or a conflicting location: pre-existing
                // divergence this return cannot repair. Undo the close and
                // report what the store saw.
                self.reopen_entry(site_id, entry.id, "return").await;
                Err(match other {
                    StoreError::NotFound => DomainError::NotFound("equipment"),
                    StoreError::Conflict(kind) => DomainError::Conflict(kind),
                    StoreError::Backend(msg) => DomainError::Storage(msg),
                })
            }
        }
    }

    /// Moves a unit to another site: a `return` followed by an `assign`,
    /// as two sequential engine calls. Between them the unit is briefly
    /// unassigned everywhere, which is the accepted window.
    pub async fn reassign(
        &self,
        principal: &Principal,
        equipment_id: Uuid,
        to_site_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<RosterEntry, DomainError> {
        let unit = self.equipment.get(equipment_id).await.map_err(equipment_err)?;

        if let Some(from_site_id) = unit.location.current_site_id {
            let entry = self
                .sites
                .find_open_entry(from_site_id, equipment_id)
                .await
                .map_err(site_err)?
                .ok_or(DomainError::NotFound("roster entry"))?;
            self.return_equipment(principal, from_site_id, entry.id, date)
                .await?;
        }

        self.assign(principal, to_site_id, equipment_id, date).await
    }

    /// Returns every unit currently at a site. Used before site deletion;
    /// the delete must not proceed if any forced return fails.
    pub async fn force_return_site(
        &self,
        principal: &Principal,
        site_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<usize, DomainError> {
        let entries = self.sites.open_roster_entries(site_id).await.map_err(site_err)?;
        let count = entries.len();
        for entry in entries {
            self.return_equipment(principal, site_id, entry.id, date).await?;
        }
        Ok(count)
    }

    /// Returns a unit from wherever it currently is, if anywhere. Used
    /// before equipment deletion. Returns whether a return was needed.
    pub async fn force_return_equipment(
        &self,
        principal: &Principal,
        equipment_id: Uuid,
        date: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let unit = self.equipment.get(equipment_id).await.map_err(equipment_err)?;

        let Some(site_id) = unit.location.current_site_id else {
            return Ok(false);
        };

        let entry = self
            .sites
            .find_open_entry(site_id, equipment_id)
            .await
            .map_err(site_err)?
            .ok_or(DomainError::NotFound("roster entry"))?;

        self.return_equipment(principal, site_id, entry.id, date).await?;
        Ok(true)
    }

    /// Compensation: release a unit claimed by a failed assign. A failure
    /// here leaves the conservative divergence (unit unavailable, no
    /// roster entry) and is logged for manual reconciliation.
    async fn revert_claim(
        &self,
        equipment_id: Uuid,
        site_id: Uuid,
        date: DateTime<Utc>,
        operation: &'static str,
    ) {
        if let Err(e) = self
            .equipment
            .set_assignment_state(
                equipment_id,
                Some(site_id),
                AssignmentTarget::Cleared { date },
            )
            .await
        {
            tracing::error!(
                %equipment_id,
                %site_id,
                operation,
                error = %e,
                "failed to revert equipment claim; aggregates left divergent"
            );
        }
    }

    /// Compensation: reopen a roster entry closed by a failed return.
    async fn reopen_entry(&self, site_id: Uuid, entry_id: Uuid, operation: &'static str) {
        if let Err(e) = self.sites.reopen_roster_entry(site_id, entry_id).await {
            tracing::error!(
                %site_id,
                %entry_id,
                operation,
                error = %e,
                "failed to reopen roster entry; aggregates left divergent"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::equipment::{
        Equipment, EquipmentKind, EquipmentLocation, EquipmentStatus, Specifications, UsageRecord,
    };
    use crate::models::site::{ClientInfo, Site, SiteLocation, SiteStatus};
    use crate::models::user::Role;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // ------------------------------------------------------------------
    // In-memory stores implementing the contracts of `stores.rs`.
    // ------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct MemEquipmentStore {
        records: Arc<Mutex<HashMap<Uuid, Equipment>>>,
        usage: Arc<Mutex<Vec<UsageRecord>>>,
    }

    impl MemEquipmentStore {
        fn insert(&self, unit: Equipment) {
            self.records.lock().unwrap().insert(unit.id, unit);
        }

        fn snapshot(&self, id: Uuid) -> Equipment {
            self.records.lock().unwrap().get(&id).unwrap().clone()
        }

        fn usage_records(&self, id: Uuid) -> Vec<UsageRecord> {
            self.usage
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.equipment_id == id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl EquipmentStore for MemEquipmentStore {
        async fn get(&self, id: Uuid) -> Result<Equipment, StoreError> {
            self.records
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn set_assignment_state(
            &self,
            id: Uuid,
            expected_prior_site: Option<Uuid>,
            target: AssignmentTarget,
        ) -> Result<Equipment, StoreError> {
            let mut records = self.records.lock().unwrap();
            let unit = records.get_mut(&id).ok_or(StoreError::NotFound)?;

            // Idempotent: the target state is already in place.
            if unit.location.current_site_id == target.site_id() {
                return Ok(unit.clone());
            }

            if unit.location.current_site_id != expected_prior_site {
                return Err(StoreError::Conflict(ConflictKind::AlreadyAssigned));
            }

            match target {
                AssignmentTarget::Assigned { site_id, date } => {
                    if unit.status.blocks_assignment() {
                        return Err(StoreError::Conflict(ConflictKind::AlreadyAssigned));
                    }
                    unit.location.current_site_id = Some(site_id);
                    unit.status = EquipmentStatus::InUse;
                    self.usage.lock().unwrap().push(UsageRecord {
                        id: Uuid::new_v4(),
                        equipment_id: id,
                        site_id,
                        start_date: date,
                        end_date: None,
                        hours_used: None,
                    });
                }
                AssignmentTarget::Cleared { date } => {
                    unit.location.current_site_id = None;
                    unit.location.assigned_to_user_id = None;
                    if !unit.status.blocks_assignment() {
                        unit.status = EquipmentStatus::Available;
                    }
                    if let Some(open) = self
                        .usage
                        .lock()
                        .unwrap()
                        .iter_mut()
                        .rev()
                        .find(|r| r.equipment_id == id && r.end_date.is_none())
                    {
                        open.end_date = Some(date);
                    }
                }
            }

            unit.updated_at = Utc::now();
            Ok(unit.clone())
        }
    }

    #[derive(Clone, Default)]
    struct MemSiteStore {
        sites: Arc<Mutex<HashMap<Uuid, Site>>>,
        roster: Arc<Mutex<Vec<RosterEntry>>>,
    }

    impl MemSiteStore {
        fn insert(&self, site: Site) {
            self.sites.lock().unwrap().insert(site.id, site);
        }

        fn entries(&self, site_id: Uuid) -> Vec<RosterEntry> {
            self.roster
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.site_id == site_id)
                .cloned()
                .collect()
        }

        fn all_entries(&self) -> Vec<RosterEntry> {
            self.roster.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SiteStore for MemSiteStore {
        async fn get(&self, id: Uuid) -> Result<Site, StoreError> {
            self.sites
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn add_roster_entry(
            &self,
            site_id: Uuid,
            equipment_id: Uuid,
            date: DateTime<Utc>,
        ) -> Result<RosterEntry, StoreError> {
            if !self.sites.lock().unwrap().contains_key(&site_id) {
                return Err(StoreError::NotFound);
            }
            let mut roster = self.roster.lock().unwrap();
            for entry in roster.iter() {
                if entry.equipment_id == equipment_id && entry.is_open() {
                    return Err(if entry.site_id == site_id {
                        StoreError::Conflict(ConflictKind::AlreadyOpenHere)
                    } else {
                        StoreError::Conflict(ConflictKind::AlreadyAssigned)
                    });
                }
            }
            let entry = RosterEntry {
                id: Uuid::new_v4(),
                site_id,
                equipment_id,
                assigned_date: date,
                return_date: None,
            };
            roster.push(entry.clone());
            Ok(entry)
        }

        async fn close_roster_entry(
            &self,
            site_id: Uuid,
            entry_id: Uuid,
            date: DateTime<Utc>,
        ) -> Result<RosterEntry, StoreError> {
            let mut roster = self.roster.lock().unwrap();
            let entry = roster
                .iter_mut()
                .find(|e| e.id == entry_id && e.site_id == site_id)
                .ok_or(StoreError::NotFound)?;
            if entry.return_date.is_some() {
                return Err(StoreError::Conflict(ConflictKind::AlreadyClosed));
            }
            entry.return_date = Some(date);
            Ok(entry.clone())
        }

        async fn reopen_roster_entry(
            &self,
            site_id: Uuid,
            entry_id: Uuid,
        ) -> Result<RosterEntry, StoreError> {
            let mut roster = self.roster.lock().unwrap();
            let entry = roster
                .iter_mut()
                .find(|e| e.id == entry_id && e.site_id == site_id)
                .ok_or(StoreError::NotFound)?;
            entry.return_date = None;
            Ok(entry.clone())
        }

        async fn open_roster_entries(
            &self,
            site_id: Uuid,
        ) -> Result<Vec<RosterEntry>, StoreError> {
            Ok(self
                .roster
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.site_id == site_id && e.is_open())
                .cloned()
                .collect())
        }

        async fn find_open_entry(
            &self,
            site_id: Uuid,
            equipment_id: Uuid,
        ) -> Result<Option<RosterEntry>, StoreError> {
            Ok(self
                .roster
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.site_id == site_id && e.equipment_id == equipment_id && e.is_open())
                .cloned())
        }
    }

    /// Site store that fails its next N mutations with a backend error.
    #[derive(Clone)]
    struct FlakySiteStore {
        inner: MemSiteStore,
        failing_adds: Arc<AtomicUsize>,
    }

    impl FlakySiteStore {
        fn new(inner: MemSiteStore) -> Self {
            Self {
                inner,
                failing_adds: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn fail_next_adds(&self, n: usize) {
            self.failing_adds.store(n, Ordering::SeqCst);
        }

        fn take_failure(&self, counter: &AtomicUsize) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl SiteStore for FlakySiteStore {
        async fn get(&self, id: Uuid) -> Result<Site, StoreError> {
            self.inner.get(id).await
        }

        async fn add_roster_entry(
            &self,
            site_id: Uuid,
            equipment_id: Uuid,
            date: DateTime<Utc>,
        ) -> Result<RosterEntry, StoreError> {
            if self.take_failure(&self.failing_adds) {
                return Err(StoreError::Backend("injected roster failure".to_string()));
            }
            self.inner.add_roster_entry(site_id, equipment_id, date).await
        }

        async fn close_roster_entry(
            &self,
            site_id: Uuid,
            entry_id: Uuid,
            date: DateTime<Utc>,
        ) -> Result<RosterEntry, StoreError> {
            self.inner.close_roster_entry(site_id, entry_id, date).await
        }

        async fn reopen_roster_entry(
            &self,
            site_id: Uuid,
            entry_id: Uuid,
        ) -> Result<RosterEntry, StoreError> {
            self.inner.reopen_roster_entry(site_id, entry_id).await
        }

        async fn open_roster_entries(
            &self,
            site_id: Uuid,
        ) -> Result<Vec<RosterEntry>, StoreError> {
            self.inner.open_roster_entries(site_id).await
        }

        async fn find_open_entry(
            &self,
            site_id: Uuid,
            equipment_id: Uuid,
        ) -> Result<Option<RosterEntry>, StoreError> {
            self.inner.find_open_entry(site_id, equipment_id).await
        }
    }

    /// Equipment store that fails its next N state transitions.
    #[derive(Clone)]
    struct FlakyEquipmentStore {
        inner: MemEquipmentStore,
        failing_sets: Arc<AtomicUsize>,
    }

    impl FlakyEquipmentStore {
        fn new(inner: MemEquipmentStore) -> Self {
            Self {
                inner,
                failing_sets: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn fail_next_sets(&self, n: usize) {
            self.failing_sets.store(n, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EquipmentStore for FlakyEquipmentStore {
        async fn get(&self, id: Uuid) -> Result<Equipment, StoreError> {
            self.inner.get(id).await
        }

        async fn set_assignment_state(
            &self,
            id: Uuid,
            expected_prior_site: Option<Uuid>,
            target: AssignmentTarget,
        ) -> Result<Equipment, StoreError> {
            let injected = self
                .failing_sets
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(StoreError::Backend(
                    "injected equipment failure".to_string(),
                ));
            }
            self.inner
                .set_assignment_state(id, expected_prior_site, target)
                .await
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    fn admin() -> Principal {
        Principal::new(Uuid::new_v4(), Role::Admin)
    }

    fn make_site(chief_id: Uuid) -> Site {
        Site {
            id: Uuid::new_v4(),
            name: "Tour Horizon".to_string(),
            created_by: Uuid::new_v4(),
            chief_id,
            location: SiteLocation {
                address: "3 rue des Forges".to_string(),
                city: "Lille".to_string(),
                latitude: None,
                longitude: None,
            },
            client: ClientInfo {
                name: "Foncia".to_string(),
                phone: None,
                email: None,
            },
            status: SiteStatus::InProgress,
            start_date: Utc::now(),
            estimated_end_date: Utc::now(),
            actual_end_date: None,
            budget_estimated: 1_000_000.0,
            budget_actual: 0.0,
            description: None,
            progress: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_equipment(status: EquipmentStatus) -> Equipment {
        Equipment {
            id: Uuid::new_v4(),
            name: "Tower crane".to_string(),
            kind: EquipmentKind::HeavyMachine,
            identifier: format!("CR-{}", Uuid::new_v4().simple()),
            status,
            created_by: Uuid::new_v4(),
            location: EquipmentLocation::default(),
            specifications: Specifications::default(),
            last_maintenance: None,
            next_maintenance_due: None,
            total_hours: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Harness {
        engine: AssignmentEngine<MemEquipmentStore, MemSiteStore>,
        equipment: MemEquipmentStore,
        sites: MemSiteStore,
    }

    fn harness() -> Harness {
        let equipment = MemEquipmentStore::default();
        let sites = MemSiteStore::default();
        let engine = AssignmentEngine::new(equipment.clone(), sites.clone());
        Harness {
            engine,
            equipment,
            sites,
        }
    }

    /// Checks, at rest, that every unit's status matches its location and
    /// that the roster agrees with the equipment side everywhere.
    fn assert_invariants(equipment: &MemEquipmentStore, sites: &MemSiteStore) {
        let units: Vec<Equipment> = equipment.records.lock().unwrap().values().cloned().collect();
        let entries = sites.all_entries();

        for unit in &units {
            assert!(
                unit.assignment_state_consistent(),
                "status does not match location for {}",
                unit.identifier
            );

            let open: Vec<&RosterEntry> = entries
                .iter()
                .filter(|e| e.equipment_id == unit.id && e.is_open())
                .collect();

            match unit.location.current_site_id {
                Some(site_id) => {
                    assert_eq!(open.len(), 1, "assigned unit must have one open entry");
                    assert_eq!(
                        open[0].site_id, site_id,
                        "open entry points at a different site"
                    );
                }
                None => assert!(open.is_empty(), "dangling open roster entry"),
            }
        }

        // No unit may be open at two sites at once.
        for entry in entries.iter().filter(|e| e.is_open()) {
            let dupes = entries
                .iter()
                .filter(|e| e.equipment_id == entry.equipment_id && e.is_open())
                .count();
            assert_eq!(dupes, 1, "unit has multiple open roster entries");
        }
    }

    // ------------------------------------------------------------------
    // Scenarios
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn assign_marks_unit_in_use_and_opens_entry() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let entry = h
            .engine
            .assign(&p, site.id, unit.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(entry.site_id, site.id);
        assert_eq!(entry.equipment_id, unit.id);
        assert!(entry.is_open());

        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.status, EquipmentStatus::InUse);
        assert_eq!(after.location.current_site_id, Some(site.id));

        let usage = h.equipment.usage_records(unit.id);
        assert_eq!(usage.len(), 1);
        assert!(usage[0].end_date.is_none());

        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn assign_by_foreign_chef_is_forbidden() {
        let h = harness();
        let chief = Uuid::new_v4();
        let site = make_site(chief);
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let stranger = Principal::new(Uuid::new_v4(), Role::Chef);
        let result = h.engine.assign(&stranger, site.id, unit.id, Utc::now()).await;

        assert_eq!(result, Err(DomainError::Forbidden));
        // Denials are never partially applied.
        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.status, EquipmentStatus::Available);
        assert!(h.sites.entries(site.id).is_empty());
    }

    #[tokio::test]
    async fn site_chief_may_assign_to_own_site() {
        let h = harness();
        let chief = Principal::new(Uuid::new_v4(), Role::Chef);
        let site = make_site(chief.id);
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        assert!(h.engine.assign(&chief, site.id, unit.id, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn assign_to_second_site_conflicts_and_leaves_state_unchanged() {
        let h = harness();
        let p = admin();
        let s1 = make_site(Uuid::new_v4());
        let s2 = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(s1.clone());
        h.sites.insert(s2.clone());
        h.equipment.insert(unit.clone());

        h.engine.assign(&p, s1.id, unit.id, Utc::now()).await.unwrap();
        let result = h.engine.assign(&p, s2.id, unit.id, Utc::now()).await;

        assert_eq!(
            result,
            Err(DomainError::Conflict(ConflictKind::AlreadyAssigned))
        );
        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, Some(s1.id));
        assert!(h.sites.entries(s2.id).is_empty());
        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn assign_refuses_units_under_maintenance() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        h.sites.insert(site.clone());

        for status in [EquipmentStatus::Maintenance, EquipmentStatus::OutOfService] {
            let unit = make_equipment(status);
            h.equipment.insert(unit.clone());
            let result = h.engine.assign(&p, site.id, unit.id, Utc::now()).await;
            assert_eq!(
                result,
                Err(DomainError::Conflict(ConflictKind::AlreadyAssigned))
            );
        }
    }

    #[tokio::test]
    async fn assign_missing_aggregates_not_found() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        assert_eq!(
            h.engine.assign(&p, Uuid::new_v4(), unit.id, Utc::now()).await,
            Err(DomainError::NotFound("site"))
        );
        assert_eq!(
            h.engine.assign(&p, site.id, Uuid::new_v4(), Utc::now()).await,
            Err(DomainError::NotFound("equipment"))
        );
    }

    #[tokio::test]
    async fn return_releases_unit_and_closes_entry() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let entry = h.engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();
        let closed = h
            .engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await
            .unwrap();

        assert!(closed.return_date.is_some());

        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.status, EquipmentStatus::Available);
        assert_eq!(after.location.current_site_id, None);

        let usage = h.equipment.usage_records(unit.id);
        assert_eq!(usage.len(), 1);
        assert!(usage[0].end_date.is_some());

        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn double_return_conflicts_already_closed() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let entry = h.engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();
        h.engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await
            .unwrap();

        let result = h
            .engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await;
        assert_eq!(
            result,
            Err(DomainError::Conflict(ConflictKind::AlreadyClosed))
        );
        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn set_assignment_state_is_idempotent() {
        let h = harness();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let date = Utc::now();
        let target = AssignmentTarget::Assigned { site_id: site.id, date };

        let first = h
            .equipment
            .set_assignment_state(unit.id, None, target)
            .await
            .unwrap();
        // Re-applying the same target is a no-op success, not an error.
        let second = h
            .equipment
            .set_assignment_state(unit.id, None, target)
            .await
            .unwrap();

        assert_eq!(first.location, second.location);
        assert_eq!(first.status, second.status);
        assert_eq!(h.equipment.usage_records(unit.id).len(), 1);
    }

    #[tokio::test]
    async fn concurrent_assigns_resolve_to_one_winner() {
        let h = harness();
        let p = admin();
        let s1 = make_site(Uuid::new_v4());
        let s2 = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(s1.clone());
        h.sites.insert(s2.clone());
        h.equipment.insert(unit.clone());

        let e1 = h.engine.clone();
        let e2 = h.engine.clone();
        let (u, a, b) = (unit.id, s1.id, s2.id);

        let t1 = tokio::spawn(async move { e1.assign(&p, a, u, Utc::now()).await });
        let t2 = tokio::spawn(async move { e2.assign(&p, b, u, Utc::now()).await });

        let r1 = t1.await.unwrap();
        let r2 = t2.await.unwrap();

        let successes = [&r1, &r2].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one concurrent assign may win");

        let loser = if r1.is_ok() { r2 } else { r1 };
        assert_eq!(
            loser,
            Err(DomainError::Conflict(ConflictKind::AlreadyAssigned))
        );
        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn roster_failure_heals_on_bounded_retry() {
        let equipment = MemEquipmentStore::default();
        let sites = FlakySiteStore::new(MemSiteStore::default());
        let engine = AssignmentEngine::new(equipment.clone(), sites.clone());

        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        sites.inner.insert(site.clone());
        equipment.insert(unit.clone());

        sites.fail_next_adds(1);
        let entry = engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();

        assert!(entry.is_open());
        let after = equipment.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, Some(site.id));
        assert_invariants(&equipment, &sites.inner);
    }

    #[tokio::test]
    async fn persistent_roster_failure_reverts_and_reports_partial_failure() {
        let equipment = MemEquipmentStore::default();
        let sites = FlakySiteStore::new(MemSiteStore::default());
        let engine = AssignmentEngine::new(equipment.clone(), sites.clone());

        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        sites.inner.insert(site.clone());
        equipment.insert(unit.clone());

        // Initial write and its one retry both fail.
        sites.fail_next_adds(2);
        let result = engine.assign(&p, site.id, unit.id, Utc::now()).await;

        assert_eq!(
            result,
            Err(DomainError::PartialFailure {
                operation: "assign",
                completed: "equipment",
                failed: "site roster",
            })
        );

        // The equipment claim was reverted; both aggregates are consistent
        // and the whole operation is safe to re-attempt.
        let after = equipment.snapshot(unit.id);
        assert_eq!(after.status, EquipmentStatus::Available);
        assert_eq!(after.location.current_site_id, None);
        assert!(sites.inner.entries(site.id).is_empty());
        assert_invariants(&equipment, &sites.inner);

        // The retried operation succeeds cleanly.
        assert!(engine.assign(&p, site.id, unit.id, Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn persistent_release_failure_reopens_entry_and_reports_partial_failure() {
        let equipment = FlakyEquipmentStore::new(MemEquipmentStore::default());
        let sites = MemSiteStore::default();
        let engine = AssignmentEngine::new(equipment.clone(), sites.clone());

        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        sites.insert(site.clone());
        equipment.inner.insert(unit.clone());

        let entry = engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();

        equipment.fail_next_sets(2);
        let result = engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await;

        assert_eq!(
            result,
            Err(DomainError::PartialFailure {
                operation: "return",
                completed: "site roster",
                failed: "equipment",
            })
        );

        // The close was compensated: the entry is open again and the unit
        // still shows in-use at the site.
        let entries = sites.entries(site.id);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_open());
        let after = equipment.inner.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, Some(site.id));
        assert_invariants(&equipment.inner, &sites);

        // The retried return completes.
        assert!(engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn transient_release_failure_heals_on_retry() {
        let equipment = FlakyEquipmentStore::new(MemEquipmentStore::default());
        let sites = MemSiteStore::default();
        let engine = AssignmentEngine::new(equipment.clone(), sites.clone());

        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        sites.insert(site.clone());
        equipment.inner.insert(unit.clone());

        let entry = engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();

        equipment.fail_next_sets(1);
        let closed = engine
            .return_equipment(&p, site.id, entry.id, Utc::now())
            .await
            .unwrap();

        assert!(closed.return_date.is_some());
        let after = equipment.inner.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, None);
        assert_invariants(&equipment.inner, &sites);
    }

    #[tokio::test]
    async fn reassign_moves_unit_between_sites() {
        let h = harness();
        let p = admin();
        let s1 = make_site(Uuid::new_v4());
        let s2 = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(s1.clone());
        h.sites.insert(s2.clone());
        h.equipment.insert(unit.clone());

        h.engine.assign(&p, s1.id, unit.id, Utc::now()).await.unwrap();
        let entry = h
            .engine
            .reassign(&p, unit.id, s2.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(entry.site_id, s2.id);
        assert!(entry.is_open());

        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, Some(s2.id));

        // The stint at the first site is closed history now.
        let s1_entries = h.sites.entries(s1.id);
        assert_eq!(s1_entries.len(), 1);
        assert!(!s1_entries[0].is_open());

        // Usage history carries both stints.
        let usage = h.equipment.usage_records(unit.id);
        assert_eq!(usage.len(), 2);
        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn reassign_of_unassigned_unit_plain_assigns() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        let entry = h
            .engine
            .reassign(&p, unit.id, site.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(entry.site_id, site.id);
    }

    #[tokio::test]
    async fn force_return_empties_a_site() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        h.sites.insert(site.clone());

        let mut ids = Vec::new();
        for _ in 0..3 {
            let unit = make_equipment(EquipmentStatus::Available);
            ids.push(unit.id);
            h.equipment.insert(unit);
        }
        for id in &ids {
            h.engine.assign(&p, site.id, *id, Utc::now()).await.unwrap();
        }

        let returned = h
            .engine
            .force_return_site(&p, site.id, Utc::now())
            .await
            .unwrap();
        assert_eq!(returned, 3);

        for id in &ids {
            let unit = h.equipment.snapshot(*id);
            assert_eq!(unit.status, EquipmentStatus::Available);
            assert_eq!(unit.location.current_site_id, None);
        }
        assert!(h.sites.entries(site.id).iter().all(|e| !e.is_open()));
        assert_invariants(&h.equipment, &h.sites);
    }

    #[tokio::test]
    async fn force_return_equipment_clears_its_single_stint() {
        let h = harness();
        let p = admin();
        let site = make_site(Uuid::new_v4());
        let unit = make_equipment(EquipmentStatus::Available);
        h.sites.insert(site.clone());
        h.equipment.insert(unit.clone());

        h.engine.assign(&p, site.id, unit.id, Utc::now()).await.unwrap();

        let did_return = h
            .engine
            .force_return_equipment(&p, unit.id, Utc::now())
            .await
            .unwrap();
        assert!(did_return);

        let after = h.equipment.snapshot(unit.id);
        assert_eq!(after.location.current_site_id, None);
        assert_invariants(&h.equipment, &h.sites);

        // No-op when the unit is idle.
        let did_return = h
            .engine
            .force_return_equipment(&p, unit.id, Utc::now())
            .await
            .unwrap();
        assert!(!did_return);
    }
}
