//! Authorization policy.
//!
//! A pure predicate over `(principal, action)`. It performs no I/O and
//! never mutates state, so callers may evaluate it speculatively before
//! taking any locks or writing anything.
//!
//! Rules:
//! - Creating or deleting sites and any equipment mutation: Admin only.
//! - Updating a site: Admin may touch any field; the site's own Chef may
//!   touch only status and progress. A Chef patch that also touches other
//!   fields is rejected wholesale, never partially applied.
//! - Viewing sites: Admin sees all; a Chef sees only their own sites.
//! - Assigning/returning equipment at a site: same rule as updating it.
//! - The equipment inventory is global: any authenticated principal may
//!   list and inspect it.

use crate::error::DomainError;
use crate::models::site::{Site, UpdateSiteRequest};
use crate::models::user::Principal;
use uuid::Uuid;

/// An action a principal is asking to perform.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    CreateSite,
    ViewSite(&'a Site),
    UpdateSite {
        site: &'a Site,
        patch: &'a UpdateSiteRequest,
    },
    DeleteSite(&'a Site),
    AssignEquipment(&'a Site),
    ReturnEquipment(&'a Site),
    CreateEquipment,
    UpdateEquipment,
    DeleteEquipment,
    ListEquipment,
    ViewEquipmentDetail,
}

/// Which sites a principal may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteVisibility {
    /// Every site.
    All,
    /// Only sites whose chief is this user.
    ChiefOf(Uuid),
}

/// Evaluates the policy. `Ok(())` means the action is permitted; any
/// denial is `DomainError::Forbidden`.
pub fn authorize(principal: &Principal, action: &Action<'_>) -> Result<(), DomainError> {
    let allowed = match action {
        Action::CreateSite
        | Action::DeleteSite(_)
        | Action::CreateEquipment
        | Action::UpdateEquipment
        | Action::DeleteEquipment => principal.role.is_admin(),

        Action::ViewSite(site) => can_view_site(principal, site),

        Action::UpdateSite { site, patch } => {
            principal.role.is_admin()
                || (site.chief_id == principal.id && patch.touches_only_chief_editable())
        }

        Action::AssignEquipment(site) | Action::ReturnEquipment(site) => {
            principal.role.is_admin() || site.chief_id == principal.id
        }

        Action::ListEquipment | Action::ViewEquipmentDetail => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(DomainError::Forbidden)
    }
}

/// True when the principal may see this site.
pub fn can_view_site(principal: &Principal, site: &Site) -> bool {
    principal.role.is_admin() || site.chief_id == principal.id
}

/// The visibility filter the query facade applies to site listings.
pub fn site_visibility(principal: &Principal) -> SiteVisibility {
    if principal.role.is_admin() {
        SiteVisibility::All
    } else {
        SiteVisibility::ChiefOf(principal.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::site::{ClientInfo, SiteLocation, SiteStatus};
    use crate::models::user::Role;
    use chrono::Utc;

    fn site_with_chief(chief_id: Uuid) -> Site {
        Site {
            id: Uuid::new_v4(),
            name: "Pont de l'Est".to_string(),
            created_by: Uuid::new_v4(),
            chief_id,
            location: SiteLocation {
                address: "1 avenue des Travaux".to_string(),
                city: "Lyon".to_string(),
                latitude: None,
                longitude: None,
            },
            client: ClientInfo {
                name: "Metropole".to_string(),
                phone: None,
                email: None,
            },
            status: SiteStatus::InProgress,
            start_date: Utc::now(),
            estimated_end_date: Utc::now(),
            actual_end_date: None,
            budget_estimated: 500_000.0,
            budget_actual: 0.0,
            description: None,
            progress: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn admin() -> Principal {
        Principal::new(Uuid::new_v4(), Role::Admin)
    }

    fn chef(id: Uuid) -> Principal {
        Principal::new(id, Role::Chef)
    }

    #[test]
    fn admin_may_do_everything() {
        let p = admin();
        let site = site_with_chief(Uuid::new_v4());
        let patch = UpdateSiteRequest {
            name: Some("Renamed".to_string()),
            chief_id: Some(Uuid::new_v4()),
            ..Default::default()
        };

        assert!(authorize(&p, &Action::CreateSite).is_ok());
        assert!(authorize(&p, &Action::DeleteSite(&site)).is_ok());
        assert!(authorize(&p, &Action::UpdateSite { site: &site, patch: &patch }).is_ok());
        assert!(authorize(&p, &Action::AssignEquipment(&site)).is_ok());
        assert!(authorize(&p, &Action::CreateEquipment).is_ok());
        assert!(authorize(&p, &Action::DeleteEquipment).is_ok());
    }

    #[test]
    fn chef_cannot_create_or_delete_sites() {
        let p = chef(Uuid::new_v4());
        let site = site_with_chief(p.id);

        assert_eq!(
            authorize(&p, &Action::CreateSite),
            Err(DomainError::Forbidden)
        );
        // Delete is Admin-only even for the site's own chief.
        assert_eq!(
            authorize(&p, &Action::DeleteSite(&site)),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn chef_may_update_status_and_progress_of_own_site() {
        let p = chef(Uuid::new_v4());
        let site = site_with_chief(p.id);
        let patch = UpdateSiteRequest {
            status: Some(SiteStatus::Paused),
            progress: Some(55),
            ..Default::default()
        };

        assert!(authorize(&p, &Action::UpdateSite { site: &site, patch: &patch }).is_ok());
    }

    #[test]
    fn chef_patch_touching_name_rejected_wholesale() {
        let p = chef(Uuid::new_v4());
        let site = site_with_chief(p.id);
        // Mixing an allowed field with a restricted one must fail the
        // whole request, not silently apply the allowed part.
        let patch = UpdateSiteRequest {
            status: Some(SiteStatus::Paused),
            name: Some("Sneaky rename".to_string()),
            ..Default::default()
        };

        assert_eq!(
            authorize(&p, &Action::UpdateSite { site: &site, patch: &patch }),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn chef_cannot_update_someone_elses_site() {
        let p = chef(Uuid::new_v4());
        let site = site_with_chief(Uuid::new_v4());
        let patch = UpdateSiteRequest {
            progress: Some(10),
            ..Default::default()
        };

        assert_eq!(
            authorize(&p, &Action::UpdateSite { site: &site, patch: &patch }),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn assign_follows_update_rule() {
        let owner = chef(Uuid::new_v4());
        let stranger = chef(Uuid::new_v4());
        let site = site_with_chief(owner.id);

        assert!(authorize(&owner, &Action::AssignEquipment(&site)).is_ok());
        assert!(authorize(&owner, &Action::ReturnEquipment(&site)).is_ok());
        assert_eq!(
            authorize(&stranger, &Action::AssignEquipment(&site)),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn equipment_inventory_is_global() {
        let p = chef(Uuid::new_v4());
        assert!(authorize(&p, &Action::ListEquipment).is_ok());
        assert!(authorize(&p, &Action::ViewEquipmentDetail).is_ok());
        // Mutations stay Admin-only.
        assert_eq!(
            authorize(&p, &Action::CreateEquipment),
            Err(DomainError::Forbidden)
        );
        assert_eq!(
            authorize(&p, &Action::UpdateEquipment),
            Err(DomainError::Forbidden)
        );
    }

    #[test]
    fn visibility_filter() {
        let a = admin();
        let c = chef(Uuid::new_v4());

        assert_eq!(site_visibility(&a), SiteVisibility::All);
        assert_eq!(site_visibility(&c), SiteVisibility::ChiefOf(c.id));

        let own = site_with_chief(c.id);
        let other = site_with_chief(Uuid::new_v4());
        assert!(can_view_site(&c, &own));
        assert!(!can_view_site(&c, &other));
        assert!(can_view_site(&a, &other));
    }
}
