//! Database entity definitions.
//!
//! Entities are direct mappings to database rows; conversion into the
//! richer domain types happens at the repository boundary.

pub mod equipment;
pub mod site;
pub mod user;

pub use equipment::{EquipmentEntity, EquipmentWithSiteEntity, UsageRecordEntity};
pub use site::{
    RosterEntryEntity, RosterEntryWithEquipmentEntity, SiteEntity, SiteSummaryEntity,
};
pub use user::UserEntity;
