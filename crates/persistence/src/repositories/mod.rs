//! Repository implementations over the PostgreSQL pool.

pub mod equipment;
pub mod site;
pub mod user;

pub use equipment::EquipmentRepository;
pub use site::SiteRepository;
pub use user::UserRepository;

use domain::stores::StoreError;

/// Maps a low-level sqlx error into the store error taxonomy.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

/// True for PostgreSQL unique constraint violations (SQLSTATE 23505).
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// True for PostgreSQL foreign key violations (SQLSTATE 23503).
pub(crate) fn is_fk_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23503"))
}
