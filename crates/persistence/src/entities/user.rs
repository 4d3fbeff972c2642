//! User entity.

use chrono::{DateTime, Utc};
use domain::models::user::{Role, User};
use domain::stores::StoreError;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Row mapping for the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserEntity {
    /// Converts the row into the domain model. The role column is
    /// CHECK-constrained, so a parse failure means a corrupted row.
    pub fn into_domain(self) -> Result<User, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|e| StoreError::Backend(format!("corrupt user row {}: {}", self.id, e)))?;

        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
        })
    }
}
