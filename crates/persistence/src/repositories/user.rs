//! User repository for database operations.

use chrono::Utc;
use domain::error::ConflictKind;
use domain::models::user::{Role, User};
use domain::stores::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::UserEntity;
use crate::repositories::{is_unique_violation, map_sqlx};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, is_active, created_at, updated_at, last_login_at";

/// Repository for user-related database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a user account. A duplicate email surfaces as a conflict.
    pub async fn create(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<User, StoreError> {
        let entity = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(ConflictKind::DuplicateIdentifier)
            } else {
                map_sqlx(e)
            }
        })?;

        entity.into_domain()
    }

    /// Finds a user by id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let entity = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        entity.map(UserEntity::into_domain).transpose()
    }

    /// Finds a user by email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let entity = sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        entity.map(UserEntity::into_domain).transpose()
    }

    /// Updates a user's display name.
    pub async fn update_name(&self, id: Uuid, name: &str) -> Result<User, StoreError> {
        let entity = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            UPDATE users
            SET name = $2, updated_at = $3
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::NotFound)?;

        entity.into_domain()
    }

    /// Sets a user's role. Only reachable through admin-gated routes.
    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        let entity = sqlx::query_as::<_, UserEntity>(&format!(
            r#"
            UPDATE users
            SET role = $2, updated_at = $3
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(StoreError::NotFound)?;

        entity.into_domain()
    }

    /// Records a successful login.
    pub async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
