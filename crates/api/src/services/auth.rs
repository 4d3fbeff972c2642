//! Authentication service: registration, login and token management.

use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use domain::models::user::{Role, User};
use domain::stores::StoreError;
use persistence::repositories::UserRepository;
use shared::jwt::{JwtConfig, JwtError};
use shared::password::{check_password_strength, hash_password, verify_password, PasswordError};

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Password does not meet requirements: {0}")]
    WeakPassword(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("User is disabled")]
    UserDisabled,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Token error: {0}")]
    TokenError(#[from] JwtError),

    #[error("Password error: {0}")]
    PasswordError(#[from] PasswordError),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Result of a successful registration or login.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_in: i64,
}

/// A freshly issued token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_in: i64,
}

/// Authentication service bound to the user repository and JWT keys.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    jwt: Arc<JwtConfig>,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt: Arc<JwtConfig>) -> Self {
        Self {
            users: UserRepository::new(pool),
            jwt,
        }
    }

    /// Registers a self-service account. New accounts are Chefs; further
    /// Admin accounts are provisioned out of band.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, AuthError> {
        let user = self.create_user(name, email, password, Role::Chef).await?;
        let tokens = self.issue_tokens(&user)?;

        Ok(AuthResult {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_expires_in: tokens.access_token_expires_in,
        })
    }

    /// Creates a Chef account on behalf of an Admin. No tokens are
    /// issued; the new Chef logs in with the communicated credentials.
    pub async fn register_chef(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        self.create_user(name, email, password, Role::Chef).await
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, AuthError> {
        check_password_strength(password).map_err(AuthError::WeakPassword)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hash_password(password)?;

        match self.users.create(name, email, &password_hash, role).await {
            Ok(user) => Ok(user),
            // A concurrent registration can win the race past the lookup.
            Err(StoreError::Conflict(_)) => Err(AuthError::EmailAlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticates with email and password.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResult, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        self.users.touch_last_login(user.id).await?;

        let tokens = self.issue_tokens(&user)?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");

        Ok(AuthResult {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_expires_in: tokens.access_token_expires_in,
        })
    }

    /// Exchanges a refresh token for a fresh pair. The role is re-read
    /// from the store so role changes take effect at the next refresh.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .jwt
            .validate_refresh_token(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidRefreshToken)?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::UserDisabled);
        }

        self.issue_tokens(&user)
    }

    /// Loads the authenticated user's account.
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    fn issue_tokens(&self, user: &User) -> Result<TokenPair, AuthError> {
        let (access_token, _) = self.jwt.generate_access_token(user.id, user.role.as_str())?;
        let (refresh_token, _) = self
            .jwt
            .generate_refresh_token(user.id, user.role.as_str())?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_in: self.jwt.access_token_expiry_secs,
        })
    }
}
