//! Authentication routes: registration, login, token refresh and the
//! admin-only Chef provisioning endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use domain::models::user::UserResponse;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::services::auth::{AuthError, AuthService};

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token information in responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Response body carrying the account and a token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokensResponse,
}

fn map_auth_error(e: AuthError) -> ApiError {
    match e {
        AuthError::EmailAlreadyExists => {
            ApiError::Conflict("Email already registered".to_string())
        }
        AuthError::WeakPassword(msg) => ApiError::Validation(msg),
        AuthError::InvalidCredentials => {
            ApiError::Unauthorized("Invalid credentials".to_string())
        }
        AuthError::UserDisabled => ApiError::Forbidden("Account is disabled".to_string()),
        AuthError::UserNotFound => ApiError::NotFound("User not found".to_string()),
        AuthError::InvalidRefreshToken => {
            ApiError::Unauthorized("Invalid or expired refresh token".to_string())
        }
        AuthError::TokenError(e) => ApiError::Internal(format!("Token error: {}", e)),
        AuthError::PasswordError(e) => ApiError::Internal(format!("Password error: {}", e)),
        AuthError::StoreError(e) => ApiError::from(e),
    }
}

/// Register a new account.
///
/// POST /api/v1/auth/register
///
/// Self-registration creates a Chef; Admin accounts are provisioned out
/// of band.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    request.validate()?;

    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let result = service
        .register(&request.name, &request.email, &request.password)
        .await
        .map_err(map_auth_error)?;

    tracing::info!(user_id = %result.user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: result.user.into(),
            tokens: TokensResponse {
                access_token: result.access_token,
                refresh_token: result.refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: result.access_token_expires_in,
            },
        }),
    ))
}

/// Authenticate with email and password.
///
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    request.validate()?;

    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let result = service
        .login(&request.email, &request.password)
        .await
        .map_err(map_auth_error)?;

    Ok(Json(AuthResponse {
        user: result.user.into(),
        tokens: TokensResponse {
            access_token: result.access_token,
            refresh_token: result.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: result.access_token_expires_in,
        },
    }))
}

/// Exchange a refresh token for a fresh pair.
///
/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokensResponse>, ApiError> {
    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let pair = service
        .refresh(&request.refresh_token)
        .await
        .map_err(map_auth_error)?;

    Ok(Json(TokensResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: pair.access_token_expires_in,
    }))
}

/// The authenticated user's own account.
///
/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<UserResponse>, ApiError> {
    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let user = service
        .current_user(current.principal.id)
        .await
        .map_err(map_auth_error)?;

    Ok(Json(user.into()))
}

/// Provision a Chef account.
///
/// POST /api/v1/auth/register-chef
///
/// Admin only.
pub async fn register_chef(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    if !current.principal.role.is_admin() {
        return Err(ApiError::Forbidden(
            "Only administrators can register new chiefs".to_string(),
        ));
    }

    request.validate()?;

    let service = AuthService::new(state.pool.clone(), state.jwt.clone());
    let user = service
        .register_chef(&request.name, &request.email, &request.password)
        .await
        .map_err(map_auth_error)?;

    tracing::info!(
        admin_id = %current.principal.id,
        user_id = %user.id,
        "Chief account provisioned"
    );

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_validation() {
        let request = RegisterRequest {
            name: "Paul".to_string(),
            email: "paul@example.com".to_string(),
            password: "Str0ngEnough".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn register_request_rejects_bad_email() {
        let request = RegisterRequest {
            name: "Paul".to_string(),
            email: "not-an-email".to_string(),
            password: "Str0ngEnough".to_string(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn login_request_requires_password() {
        let request = LoginRequest {
            email: "paul@example.com".to_string(),
            password: String::new(),
        };
        assert!(request.validate().is_err());
    }
}
