//! Authenticated principal extractor.
//!
//! Validates the Bearer token in the Authorization header and resolves
//! it to a `Principal {id, role}` for the handler. Token issuance lives
//! in the auth service; this is the read side of the identity context.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::str::FromStr;
use uuid::Uuid;

use domain::models::user::{Principal, Role};

use crate::app::AppState;
use crate::error::ApiError;

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub principal: Principal,
    /// JWT ID of the presented token.
    pub jti: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        if !auth_header.starts_with("Bearer ") {
            return Err(ApiError::Unauthorized(
                "Invalid Authorization header format".to_string(),
            ));
        }

        let token = &auth_header[7..];

        let claims = state
            .jwt
            .validate_access_token(token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::Unauthorized("Invalid token subject".to_string()))?;

        let role = Role::from_str(&claims.role)
            .map_err(|_| ApiError::Unauthorized("Invalid token role".to_string()))?;

        Ok(CurrentUser {
            principal: Principal::new(user_id, role),
            jti: claims.jti,
        })
    }
}
