use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use domain::engine::AssignmentEngine;
use persistence::repositories::{EquipmentRepository, SiteRepository};
use shared::jwt::JwtConfig;

use crate::config::Config;
use crate::middleware::{
    auth_rate_limit_middleware, security_headers_middleware, trace_id, RateLimiterState,
};
use crate::routes::{assignments, auth, equipment, health, sites, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub auth_rate_limiter: Option<Arc<RateLimiterState>>,
}

impl AppState {
    /// The consistency engine over the PostgreSQL-backed stores.
    /// Repositories are cheap pool handles, so this is built per use.
    pub fn assignment_engine(&self) -> AssignmentEngine<EquipmentRepository, SiteRepository> {
        AssignmentEngine::new(
            EquipmentRepository::new(self.pool.clone()),
            SiteRepository::new(self.pool.clone()),
        )
    }
}

pub fn create_app(config: Config, pool: PgPool) -> anyhow::Result<Router> {
    let jwt = JwtConfig::with_leeway(
        &config.jwt.private_key,
        &config.jwt.public_key,
        config.jwt.access_token_expiry_secs,
        config.jwt.refresh_token_expiry_secs,
        config.jwt.leeway_secs,
    )
    .map_err(|e| anyhow::anyhow!("invalid JWT configuration: {}", e))?;

    // Rate limiting on auth endpoints only; 0 disables it.
    let auth_rate_limiter = if config.security.auth_rate_limit_per_minute > 0 {
        Some(Arc::new(RateLimiterState::new(
            config.security.auth_rate_limit_per_minute,
        )))
    } else {
        None
    };

    let config = Arc::new(config);

    let state = AppState {
        pool,
        config: config.clone(),
        jwt: Arc::new(jwt),
        auth_rate_limiter,
    };

    // Build CORS layer based on configuration.
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development).
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Public auth endpoints, budgeted per client.
    let auth_routes = Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit_middleware,
        ));

    // Everything else authenticates through the CurrentUser extractor.
    let api_routes = Router::new()
        .route("/api/v1/auth/me", get(auth::me))
        .route("/api/v1/auth/register-chef", post(auth::register_chef))
        .route("/api/v1/users/:user_id", put(users::update_profile))
        .route("/api/v1/users/:user_id/role", put(users::set_role))
        .route(
            "/api/v1/sites",
            get(sites::list_sites).post(sites::create_site),
        )
        .route(
            "/api/v1/sites/:site_id",
            get(sites::get_site)
                .put(sites::update_site)
                .delete(sites::delete_site),
        )
        .route(
            "/api/v1/sites/:site_id/equipment",
            post(assignments::assign_equipment),
        )
        .route(
            "/api/v1/sites/:site_id/equipment/:entry_id",
            delete(assignments::return_equipment),
        )
        .route(
            "/api/v1/equipment",
            get(equipment::list_equipment).post(equipment::create_equipment),
        )
        .route(
            "/api/v1/equipment/:equipment_id",
            get(equipment::get_equipment)
                .put(equipment::update_equipment)
                .delete(equipment::delete_equipment),
        )
        .route(
            "/api/v1/equipment/:equipment_id/reassign",
            post(assignments::reassign_equipment),
        );

    let app = Router::new()
        .route("/health", get(health::health_check))
        .merge(auth_routes)
        .merge(api_routes)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(trace_id))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state);

    Ok(app)
}
