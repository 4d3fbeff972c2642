use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// JWT authentication configuration
    pub jwt: JwtAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    /// The persistence layer's view of this section.
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-client request budget on the auth endpoints. 0 disables
    /// rate limiting.
    #[serde(default = "default_auth_rate_limit")]
    pub auth_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// RSA private key in PEM format for signing tokens.
    pub private_key: String,

    /// RSA public key in PEM format for validating tokens.
    pub public_key: String,

    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry_secs: i64,

    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_auth_rate_limit() -> u32 {
    30
}

fn default_access_token_expiry() -> i64 {
    900 // 15 minutes
}

fn default_refresh_token_expiry() -> i64 {
    604800 // 7 days
}

fn default_jwt_leeway() -> u64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with SM__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("SM").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(config::ConfigError::Message)?;
        Ok(cfg)
    }

    /// Startup-time sanity checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err("database.url must be set".to_string());
        }
        if self.jwt.private_key.is_empty() || self.jwt.public_key.is_empty() {
            return Err("jwt.private_key and jwt.public_key must be set".to_string());
        }
        if self.jwt.access_token_expiry_secs <= 0 || self.jwt.refresh_token_expiry_secs <= 0 {
            return Err("jwt token expiries must be positive".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], self.server.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
        [server]
        [database]
        url = "postgres://localhost/site_manager"
        [logging]
        [security]
        [jwt]
        private_key = "key"
        public_key = "key"
    "#;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = parse(MINIMAL);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.max_connections, 20);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.security.auth_rate_limit_per_minute, 30);
        assert_eq!(cfg.jwt.access_token_expiry_secs, 900);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_keys() {
        let mut cfg = parse(MINIMAL);
        cfg.jwt.private_key = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = parse(MINIMAL);
        cfg.database.url = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn socket_addr_formats() {
        let mut cfg = parse(MINIMAL);
        cfg.server.host = "127.0.0.1".to_string();
        cfg.server.port = 9999;
        assert_eq!(cfg.socket_addr().to_string(), "127.0.0.1:9999");
    }
}
