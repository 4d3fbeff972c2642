//! HTTP middleware components.

pub mod logging;
pub mod rate_limit;
pub mod security_headers;
pub mod trace_id;

pub use rate_limit::{auth_rate_limit_middleware, RateLimiterState};
pub use security_headers::security_headers_middleware;
pub use trace_id::trace_id;
