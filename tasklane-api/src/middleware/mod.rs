/// Middleware modules for the API server
///
/// - `rate_limit`: Fixed-window rate limiting for auth endpoints
/// - `security`: Security response headers

pub mod rate_limit;
pub mod security;
