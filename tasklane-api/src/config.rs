/// Configuration management for the API server
///
/// Configuration is loaded from environment variables (with `.env` support
/// for development) into a typed struct.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `API_PRODUCTION`: Enables HSTS and secure cookies (default: false)
/// - `JWT_SECRET`: Secret key for JWT signing, min 32 bytes (required)
/// - `JWT_EXPIRE_MINUTES`: Access token TTL (default: 60)
/// - `CORS_ALLOW_ORIGINS`: Comma-separated allowed origins (default: localhost)
/// - `CSRF_SECRET`: Secret for CSRF token signing (default: JWT_SECRET)
/// - `CSRF_TOKEN_TTL_SECONDS`: CSRF token lifetime (default: 3600)
/// - `CSRF_ENFORCE`: Enforce CSRF on web form POSTs (default: true)
/// - `RATE_LIMIT_LOGIN`: Login quota as count/window_seconds (default: 5/60)
/// - `RATE_LIMIT_REGISTER`: Registration quota (default: 3/60)
/// - `REDIS_URL`: Optional; selects the shared rate-limit counter store
///
/// # Example
///
/// ```no_run
/// use tasklane_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// CSRF configuration
    pub csrf: CsrfConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Production mode (HSTS, secure cookies)
    pub production: bool,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Access token TTL in minutes
    pub expire_minutes: i64,
}

/// CSRF configuration for web form POSTs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfConfig {
    /// Secret for CSRF token signing
    pub secret: String,

    /// Token lifetime in seconds
    pub token_ttl_seconds: u64,

    /// Whether to enforce CSRF checks on web form POSTs
    pub enforce: bool,
}

/// A fixed-window quota: at most `limit` requests per `window_seconds`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateQuota {
    /// Maximum requests per window
    pub limit: u32,

    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateQuota {
    /// Parses a quota from "count/window_seconds" form, e.g. "5/60"
    pub fn parse(value: &str) -> Option<Self> {
        let (limit, window) = value.split_once('/')?;
        let limit: u32 = limit.trim().parse().ok()?;
        let window_seconds: u64 = window.trim().parse().ok()?;
        if limit == 0 || window_seconds == 0 {
            return None;
        }
        Some(Self {
            limit,
            window_seconds,
        })
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Quota for login attempts
    pub login: RateQuota,

    /// Quota for registrations
    pub register: RateQuota,

    /// Shared counter store; None selects the in-process store
    pub redis_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value cannot
    /// be parsed. An unparseable `JWT_EXPIRE_MINUTES` falls back to the
    /// default instead of failing startup.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()?;
        let production = env::var("API_PRODUCTION")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let cors_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080,http://127.0.0.1:8080".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        // Bad values fall back to the default rather than failing startup
        let expire_minutes = env::var("JWT_EXPIRE_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(60);

        let csrf_secret = env::var("CSRF_SECRET").unwrap_or_else(|_| jwt_secret.clone());
        let csrf_ttl = env::var("CSRF_TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse::<u64>()?;
        let csrf_enforce = env::var("CSRF_ENFORCE")
            .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(true);

        let login_quota = env::var("RATE_LIMIT_LOGIN")
            .ok()
            .as_deref()
            .and_then(RateQuota::parse)
            .unwrap_or(RateQuota {
                limit: 5,
                window_seconds: 60,
            });
        let register_quota = env::var("RATE_LIMIT_REGISTER")
            .ok()
            .as_deref()
            .and_then(RateQuota::parse)
            .unwrap_or(RateQuota {
                limit: 3,
                window_seconds: 60,
            });

        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.is_empty());

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                production,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expire_minutes,
            },
            csrf: CsrfConfig {
                secret: csrf_secret,
                token_ttl_seconds: csrf_ttl,
                enforce: csrf_enforce,
            },
            rate_limit: RateLimitConfig {
                login: login_quota,
                register: register_quota,
                redis_url,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                production: false,
                cors_origins: vec!["http://localhost:8080".to_string()],
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/test".to_string(),
                max_connections: 10,
            },
            jwt: JwtConfig {
                secret: "test-secret-key-at-least-32-bytes-long".to_string(),
                expire_minutes: 60,
            },
            csrf: CsrfConfig {
                secret: "test-csrf-secret".to_string(),
                token_ttl_seconds: 3600,
                enforce: true,
            },
            rate_limit: RateLimitConfig {
                login: RateQuota {
                    limit: 5,
                    window_seconds: 60,
                },
                register: RateQuota {
                    limit: 3,
                    window_seconds: 60,
                },
                redis_url: None,
            },
        }
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(test_config().bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_rate_quota_parse() {
        let quota = RateQuota::parse("5/60").unwrap();
        assert_eq!(quota.limit, 5);
        assert_eq!(quota.window_seconds, 60);

        let quota = RateQuota::parse("100/3600").unwrap();
        assert_eq!(quota.limit, 100);
        assert_eq!(quota.window_seconds, 3600);
    }

    #[test]
    fn test_rate_quota_parse_invalid() {
        assert!(RateQuota::parse("").is_none());
        assert!(RateQuota::parse("5").is_none());
        assert!(RateQuota::parse("5/").is_none());
        assert!(RateQuota::parse("/60").is_none());
        assert!(RateQuota::parse("0/60").is_none());
        assert!(RateQuota::parse("5/0").is_none());
        assert!(RateQuota::parse("five/sixty").is_none());
    }
}
