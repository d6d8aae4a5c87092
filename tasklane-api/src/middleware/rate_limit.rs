/// Fixed-window rate limiting for auth endpoints
///
/// Counts requests per client key in discrete, non-overlapping windows and
/// rejects with 429 once a window's quota is spent. The counter store is
/// selected at startup:
///
/// - **In-memory** (default): a process-local map; counters reset when the
///   window elapses and on process restart. Suitable for single-instance
///   deployments.
/// - **Redis** (`REDIS_URL` set): counters shared across instances via an
///   atomic INCR+EXPIRE script, so limits hold fleet-wide.
///
/// # Headers
///
/// Successful responses carry:
/// - `X-RateLimit-Limit`: requests allowed per window
/// - `X-RateLimit-Remaining`: requests left in the current window
/// - `X-RateLimit-Reset`: Unix timestamp when the window resets
///
/// 429 responses carry `Retry-After` (seconds).

use crate::app::AppState;
use crate::config::RateQuota;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Ceiling on tracked in-memory keys; stale windows are evicted past this
const MEMORY_STORE_CAPACITY: usize = 10_000;

/// Outcome of a quota check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request fits in the current window
    pub allowed: bool,

    /// Requests allowed per window
    pub limit: u32,

    /// Requests left in the current window
    pub remaining: u32,

    /// Unix timestamp when the current window resets
    pub reset_at: u64,
}

/// Counter storage backend
enum CounterStore {
    Memory(Mutex<HashMap<String, (u64, u32)>>),
    Redis(redis::aio::ConnectionManager),
}

/// Fixed-window rate limiter
pub struct RateLimiter {
    store: CounterStore,
}

impl RateLimiter {
    /// Creates a limiter backed by a process-local counter map
    pub fn in_memory() -> Self {
        Self {
            store: CounterStore::Memory(Mutex::new(HashMap::new())),
        }
    }

    /// Creates a limiter backed by a shared Redis store
    pub async fn shared(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            store: CounterStore::Redis(conn),
        })
    }

    /// Registers one hit for `key` and decides whether it fits the quota
    pub async fn hit(&self, key: &str, quota: RateQuota) -> Result<RateLimitDecision, ApiError> {
        let now = now_unix();

        match &self.store {
            CounterStore::Memory(map) => {
                let mut map = map.lock().expect("rate limit map lock poisoned");
                Ok(memory_hit(&mut map, key, quota, now))
            }
            CounterStore::Redis(conn) => redis_hit(conn.clone(), key, quota, now)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Rate limit store unavailable");
                    ApiError::InternalError("Rate limit check failed".to_string())
                }),
        }
    }
}

/// Window arithmetic: start of the window containing `now`, and its reset time
fn window_bounds(now: u64, window_seconds: u64) -> (u64, u64) {
    let start = now - now % window_seconds;
    (start, start + window_seconds)
}

/// Pure in-memory counter step, separated for deterministic tests
fn memory_hit(
    map: &mut HashMap<String, (u64, u32)>,
    key: &str,
    quota: RateQuota,
    now: u64,
) -> RateLimitDecision {
    let (window_start, reset_at) = window_bounds(now, quota.window_seconds);

    // Drop stale windows once the map grows past its bound
    if map.len() > MEMORY_STORE_CAPACITY {
        map.retain(|_, (start, _)| *start + quota.window_seconds > now);
    }

    let entry = map.entry(key.to_string()).or_insert((window_start, 0));
    if entry.0 != window_start {
        *entry = (window_start, 0);
    }
    entry.1 += 1;

    let count = entry.1;
    RateLimitDecision {
        allowed: count <= quota.limit,
        limit: quota.limit,
        remaining: quota.limit.saturating_sub(count),
        reset_at,
    }
}

/// Atomic INCR+EXPIRE counter step against Redis
async fn redis_hit(
    mut conn: redis::aio::ConnectionManager,
    key: &str,
    quota: RateQuota,
    now: u64,
) -> Result<RateLimitDecision, redis::RedisError> {
    let (window_start, reset_at) = window_bounds(now, quota.window_seconds);
    let redis_key = format!("ratelimit:{}:{}", key, window_start);

    let script = redis::Script::new(
        r#"
        local count = redis.call('INCR', KEYS[1])
        if count == 1 then
            redis.call('EXPIRE', KEYS[1], ARGV[1])
        end
        return count
        "#,
    );

    let count: u32 = script
        .key(&redis_key)
        .arg(quota.window_seconds + 1)
        .invoke_async(&mut conn)
        .await?;

    Ok(RateLimitDecision {
        allowed: count <= quota.limit,
        limit: quota.limit,
        remaining: quota.limit.saturating_sub(count),
        reset_at,
    })
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock before Unix epoch")
        .as_secs()
}

/// Derives the client key for rate limiting
///
/// Prefers the first `X-Forwarded-For` hop (set by the reverse proxy in
/// deployment), then the peer address, then a shared fallback.
pub fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware guarding the login endpoints
pub async fn login_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let quota = state.config.rate_limit.login;
    enforce(state, quota, req, next).await
}

/// Middleware guarding the registration endpoints
pub async fn register_rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let quota = state.config.rate_limit.register;
    enforce(state, quota, req, next).await
}

async fn enforce(
    state: AppState,
    quota: RateQuota,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(&req);
    let decision = state.limiter.hit(&key, quota).await?;

    if !decision.allowed {
        let retry_after = decision.reset_at.saturating_sub(now_unix()).max(1);
        tracing::warn!(key = %key, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after,
            message: format!("Rate limit exceeded. Try again in {} seconds", retry_after),
        });
    }

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string()).expect("integer header value"),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string()).expect("integer header value"),
    );
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_at.to_string()).expect("integer header value"),
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTA: RateQuota = RateQuota {
        limit: 3,
        window_seconds: 60,
    };

    #[test]
    fn test_window_bounds() {
        let (start, reset) = window_bounds(125, 60);
        assert_eq!(start, 120);
        assert_eq!(reset, 180);

        let (start, reset) = window_bounds(120, 60);
        assert_eq!(start, 120);
        assert_eq!(reset, 180);
    }

    #[test]
    fn test_memory_hit_allows_up_to_limit() {
        let mut map = HashMap::new();

        for i in 0..3 {
            let decision = memory_hit(&mut map, "1.2.3.4", QUOTA, 1000);
            assert!(decision.allowed, "hit {} should be allowed", i);
        }

        let decision = memory_hit(&mut map, "1.2.3.4", QUOTA, 1000);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_memory_hit_resets_after_window() {
        let mut map = HashMap::new();

        for _ in 0..4 {
            memory_hit(&mut map, "1.2.3.4", QUOTA, 1000);
        }
        assert!(!memory_hit(&mut map, "1.2.3.4", QUOTA, 1010).allowed);

        // Next window: counter starts over
        let decision = memory_hit(&mut map, "1.2.3.4", QUOTA, 1060);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn test_memory_hit_keys_are_independent() {
        let mut map = HashMap::new();

        for _ in 0..4 {
            memory_hit(&mut map, "1.2.3.4", QUOTA, 1000);
        }
        assert!(!memory_hit(&mut map, "1.2.3.4", QUOTA, 1000).allowed);
        assert!(memory_hit(&mut map, "5.6.7.8", QUOTA, 1000).allowed);
    }

    #[test]
    fn test_memory_hit_remaining_counts_down() {
        let mut map = HashMap::new();

        assert_eq!(memory_hit(&mut map, "k", QUOTA, 1000).remaining, 2);
        assert_eq!(memory_hit(&mut map, "k", QUOTA, 1000).remaining, 1);
        assert_eq!(memory_hit(&mut map, "k", QUOTA, 1000).remaining, 0);
    }

    #[test]
    fn test_memory_hit_reset_at() {
        let mut map = HashMap::new();
        let decision = memory_hit(&mut map, "k", QUOTA, 1000);

        // 1000 falls in the window [960, 1020)
        assert_eq!(decision.reset_at, 1020);
    }

    #[test]
    fn test_client_key_from_forwarded_header() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();

        assert_eq!(client_key(&req), "203.0.113.9");
    }

    #[test]
    fn test_client_key_fallback() {
        let req = Request::builder().body(axum::body::Body::empty()).unwrap();

        assert_eq!(client_key(&req), "unknown");
    }
}
