/// Common test utilities for integration tests
///
/// These tests require a running PostgreSQL database reachable through the
/// `DATABASE_URL` environment variable; each test skips itself when the
/// variable is absent. Shared infrastructure:
/// - Test database setup (migrations run on connect)
/// - Test user creation and JWT issuance
/// - Request/response helpers for driving the router directly

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use chrono::Duration;
use sqlx::PgPool;
use tasklane_api::app::{build_router, AppState};
use tasklane_api::config::{
    ApiConfig, Config, CsrfConfig, DatabaseConfig, JwtConfig, RateLimitConfig, RateQuota,
};
use tasklane_api::middleware::rate_limit::RateLimiter;
use tasklane_shared::auth::{jwt, password};
use tasklane_shared::models::task::{CreateTask, Task};
use tasklane_shared::models::user::{CreateUser, User};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub config: Config,
    pub user: User,
    pub token: String,
}

/// Builds a test configuration against the given database
///
/// Rate limits default to generous values so unrelated tests never trip
/// the limiter; rate-limit tests pass their own quotas.
pub fn test_config(database_url: &str) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            production: false,
            cors_origins: vec!["http://localhost:8080".to_string()],
        },
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            expire_minutes: 60,
        },
        csrf: CsrfConfig {
            secret: "integration-test-csrf-secret".to_string(),
            token_ttl_seconds: 3600,
            enforce: true,
        },
        rate_limit: RateLimitConfig {
            login: RateQuota {
                limit: 10_000,
                window_seconds: 60,
            },
            register: RateQuota {
                limit: 10_000,
                window_seconds: 60,
            },
            redis_url: None,
        },
    }
}

impl TestContext {
    /// Creates a context with default test configuration, or None when no
    /// database is configured (the test should return early)
    pub async fn try_new() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(Self::with_config(test_config(&url)).await)
    }

    /// Creates a context with an explicit configuration
    pub async fn with_config(config: Config) -> Self {
        let db = PgPool::connect(&config.database.url)
            .await
            .expect("test database reachable");

        sqlx::migrate!("../migrations")
            .run(&db)
            .await
            .expect("migrations apply");

        let user = create_test_user(&db).await;
        let token = issue_token(&config, user.id);

        let state = AppState::new(db.clone(), config.clone(), RateLimiter::in_memory());
        let app = build_router(state);

        TestContext {
            db,
            app,
            config,
            user,
            token,
        }
    }

    /// Returns the authorization header value for the context user
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Creates another user directly in the database
    pub async fn create_user(&self) -> User {
        create_test_user(&self.db).await
    }

    /// Issues a token for an arbitrary user id
    pub fn token_for(&self, user_id: Uuid) -> String {
        issue_token(&self.config, user_id)
    }

    /// Creates a task for the given owner directly in the database
    pub async fn create_task(&self, owner_id: Uuid, title: &str, priority: i32) -> Task {
        Task::create(
            &self.db,
            owner_id,
            CreateTask {
                title: title.to_string(),
                priority,
                deadline: None,
            },
        )
        .await
        .expect("task creation succeeds")
    }
}

/// Creates a user with a unique email and a known password ("secret-123")
pub async fn create_test_user(db: &PgPool) -> User {
    let password_hash = password::hash_password("secret-123").expect("hashing succeeds");

    User::create(
        db,
        CreateUser {
            email: format!("test-{}@example.com", Uuid::new_v4()),
            password_hash,
        },
    )
    .await
    .expect("user creation succeeds")
}

fn issue_token(config: &Config, user_id: Uuid) -> String {
    let claims = jwt::Claims::new(user_id, Duration::minutes(config.jwt.expire_minutes));
    jwt::create_token(&claims, &config.jwt.secret).expect("token creation succeeds")
}

/// Sends a request through the router and returns the response
pub async fn send(app: &axum::Router, request: Request<Body>) -> Response<Body> {
    use tower::ServiceExt as _;

    app.clone()
        .oneshot(request)
        .await
        .expect("router handles request")
}

/// Collects a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collects");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

/// Collects a response body as text
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body collects");
    String::from_utf8_lossy(&bytes).to_string()
}

/// Extracts a cookie value from a response's Set-Cookie headers
pub fn response_cookie(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let (key, rest) = cookie.split_once('=')?;
            if key == name {
                Some(rest.split(';').next().unwrap_or("").to_string())
            } else {
                None
            }
        })
}

/// Builds a JSON request
pub fn json_request(method: &str, uri: &str, auth: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

/// Builds a GET request
pub fn get_request(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).expect("request builds")
}

/// Asserts a status, printing the body on mismatch for easier debugging
pub async fn expect_status(response: Response<Body>, expected: StatusCode) -> Response<Body> {
    let status = response.status();
    if status != expected {
        let body = body_text(response).await;
        panic!("Expected {}, got {}: {}", expected, status, body);
    }
    response
}
