/// Application state and router builder
///
/// This module defines the shared application state and builds the Axum
/// router with all routes and middleware.
///
/// # Router Layout
///
/// ```text
/// /
/// ├── /livez /readyz /health /metrics     # operational (public)
/// ├── /api/v1/
/// │   ├── /auth/register  POST            # rate limited
/// │   ├── /auth/login     POST            # rate limited
/// │   ├── /auth/me        GET             # bearer auth
/// │   └── /tasks ...                      # bearer auth, full CRUD + bulk
/// ├── /auth/* /tasks/*                    # legacy: 308 → /api/v1/...
/// └── / /login /register /ui/*            # server-rendered web UI
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first): security headers → CORS → request
/// tracing → metrics. Authentication and rate limiting are per-route
/// layers.

use crate::{
    config::Config,
    error::ApiError,
    metrics::Metrics,
    middleware::{rate_limit, rate_limit::RateLimiter, security::SecurityHeadersLayer},
    routes,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tasklane_shared::auth::{csrf::CsrfSigner, jwt};
use tasklane_shared::models::user::User;
use tera::Tera;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use uuid::Uuid;

/// Authenticated user, injected into request extensions
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// User ID (JWT subject)
    pub id: Uuid,

    /// Email address
    pub email: String,
}

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; all fields
/// are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Fixed-window rate limiter for auth endpoints
    pub limiter: Arc<RateLimiter>,

    /// Prometheus metrics registry
    pub metrics: Arc<Metrics>,

    /// Parsed template set for the web UI
    pub templates: Arc<Tera>,

    /// CSRF token signer for web forms
    pub csrf: CsrfSigner,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config, limiter: RateLimiter) -> Self {
        let csrf = CsrfSigner::new(&config.csrf.secret, config.csrf.token_ttl_seconds);

        Self {
            db,
            config: Arc::new(config),
            limiter: Arc::new(limiter),
            metrics: Arc::new(Metrics::new()),
            templates: Arc::new(routes::web::load_templates()),
            csrf,
        }
    }

    /// Gets the JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    // Operational endpoints (public, no auth)
    let ops_routes = Router::new()
        .route("/livez", get(routes::health::livez))
        .route("/readyz", get(routes::health::readyz))
        .route("/health", get(routes::health::health))
        .route("/metrics", get(crate::metrics::metrics_handler));

    // Auth endpoints: register/login public but rate limited, me requires auth
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::register_rate_limit,
        ))
        .merge(
            Router::new()
                .route("/login", post(routes::auth::login))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit::login_rate_limit,
                )),
        )
        .merge(
            Router::new()
                .route("/me", get(routes::auth::me))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    jwt_auth_layer,
                )),
        );

    // Task endpoints (require bearer authentication)
    let task_routes = Router::new()
        .route(
            "/",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route("/bulk_delete", post(routes::tasks::bulk_delete))
        .route("/bulk_complete", post(routes::tasks::bulk_complete))
        .route(
            "/:id",
            get(routes::tasks::get_task)
                .put(routes::tasks::put_task)
                .patch(routes::tasks::patch_task)
                .delete(routes::tasks::delete_task),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Versioned API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/tasks", task_routes);

    // Legacy unversioned paths answer a permanent redirect that preserves
    // method and body (308, Location only)
    let legacy_routes = Router::new()
        .route("/auth", any(legacy_redirect))
        .route("/auth/*rest", any(legacy_redirect))
        .route("/tasks", any(legacy_redirect))
        .route("/tasks/*rest", any(legacy_redirect));

    // Server-rendered web UI; handlers resolve identity from the cookie
    let web_routes = Router::new()
        .route("/", get(routes::web::index))
        .route(
            "/login",
            get(routes::web::login_form).post(routes::web::login_submit),
        )
        .route(
            "/register",
            get(routes::web::register_form).post(routes::web::register_submit),
        )
        .route("/logout", post(routes::web::logout))
        .route("/ui/tasks", post(routes::web::create_task_web))
        .route("/ui/tasks/:id", post(routes::web::update_task_web))
        .route("/ui/tasks/:id/row", get(routes::web::task_row))
        .route("/ui/tasks/:id/edit", get(routes::web::task_edit))
        .route("/ui/tasks/:id/delete", post(routes::web::delete_task_web))
        .route("/ui/bulk_delete", post(routes::web::bulk_delete_web))
        .route("/ui/bulk_complete", post(routes::web::bulk_complete_web));

    // Configure CORS from allowed origins
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(ops_routes)
        .nest("/api/v1", v1_routes)
        .merge(legacy_routes)
        .merge(web_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::metrics::track_metrics,
        ))
        .with_state(state)
}

/// JWT authentication middleware for API routes
///
/// Extracts and validates the bearer token from the Authorization header,
/// resolves the user, and injects [`AuthUser`] into request extensions.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::BadRequest("Expected Bearer token".to_string()))?;

    let claims = jwt::validate_token(token, state.jwt_secret())?;

    // The subject must still exist; a deleted account's token is dead
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Unknown user".to_string()))?;

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        email: user.email,
    });

    Ok(next.run(req).await)
}

/// Computes the versioned Location for a legacy path, keeping the query
fn versioned_location(path_and_query: &str) -> String {
    format!("/api/v1{}", path_and_query)
}

/// Handler answering 308 for legacy unversioned API paths
async fn legacy_redirect(req: Request) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let location = versioned_location(path_and_query);

    match HeaderValue::from_str(&location) {
        Ok(value) => (
            StatusCode::PERMANENT_REDIRECT,
            [(header::LOCATION, value)],
        )
            .into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
