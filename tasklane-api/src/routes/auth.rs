/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/auth/register` - Register a new user (JSON body)
/// - `POST /api/v1/auth/login` - Login with form-encoded credentials,
///   returns a bearer token (OAuth2 password flow shape)
/// - `GET /api/v1/auth/me` - Identity lookup for the presented credential

use crate::{
    app::{AppState, AuthUser},
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{extract::State, http::StatusCode, Extension, Form, Json};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tasklane_shared::{
    auth::{jwt, password},
    models::user::{CreateUser, User},
};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (minimum length checked separately)
    pub password: String,
}

/// Public user representation (never includes the password hash)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    /// User ID
    pub id: Uuid,

    /// Email address
    pub email: String,
}

/// Login form (OAuth2 password flow field names)
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    /// Email address
    pub username: String,

    /// Password
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Signed JWT
    pub access_token: String,

    /// Always "bearer"
    pub token_type: String,
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/register
/// Content-Type: application/json
///
/// {"email": "user@example.com", "password": "secret-123"}
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Invalid email or too-short password
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    req.validate()?;

    password::validate_password(&req.password).map_err(|message| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "password".to_string(),
            message,
        }])
    })?;

    let password_hash = password::hash_password(&req.password)?;

    // The unique index on email turns a duplicate into a 409
    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            email: user.email,
        }),
    ))
}

/// Login and obtain an access token
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/login
/// Content-Type: application/x-www-form-urlencoded
///
/// username=user@example.com&password=secret-123
/// ```
///
/// # Response
///
/// ```json
/// {"access_token": "eyJ...", "token_type": "bearer"}
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: Unknown email or wrong password (same message for
///   both, so the response doesn't reveal which)
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> ApiResult<Json<TokenResponse>> {
    let user = User::find_by_email(&state.db, &form.username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Incorrect email or password".to_string()))?;

    let valid = password::verify_password(&form.password, &user.password_hash)?;
    if !valid {
        return Err(ApiError::Unauthorized(
            "Incorrect email or password".to_string(),
        ));
    }

    let claims = jwt::Claims::new(user.id, Duration::minutes(state.config.jwt.expire_minutes));
    let access_token = jwt::create_token(&claims, state.jwt_secret())?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Identity lookup for the authenticated user
pub async fn me(Extension(auth): Extension<AuthUser>) -> ApiResult<Json<UserResponse>> {
    Ok(Json(UserResponse {
        id: auth.id,
        email: auth.email,
    }))
}
