/// Server-rendered web UI
///
/// Full pages for login, registration, and the task list, plus HTML
/// fragments for inline editing (htmx swaps a single table row, so a
/// fragment response carries only the updated resource state).
///
/// Identity comes from the HttpOnly `access_token` cookie; a missing or
/// invalid cookie redirects page requests to `/login` and answers 401 on
/// fragment requests, where a redirect would end up inside a row swap.
///
/// Every state-changing form POST is CSRF-guarded with the double-submit
/// pattern: the `csrftoken` cookie and the `csrf_token` form field must
/// both verify and be equal.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::tasks::ListQuery,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use chrono::Duration;
use serde::Deserialize;
use tasklane_shared::{
    auth::{jwt, password},
    models::{
        task::{CreateTask, Task, TaskStatus, UpdateTask},
        user::{CreateUser, User},
    },
};
use tera::Tera;
use uuid::Uuid;

/// Auth cookie name
const ACCESS_COOKIE: &str = "access_token";

/// CSRF cookie name
const CSRF_COOKIE: &str = "csrftoken";

/// CSRF form field name
const CSRF_FIELD: &str = "csrf_token";

/// Builds the template set
///
/// Templates are compiled into the binary so rendering never depends on
/// the working directory.
pub fn load_templates() -> Tera {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("base.html", include_str!("../../templates/base.html")),
        ("login.html", include_str!("../../templates/login.html")),
        (
            "register.html",
            include_str!("../../templates/register.html"),
        ),
        ("index.html", include_str!("../../templates/index.html")),
        (
            "partials/task_row.html",
            include_str!("../../templates/partials/task_row.html"),
        ),
        (
            "partials/task_edit.html",
            include_str!("../../templates/partials/task_edit.html"),
        ),
    ])
    .expect("bundled templates parse");
    tera
}

// --- Form bodies -----------------------------------------------------------

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginFormData {
    pub email: String,
    pub password: String,
    pub csrf_token: Option<String>,
}

/// Registration form
#[derive(Debug, Deserialize)]
pub struct RegisterFormData {
    pub email: String,
    pub password: String,
    pub csrf_token: Option<String>,
}

/// New-task form
#[derive(Debug, Deserialize)]
pub struct CreateTaskFormData {
    pub title: String,
    pub priority: Option<String>,
    pub csrf_token: Option<String>,
}

/// Inline-edit form (all fields present in the edit fragment)
#[derive(Debug, Deserialize)]
pub struct EditTaskFormData {
    pub title: String,
    pub status: String,
    pub priority: String,
    pub csrf_token: Option<String>,
}

/// Single-field form carrying only the CSRF token
#[derive(Debug, Deserialize)]
pub struct CsrfOnlyForm {
    pub csrf_token: Option<String>,
}

// --- Helpers ---------------------------------------------------------------

/// Reads a cookie value from the Cookie header
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

/// Resolves the user from the auth cookie; None on any failure
async fn user_from_cookie(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let token = cookie_value(headers, ACCESS_COOKIE)?;
    let claims = jwt::validate_token(&token, state.jwt_secret()).ok()?;

    User::find_by_id(&state.db, claims.sub).await.ok().flatten()
}

/// Enforces the double-submit CSRF check on a form POST
///
/// Both the cookie token and the form-carried token must be present, each
/// must verify (signature and TTL), and the two must be equal.
fn ensure_csrf(
    state: &AppState,
    headers: &HeaderMap,
    form_token: Option<&str>,
) -> Result<(), ApiError> {
    if !state.config.csrf.enforce {
        return Ok(());
    }

    let cookie_token = cookie_value(headers, CSRF_COOKIE);
    let (cookie_token, provided) = match (cookie_token, form_token) {
        (Some(c), Some(p)) if !c.is_empty() && !p.is_empty() => (c, p),
        _ => return Err(ApiError::Forbidden("CSRF token missing".to_string())),
    };

    if !state.csrf.verify(&cookie_token) || !state.csrf.verify(provided) {
        return Err(ApiError::Forbidden("CSRF token invalid".to_string()));
    }

    if cookie_token != provided {
        return Err(ApiError::Forbidden("CSRF token mismatch".to_string()));
    }

    Ok(())
}

/// Renders a template to an HTML response
fn render(state: &AppState, template: &str, ctx: &tera::Context) -> Result<Html<String>, ApiError> {
    state
        .templates
        .render(template, ctx)
        .map(Html)
        .map_err(|e| ApiError::InternalError(format!("Template render failed: {}", e)))
}

/// 303 redirect response
fn see_other(location: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(
            header::LOCATION,
            HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/")),
        )],
    )
        .into_response()
}

/// Appends a Set-Cookie header to a response
fn set_cookie(response: &mut Response, cookie: String) {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

/// Builds the auth cookie (HttpOnly; Secure in production)
fn access_cookie(state: &AppState, token: &str) -> String {
    let max_age = state.config.jwt.expire_minutes * 60;
    let secure = if state.config.api.production {
        "; Secure"
    } else {
        ""
    };

    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        ACCESS_COOKIE, token, max_age, secure
    )
}

/// Builds the CSRF cookie (readable by the page so forms can carry a copy)
fn csrf_cookie(state: &AppState, token: &str) -> String {
    let secure = if state.config.api.production {
        "; Secure"
    } else {
        ""
    };

    format!(
        "{}={}; Path=/; SameSite=Lax; Max-Age={}{}",
        CSRF_COOKIE,
        token,
        state.config.csrf.token_ttl_seconds,
        secure
    )
}

/// Expired auth cookie, used on logout
fn clear_access_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", ACCESS_COOKIE)
}

/// Renders a full page with a fresh CSRF token and matching cookie
fn render_page_with_csrf(
    state: &AppState,
    template: &str,
    ctx: &mut tera::Context,
    status: StatusCode,
) -> Result<Response, ApiError> {
    let token = state.csrf.generate();
    ctx.insert("csrf_token", &token);

    let html = render(state, template, ctx)?;
    let mut response = (status, html).into_response();
    set_cookie(&mut response, csrf_cookie(state, &token));

    Ok(response)
}

/// Issues a token for the user and redirects to the task list
fn login_redirect(state: &AppState, user_id: Uuid) -> Result<Response, ApiError> {
    let claims = jwt::Claims::new(user_id, Duration::minutes(state.config.jwt.expire_minutes));
    let token = jwt::create_token(&claims, state.jwt_secret())?;

    let mut response = see_other("/");
    set_cookie(&mut response, access_cookie(state, &token));
    Ok(response)
}

// --- Auth pages ------------------------------------------------------------

/// `GET /login` - render the login form
pub async fn login_form(State(state): State<AppState>) -> ApiResult<Response> {
    let mut ctx = tera::Context::new();
    ctx.insert("error", &Option::<String>::None);

    render_page_with_csrf(&state, "login.html", &mut ctx, StatusCode::OK)
}

/// `POST /login` - validate credentials, set the auth cookie, redirect home
pub async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginFormData>,
) -> ApiResult<Response> {
    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        let mut ctx = tera::Context::new();
        ctx.insert("error", "Email and password are required.");
        return render_page_with_csrf(&state, "login.html", &mut ctx, StatusCode::BAD_REQUEST);
    }

    let user = User::find_by_email(&state.db, email).await?;
    let verified = match &user {
        Some(user) => password::verify_password(&form.password, &user.password_hash)?,
        None => false,
    };

    let user = match (user, verified) {
        (Some(user), true) => user,
        _ => {
            let mut ctx = tera::Context::new();
            ctx.insert("error", "Invalid email or password.");
            return render_page_with_csrf(
                &state,
                "login.html",
                &mut ctx,
                StatusCode::UNAUTHORIZED,
            );
        }
    };

    login_redirect(&state, user.id)
}

/// `GET /register` - render the registration form
pub async fn register_form(State(state): State<AppState>) -> ApiResult<Response> {
    let mut ctx = tera::Context::new();
    ctx.insert("error", &Option::<String>::None);

    render_page_with_csrf(&state, "register.html", &mut ctx, StatusCode::OK)
}

/// `POST /register` - create the account, auto-login, redirect home
pub async fn register_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RegisterFormData>,
) -> ApiResult<Response> {
    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    let email = form.email.trim().to_string();

    let error = if email.is_empty() || !email.contains('@') {
        Some("A valid email address is required.".to_string())
    } else {
        password::validate_password(&form.password).err()
    };

    if let Some(error) = error {
        let mut ctx = tera::Context::new();
        ctx.insert("error", &error);
        return render_page_with_csrf(&state, "register.html", &mut ctx, StatusCode::BAD_REQUEST);
    }

    let password_hash = password::hash_password(&form.password)?;
    let created = User::create(
        &state.db,
        CreateUser {
            email,
            password_hash,
        },
    )
    .await;

    let user = match created {
        Ok(user) => user,
        Err(e) => {
            // Render duplicates as a user-facing message instead of JSON
            let api_error = ApiError::from(e);
            if matches!(api_error, ApiError::Conflict(_)) {
                let mut ctx = tera::Context::new();
                ctx.insert("error", "That email is already registered.");
                return render_page_with_csrf(
                    &state,
                    "register.html",
                    &mut ctx,
                    StatusCode::BAD_REQUEST,
                );
            }
            return Err(api_error);
        }
    };

    tracing::info!(user_id = %user.id, "User registered via web");

    login_redirect(&state, user.id)
}

/// `POST /logout` - clear the auth cookie and return to the login page
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CsrfOnlyForm>,
) -> ApiResult<Response> {
    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    let mut response = see_other("/login");
    set_cookie(&mut response, clear_access_cookie());
    Ok(response)
}

// --- Main page -------------------------------------------------------------

/// `GET /` - the task list page with filters, sorting, and bulk actions
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> ApiResult<Response> {
    let user = match user_from_cookie(&state, &headers).await {
        Some(user) => user,
        None => return Ok(see_other("/login")),
    };

    let filter = crate::routes::tasks::parse_filter(&query)?;
    let sort = crate::routes::tasks::parse_sort(&query)?;
    let (limit, offset) = crate::routes::tasks::parse_pagination(&query)?;

    let total = Task::count(&state.db, user.id, &filter).await?;
    let tasks = Task::list(&state.db, user.id, &filter, &sort, limit, offset).await?;

    let mut ctx = tera::Context::new();
    ctx.insert("user_email", &user.email);
    ctx.insert("tasks", &tasks);
    ctx.insert("total", &total);
    ctx.insert("limit", &limit);
    ctx.insert("offset", &offset);
    ctx.insert("status", &query.status.as_deref().unwrap_or(""));
    ctx.insert("priority", &query.priority.as_deref().unwrap_or(""));
    ctx.insert("q", &query.q.as_deref().unwrap_or(""));
    ctx.insert("order_by", &query.order_by.as_deref().unwrap_or("created_at"));
    ctx.insert("order_dir", &query.order_dir.as_deref().unwrap_or("desc"));
    ctx.insert("has_prev", &(offset > 0));
    ctx.insert("has_next", &(offset + limit < total));
    ctx.insert("prev_offset", &(offset - limit).max(0));
    ctx.insert("next_offset", &(offset + limit));

    render_page_with_csrf(&state, "index.html", &mut ctx, StatusCode::OK)
}

// --- Form actions ----------------------------------------------------------

/// `POST /ui/tasks` - create a task from the new-task form
pub async fn create_task_web(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CreateTaskFormData>,
) -> ApiResult<Response> {
    let user = match user_from_cookie(&state, &headers).await {
        Some(user) => user,
        None => return Ok(see_other("/login")),
    };

    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    let title = form.title.trim().to_string();
    if title.is_empty() {
        return Ok(see_other("/"));
    }

    let priority = form
        .priority
        .as_deref()
        .and_then(|p| p.parse::<i32>().ok())
        .unwrap_or(1)
        .clamp(1, 5);

    Task::create(
        &state.db,
        user.id,
        CreateTask {
            title,
            priority,
            deadline: None,
        },
    )
    .await?;

    Ok(see_other("/"))
}

/// `POST /ui/tasks/:id/delete` - delete one task and return to the list
pub async fn delete_task_web(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Form(form): Form<CsrfOnlyForm>,
) -> ApiResult<Response> {
    let user = match user_from_cookie(&state, &headers).await {
        Some(user) => user,
        None => return Ok(see_other("/login")),
    };

    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    // A missing row is fine here; the list simply re-renders without it
    Task::delete(&state.db, user.id, task_id).await?;

    Ok(see_other("/"))
}

/// Collects repeated `ids` fields and the CSRF token from a bulk form body
fn parse_bulk_form(pairs: &[(String, String)]) -> (Vec<Uuid>, Option<String>) {
    let mut ids = Vec::new();
    let mut csrf_token = None;

    for (key, value) in pairs {
        match key.as_str() {
            "ids" => {
                if let Ok(id) = value.parse::<Uuid>() {
                    ids.push(id);
                }
            }
            CSRF_FIELD => csrf_token = Some(value.clone()),
            _ => {}
        }
    }

    (ids, csrf_token)
}

/// `POST /ui/bulk_delete` - delete the checked tasks
pub async fn bulk_delete_web(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let user = match user_from_cookie(&state, &headers).await {
        Some(user) => user,
        None => return Ok(see_other("/login")),
    };

    let (ids, csrf_token) = parse_bulk_form(&pairs);
    ensure_csrf(&state, &headers, csrf_token.as_deref())?;

    Task::bulk_delete(&state.db, user.id, &ids).await?;

    Ok(see_other("/"))
}

/// `POST /ui/bulk_complete` - mark the checked tasks done
pub async fn bulk_complete_web(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> ApiResult<Response> {
    let user = match user_from_cookie(&state, &headers).await {
        Some(user) => user,
        None => return Ok(see_other("/login")),
    };

    let (ids, csrf_token) = parse_bulk_form(&pairs);
    ensure_csrf(&state, &headers, csrf_token.as_deref())?;

    Task::bulk_complete(&state.db, user.id, &ids).await?;

    Ok(see_other("/"))
}

// --- Inline-edit fragments -------------------------------------------------

/// Renders a single task row fragment, reusing the page's CSRF token
fn render_row_fragment(
    state: &AppState,
    headers: &HeaderMap,
    template: &str,
    task: &Task,
) -> Result<Response, ApiError> {
    let mut ctx = tera::Context::new();
    ctx.insert("task", task);

    // Fragments ride on the token already issued with the page; only
    // generate (and re-set) one when the cookie is absent.
    match cookie_value(headers, CSRF_COOKIE) {
        Some(token) => {
            ctx.insert("csrf_token", &token);
            Ok(render(state, template, &ctx)?.into_response())
        }
        None => {
            let token = state.csrf.generate();
            ctx.insert("csrf_token", &token);
            let mut response = render(state, template, &ctx)?.into_response();
            set_cookie(&mut response, csrf_cookie(state, &token));
            Ok(response)
        }
    }
}

/// `GET /ui/tasks/:id/row` - the display fragment for one task
pub async fn task_row(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Response> {
    let user = user_from_cookie(&state, &headers)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Not logged in".to_string()))?;

    let task = Task::find(&state.db, user.id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    render_row_fragment(&state, &headers, "partials/task_row.html", &task)
}

/// `GET /ui/tasks/:id/edit` - the edit-form fragment for one task
pub async fn task_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Response> {
    let user = user_from_cookie(&state, &headers)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Not logged in".to_string()))?;

    let task = Task::find(&state.db, user.id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    render_row_fragment(&state, &headers, "partials/task_edit.html", &task)
}

/// `POST /ui/tasks/:id` - apply an inline edit, answer with the updated row
pub async fn update_task_web(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Form(form): Form<EditTaskFormData>,
) -> ApiResult<Response> {
    let user = user_from_cookie(&state, &headers)
        .await
        .ok_or_else(|| ApiError::Unauthorized("Not logged in".to_string()))?;

    ensure_csrf(&state, &headers, form.csrf_token.as_deref())?;

    let title = form.title.trim().to_string();
    if title.is_empty() || title.len() > 120 {
        return Err(ApiError::BadRequest(
            "Title must be 1 to 120 characters".to_string(),
        ));
    }

    let status = TaskStatus::parse(&form.status)
        .ok_or_else(|| ApiError::BadRequest("Unknown status".to_string()))?;

    let priority = form
        .priority
        .parse::<i32>()
        .map_err(|_| ApiError::BadRequest("Priority must be an integer".to_string()))?
        .clamp(1, 5);

    let task = Task::update(
        &state.db,
        user.id,
        task_id,
        UpdateTask {
            title: Some(title),
            status: Some(status),
            priority: Some(priority),
            deadline: None,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    render_row_fragment(&state, &headers, "partials/task_row.html", &task)
}
