/// Task CRUD and bulk endpoints
///
/// All handlers require authentication and scope every database operation
/// to the authenticated owner. A task belonging to someone else is
/// indistinguishable from a missing one: both answer 404.
///
/// # Endpoints
///
/// - `GET    /api/v1/tasks` - List with filters, sorting, pagination;
///   sets `X-Total-Count` from the same filter predicate, unpaginated
/// - `POST   /api/v1/tasks` - Create (201 + Location header)
/// - `GET    /api/v1/tasks/:id` - Fetch one
/// - `PUT    /api/v1/tasks/:id` - Full replace
/// - `PATCH  /api/v1/tasks/:id` - Partial update
/// - `DELETE /api/v1/tasks/:id` - Delete (204)
/// - `POST   /api/v1/tasks/bulk_delete` - Delete many, report count
/// - `POST   /api/v1/tasks/bulk_complete` - Mark many done, report count

use crate::{
    app::{AppState, AuthUser},
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasklane_shared::models::task::{
    CreateTask, ReplaceTask, SortDir, SortField, Task, TaskFilter, TaskSort, TaskStatus,
    UpdateTask,
};
use uuid::Uuid;
use validator::Validate;

/// Default page size
const DEFAULT_PAGE_SIZE: i64 = 20;

/// Enforced maximum page size; larger requests are clamped
const MAX_PAGE_SIZE: i64 = 100;

/// Task representation returned by the API
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            status: task.status,
            priority: task.priority,
            deadline: task.deadline,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Create request body
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1 to 120 characters"))]
    pub title: String,

    #[serde(default = "default_priority")]
    #[validate(range(min = 1, max = 5, message = "Priority must be between 1 and 5"))]
    pub priority: i32,

    pub deadline: Option<DateTime<Utc>>,
}

fn default_priority() -> i32 {
    1
}

/// Full-replace request body (PUT); every mutable field required
#[derive(Debug, Deserialize, Validate)]
pub struct ReplaceTaskRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1 to 120 characters"))]
    pub title: String,

    pub status: TaskStatus,

    #[validate(range(min = 1, max = 5, message = "Priority must be between 1 and 5"))]
    pub priority: i32,

    pub deadline: Option<DateTime<Utc>>,
}

/// Partial-update request body (PATCH); absent fields are left untouched
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 120, message = "Title must be 1 to 120 characters"))]
    pub title: Option<String>,

    pub status: Option<TaskStatus>,

    #[validate(range(min = 1, max = 5, message = "Priority must be between 1 and 5"))]
    pub priority: Option<i32>,

    pub deadline: Option<DateTime<Utc>>,
}

/// Id list for bulk operations
#[derive(Debug, Deserialize, Validate)]
pub struct TaskIdList {
    #[validate(length(min = 1, message = "ids must not be empty"))]
    pub ids: Vec<Uuid>,
}

/// Raw list query parameters
///
/// Everything arrives as an optional string so that empty values mean "no
/// filter" and invalid values produce a 422 locating the offending field,
/// rather than a framework-level rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub q: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub order_by: Option<String>,
    pub order_dir: Option<String>,
}

fn field_error(field: &str, message: &str) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: field.to_string(),
        message: message.to_string(),
    }])
}

/// Treats None and "" identically as "absent"
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Parses the filter portion of the query string
pub(crate) fn parse_filter(query: &ListQuery) -> ApiResult<TaskFilter> {
    let status = match non_empty(&query.status) {
        None => None,
        Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
            field_error("status", "status must be one of: todo, in_progress, done")
        })?),
    };

    let priority = match non_empty(&query.priority) {
        None => None,
        Some(raw) => Some(
            raw.parse::<i32>()
                .map_err(|_| field_error("priority", "priority must be a valid integer"))?,
        ),
    };

    Ok(TaskFilter {
        status,
        priority,
        q: non_empty(&query.q).map(str::to_string),
    })
}

/// Parses the sort portion of the query string
pub(crate) fn parse_sort(query: &ListQuery) -> ApiResult<TaskSort> {
    let field = match non_empty(&query.order_by) {
        None => SortField::CreatedAt,
        Some(raw) => SortField::parse(raw).ok_or_else(|| {
            field_error(
                "order_by",
                "order_by must be one of: created_at, priority, status, deadline",
            )
        })?,
    };

    let dir = match non_empty(&query.order_dir) {
        None => SortDir::Desc,
        Some(raw) => SortDir::parse(raw)
            .ok_or_else(|| field_error("order_dir", "order_dir must be 'asc' or 'desc'"))?,
    };

    Ok(TaskSort { field, dir })
}

/// Parses limit/offset, applying the default and the enforced maximum
pub(crate) fn parse_pagination(query: &ListQuery) -> ApiResult<(i64, i64)> {
    let limit = match non_empty(&query.limit) {
        None => DEFAULT_PAGE_SIZE,
        Some(raw) => {
            let limit: i64 = raw
                .parse()
                .map_err(|_| field_error("limit", "limit must be a valid integer"))?;
            if limit < 0 {
                return Err(field_error("limit", "limit must not be negative"));
            }
            limit.min(MAX_PAGE_SIZE)
        }
    };

    let offset = match non_empty(&query.offset) {
        None => 0,
        Some(raw) => {
            let offset: i64 = raw
                .parse()
                .map_err(|_| field_error("offset", "offset must be a valid integer"))?;
            if offset < 0 {
                return Err(field_error("offset", "offset must not be negative"));
            }
            offset
        }
    };

    Ok((limit, offset))
}

/// List the authenticated user's tasks
///
/// The `X-Total-Count` header is computed with the same filter predicate as
/// the page, without pagination, so the two can never disagree.
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<(HeaderMap, Json<Vec<TaskResponse>>)> {
    let filter = parse_filter(&query)?;
    let sort = parse_sort(&query)?;
    let (limit, offset) = parse_pagination(&query)?;

    let total = Task::count(&state.db, auth.id, &filter).await?;
    let items = Task::list(&state.db, auth.id, &filter, &sort, limit, offset).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "X-Total-Count",
        HeaderValue::from_str(&total.to_string()).expect("integer header value"),
    );

    Ok((
        headers,
        Json(items.into_iter().map(TaskResponse::from).collect()),
    ))
}

/// Create a task
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, HeaderMap, Json<TaskResponse>)> {
    req.validate()?;

    let task = Task::create(
        &state.db,
        auth.id,
        CreateTask {
            title: req.title,
            priority: req.priority,
            deadline: req.deadline,
        },
    )
    .await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/api/v1/tasks/{}", task.id))
            .expect("uuid path is a valid header value"),
    );

    Ok((StatusCode::CREATED, headers, Json(task.into())))
}

/// Fetch a single task
pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<Json<TaskResponse>> {
    let task = Task::find(&state.db, auth.id, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Json(task.into()))
}

/// Replace a task (PUT)
pub async fn put_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<ReplaceTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    req.validate()?;

    let task = Task::replace(
        &state.db,
        auth.id,
        task_id,
        ReplaceTask {
            title: req.title,
            status: req.status,
            priority: req.priority,
            deadline: req.deadline,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Json(task.into()))
}

/// Partially update a task (PATCH)
pub async fn patch_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    req.validate()?;

    let task = Task::update(
        &state.db,
        auth.id,
        task_id,
        UpdateTask {
            title: req.title,
            status: req.status,
            priority: req.priority,
            deadline: req.deadline,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    Ok(Json(task.into()))
}

/// Delete a task
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let deleted = Task::delete(&state.db, auth.id, task_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Delete many tasks; ids not owned (or not found) are silently excluded
pub async fn bulk_delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<TaskIdList>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;

    let deleted = Task::bulk_delete(&state.db, auth.id, &req.ids).await?;

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// Mark many tasks done; ids not owned (or not found) are silently excluded
pub async fn bulk_complete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<TaskIdList>,
) -> ApiResult<Json<serde_json::Value>> {
    req.validate()?;

    let updated = Task::bulk_complete(&state.db, auth.id, &req.ids).await?;

    Ok(Json(serde_json::json!({ "updated": updated })))
}
