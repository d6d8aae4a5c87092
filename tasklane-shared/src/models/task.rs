/// Task model and database operations
///
/// Tasks belong to exactly one user. Every operation here takes the owner's
/// id and applies it as a SQL predicate, so a task is never visible or
/// mutable through another user's credential. Callers translate an absent
/// row into Not Found without distinguishing "does not exist" from "owned by
/// someone else".
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('todo', 'in_progress', 'done');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(120) NOT NULL,
///     status task_status NOT NULL DEFAULT 'todo',
///     priority INTEGER NOT NULL DEFAULT 1,
///     deadline TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use tasklane_shared::models::task::{CreateTask, Task, TaskFilter, TaskSort};
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, owner_id: Uuid) -> Result<(), sqlx::Error> {
/// let task = Task::create(&pool, owner_id, CreateTask {
///     title: "Buy milk".to_string(),
///     priority: 2,
///     deadline: None,
/// }).await?;
///
/// let filter = TaskFilter::default();
/// let total = Task::count(&pool, owner_id, &filter).await?;
/// let page = Task::list(&pool, owner_id, &filter, &TaskSort::default(), 20, 0).await?;
/// assert!(total >= page.len() as i64);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    Todo,

    /// Being worked on
    InProgress,

    /// Finished
    Done,
}

impl TaskStatus {
    /// Status as its wire/database string
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Parses a status string; returns None for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Owning user
    pub owner_id: Uuid,

    /// Title (1..=120 characters, also the free-text search field)
    pub title: String,

    /// Current status
    pub status: TaskStatus,

    /// Priority (1..=5)
    pub priority: i32,

    /// Optional deadline
    pub deadline: Option<DateTime<Utc>>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task (status always starts at `todo`)
#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
}

/// Input for a full replace (PUT); every mutable field is required
#[derive(Debug, Clone)]
pub struct ReplaceTask {
    pub title: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub deadline: Option<DateTime<Utc>>,
}

/// Input for a partial update (PATCH); only present fields are applied
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<i32>,
    pub deadline: Option<DateTime<Utc>>,
}

impl UpdateTask {
    /// True when no field is set (a no-op PATCH still bumps `updated_at`)
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.deadline.is_none()
    }
}

/// Shared filter predicate for list and count
///
/// List and count apply this identical predicate so the total-count header
/// always agrees with the page contents.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Exact status match
    pub status: Option<TaskStatus>,

    /// Exact priority match
    pub priority: Option<i32>,

    /// Case-insensitive substring match on title
    pub q: Option<String>,
}

/// Sortable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Priority,
    Status,
    Deadline,
}

impl SortField {
    /// Parses a sort field name; returns None for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created_at" => Some(SortField::CreatedAt),
            "priority" => Some(SortField::Priority),
            "status" => Some(SortField::Status),
            "deadline" => Some(SortField::Deadline),
            _ => None,
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// Parses a direction; returns None for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }

    fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Sort specification (field + direction)
#[derive(Debug, Clone, Copy)]
pub struct TaskSort {
    pub field: SortField,
    pub dir: SortDir,
}

impl Default for TaskSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            dir: SortDir::Desc,
        }
    }
}

impl TaskSort {
    /// Renders the ORDER BY clause
    ///
    /// Column expressions come from a fixed allow-list, never from user
    /// input. Status ranks todo < in_progress < done; a missing deadline
    /// falls back to the creation time. A (created_at, id) tail keeps
    /// pagination stable when the primary key ties.
    fn order_clause(&self) -> String {
        let primary = match self.field {
            SortField::CreatedAt => "created_at",
            SortField::Priority => "priority",
            SortField::Status => {
                "CASE status WHEN 'todo' THEN 0 WHEN 'in_progress' THEN 1 ELSE 2 END"
            }
            SortField::Deadline => "COALESCE(deadline, created_at)",
        };
        let dir = self.dir.as_sql();

        format!(" ORDER BY {} {}, created_at {}, id {}", primary, dir, dir, dir)
    }
}

/// Appends filter predicates to a statement that already has
/// `WHERE owner_id = $1`, continuing the bind numbering from `bind`.
///
/// Returns the next free bind index. Values must later be bound in the same
/// order: status, priority, q.
fn push_filter_sql(sql: &mut String, filter: &TaskFilter, mut bind: i32) -> i32 {
    if filter.status.is_some() {
        bind += 1;
        sql.push_str(&format!(" AND status = ${}", bind));
    }
    if filter.priority.is_some() {
        bind += 1;
        sql.push_str(&format!(" AND priority = ${}", bind));
    }
    if filter.q.is_some() {
        bind += 1;
        sql.push_str(&format!(" AND title ILIKE ${}", bind));
    }
    bind
}

const TASK_COLUMNS: &str = "id, owner_id, title, status, priority, deadline, created_at, updated_at";

impl Task {
    /// Creates a new task in `todo` status
    pub async fn create(
        pool: &PgPool,
        owner_id: Uuid,
        data: CreateTask,
    ) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            INSERT INTO tasks (owner_id, title, priority, deadline)
            VALUES ($1, $2, $3, $4)
            RETURNING id, owner_id, title, status, priority, deadline, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(data.title)
        .bind(data.priority)
        .bind(data.deadline)
        .fetch_one(pool)
        .await?;

        Ok(task)
    }

    /// Finds a task by id, scoped to its owner
    ///
    /// Returns None both for a missing row and for a row owned by another
    /// user.
    pub async fn find(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE owner_id = $1 AND id = $2",
            TASK_COLUMNS
        ))
        .bind(owner_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Lists the owner's tasks with filters, sorting, and pagination
    pub async fn list(
        pool: &PgPool,
        owner_id: Uuid,
        filter: &TaskFilter,
        sort: &TaskSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut sql = format!("SELECT {} FROM tasks WHERE owner_id = $1", TASK_COLUMNS);
        let mut bind = push_filter_sql(&mut sql, filter, 1);

        sql.push_str(&sort.order_clause());
        bind += 1;
        sql.push_str(&format!(" LIMIT ${}", bind));
        bind += 1;
        sql.push_str(&format!(" OFFSET ${}", bind));

        let mut query = sqlx::query_as::<_, Task>(&sql).bind(owner_id);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(priority) = filter.priority {
            query = query.bind(priority);
        }
        if let Some(ref q) = filter.q {
            query = query.bind(format!("%{}%", q));
        }

        let tasks = query.bind(limit).bind(offset).fetch_all(pool).await?;

        Ok(tasks)
    }

    /// Counts the owner's tasks matching the same predicate as [`Task::list`]
    pub async fn count(
        pool: &PgPool,
        owner_id: Uuid,
        filter: &TaskFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut sql = String::from("SELECT COUNT(*) FROM tasks WHERE owner_id = $1");
        push_filter_sql(&mut sql, filter, 1);

        let mut query = sqlx::query_as::<_, (i64,)>(&sql).bind(owner_id);
        if let Some(status) = filter.status {
            query = query.bind(status);
        }
        if let Some(priority) = filter.priority {
            query = query.bind(priority);
        }
        if let Some(ref q) = filter.q {
            query = query.bind(format!("%{}%", q));
        }

        let (count,) = query.fetch_one(pool).await?;

        Ok(count)
    }

    /// Replaces every mutable field (PUT semantics)
    ///
    /// Returns the updated row, or None when the task is absent or owned by
    /// another user.
    pub async fn replace(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        data: ReplaceTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(
            r#"
            UPDATE tasks
            SET title = $3,
                status = $4,
                priority = $5,
                deadline = $6,
                updated_at = NOW()
            WHERE owner_id = $1 AND id = $2
            RETURNING id, owner_id, title, status, priority, deadline, created_at, updated_at
            "#,
        )
        .bind(owner_id)
        .bind(id)
        .bind(data.title)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.deadline)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// Applies only the provided fields (PATCH semantics)
    ///
    /// `updated_at` is always bumped. Returns None when the task is absent
    /// or owned by another user.
    pub async fn update(
        pool: &PgPool,
        owner_id: Uuid,
        id: Uuid,
        data: UpdateTask,
    ) -> Result<Option<Self>, sqlx::Error> {
        // Build the SET list dynamically from the present fields
        let mut sql = String::from("UPDATE tasks SET updated_at = NOW()");
        let mut bind = 2;

        if data.title.is_some() {
            bind += 1;
            sql.push_str(&format!(", title = ${}", bind));
        }
        if data.status.is_some() {
            bind += 1;
            sql.push_str(&format!(", status = ${}", bind));
        }
        if data.priority.is_some() {
            bind += 1;
            sql.push_str(&format!(", priority = ${}", bind));
        }
        if data.deadline.is_some() {
            bind += 1;
            sql.push_str(&format!(", deadline = ${}", bind));
        }

        sql.push_str(" WHERE owner_id = $1 AND id = $2 RETURNING ");
        sql.push_str(TASK_COLUMNS);

        let mut query = sqlx::query_as::<_, Task>(&sql).bind(owner_id).bind(id);

        if let Some(title) = data.title {
            query = query.bind(title);
        }
        if let Some(status) = data.status {
            query = query.bind(status);
        }
        if let Some(priority) = data.priority {
            query = query.bind(priority);
        }
        if let Some(deadline) = data.deadline {
            query = query.bind(deadline);
        }

        let task = query.fetch_optional(pool).await?;

        Ok(task)
    }

    /// Deletes a task; returns false when absent or owned by another user
    pub async fn delete(pool: &PgPool, owner_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes many tasks by id, counting only rows the owner actually holds
    ///
    /// Foreign and unknown ids are silently excluded by the ownership
    /// predicate. Runs in a single transaction so a partial result is never
    /// observable.
    pub async fn bulk_delete(
        pool: &PgPool,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        let result = sqlx::query("DELETE FROM tasks WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner_id)
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    /// Marks many tasks as done, counting only rows the owner actually holds
    pub async fn bulk_complete(
        pool: &PgPool,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'done', updated_at = NOW()
            WHERE owner_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(owner_id)
        .bind(ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(TaskStatus::Todo.as_str(), "todo");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::Done.as_str(), "done");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TaskStatus::parse("todo"), Some(TaskStatus::Todo));
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse("DONE"), None);
        assert_eq!(TaskStatus::parse(""), None);
        assert_eq!(TaskStatus::parse("archived"), None);
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!(SortField::parse("created_at"), Some(SortField::CreatedAt));
        assert_eq!(SortField::parse("priority"), Some(SortField::Priority));
        assert_eq!(SortField::parse("status"), Some(SortField::Status));
        assert_eq!(SortField::parse("deadline"), Some(SortField::Deadline));
        assert_eq!(SortField::parse("owner_id"), None);
        assert_eq!(SortField::parse("id; DROP TABLE tasks"), None);
    }

    #[test]
    fn test_sort_dir_parse() {
        assert_eq!(SortDir::parse("asc"), Some(SortDir::Asc));
        assert_eq!(SortDir::parse("desc"), Some(SortDir::Desc));
        assert_eq!(SortDir::parse("up"), None);
    }

    #[test]
    fn test_default_sort() {
        let sort = TaskSort::default();
        assert_eq!(sort.field, SortField::CreatedAt);
        assert_eq!(sort.dir, SortDir::Desc);
    }

    #[test]
    fn test_order_clause_created_at() {
        let sort = TaskSort {
            field: SortField::CreatedAt,
            dir: SortDir::Desc,
        };
        assert_eq!(
            sort.order_clause(),
            " ORDER BY created_at DESC, created_at DESC, id DESC"
        );
    }

    #[test]
    fn test_order_clause_status_ranks() {
        let sort = TaskSort {
            field: SortField::Status,
            dir: SortDir::Asc,
        };
        let clause = sort.order_clause();
        assert!(clause.contains("WHEN 'todo' THEN 0"));
        assert!(clause.contains("WHEN 'in_progress' THEN 1"));
        assert!(clause.ends_with("created_at ASC, id ASC"));
    }

    #[test]
    fn test_order_clause_deadline_coalesces() {
        let sort = TaskSort {
            field: SortField::Deadline,
            dir: SortDir::Asc,
        };
        assert!(sort
            .order_clause()
            .starts_with(" ORDER BY COALESCE(deadline, created_at) ASC"));
    }

    #[test]
    fn test_push_filter_sql_empty() {
        let mut sql = String::from("SELECT COUNT(*) FROM tasks WHERE owner_id = $1");
        let next = push_filter_sql(&mut sql, &TaskFilter::default(), 1);

        assert_eq!(next, 1);
        assert_eq!(sql, "SELECT COUNT(*) FROM tasks WHERE owner_id = $1");
    }

    #[test]
    fn test_push_filter_sql_all_filters() {
        let filter = TaskFilter {
            status: Some(TaskStatus::Done),
            priority: Some(3),
            q: Some("milk".to_string()),
        };

        let mut sql = String::from("SELECT COUNT(*) FROM tasks WHERE owner_id = $1");
        let next = push_filter_sql(&mut sql, &filter, 1);

        assert_eq!(next, 4);
        assert!(sql.contains(" AND status = $2"));
        assert!(sql.contains(" AND priority = $3"));
        assert!(sql.contains(" AND title ILIKE $4"));
    }

    #[test]
    fn test_push_filter_sql_partial() {
        let filter = TaskFilter {
            status: None,
            priority: Some(2),
            q: None,
        };

        let mut sql = String::from("SELECT COUNT(*) FROM tasks WHERE owner_id = $1");
        let next = push_filter_sql(&mut sql, &filter, 1);

        assert_eq!(next, 2);
        assert!(sql.contains(" AND priority = $2"));
        assert!(!sql.contains("status"));
        assert!(!sql.contains("ILIKE"));
    }

    #[test]
    fn test_update_task_is_empty() {
        assert!(UpdateTask::default().is_empty());
        assert!(!UpdateTask {
            status: Some(TaskStatus::Done),
            ..Default::default()
        }
        .is_empty());
    }
}
