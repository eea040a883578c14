use anyhow::Context;
use sqlx::{PgExecutor, PgPool, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    Attachment, CommentRow, Subtask, Task, TaskPriority, TaskStatus, TaskWithProjectRow,
};

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, due_date, \
     assignees, watchers, is_archived, created_by, created_at, updated_at";

pub struct NewTask<'a> {
    pub project_id: Uuid,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<OffsetDateTime>,
    pub assignees: &'a [Uuid],
    pub created_by: Uuid,
}

pub async fn create<'e, E: PgExecutor<'e>>(ex: E, new: &NewTask<'_>) -> anyhow::Result<Task> {
    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        INSERT INTO tasks
            (id, project_id, title, description, status, priority, due_date, assignees, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(new.project_id)
    .bind(new.title)
    .bind(new.description)
    .bind(new.status)
    .bind(new.priority)
    .bind(new.due_date)
    .bind(new.assignees)
    .bind(new.created_by)
    .fetch_one(ex)
    .await
    .context("insert task")?;
    Ok(task)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Task>> {
    let task = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE id = $1",
        TASK_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find task")?;
    Ok(task)
}

pub async fn list_by_project(db: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE project_id = $1 AND NOT is_archived ORDER BY created_at DESC",
        TASK_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(db)
    .await
    .context("list project tasks")?;
    Ok(rows)
}

/// Every task of the listed projects, archived included.
pub async fn list_by_projects(db: &PgPool, project_ids: &[Uuid]) -> anyhow::Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE project_id = ANY($1) ORDER BY created_at DESC",
        TASK_COLUMNS
    ))
    .bind(project_ids)
    .fetch_all(db)
    .await
    .context("list tasks of projects")?;
    Ok(rows)
}

/// Tasks assigned to `user_id`, newest first. `archived_only` narrows to archived ones.
pub async fn list_assigned(
    db: &PgPool,
    user_id: Uuid,
    archived_only: bool,
) -> anyhow::Result<Vec<TaskWithProjectRow>> {
    let rows = sqlx::query_as::<_, TaskWithProjectRow>(
        r#"
        SELECT t.id, t.project_id, t.title, t.description, t.status, t.priority, t.due_date,
               t.assignees, t.watchers, t.is_archived, t.created_by, t.created_at, t.updated_at,
               p.title AS project_title, p.workspace_id
          FROM tasks t
          JOIN projects p ON p.id = t.project_id
         WHERE $1 = ANY(t.assignees) AND (NOT $2 OR t.is_archived)
         ORDER BY t.created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(archived_only)
    .fetch_all(db)
    .await
    .context("list assigned tasks")?;
    Ok(rows)
}

/// Overwrites one column and bumps `updated_at`. `column` is always a literal.
async fn set_column<'e, E, T>(ex: E, id: Uuid, column: &'static str, value: T) -> anyhow::Result<Task>
where
    E: PgExecutor<'e>,
    T: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
{
    let sql = format!(
        "UPDATE tasks SET {} = $2, updated_at = now() WHERE id = $1 RETURNING {}",
        column, TASK_COLUMNS
    );
    let task = sqlx::query_as::<_, Task>(&sql)
        .bind(id)
        .bind(value)
        .fetch_one(ex)
        .await
        .with_context(|| format!("update task {}", column))?;
    Ok(task)
}

pub async fn update_title<'e, E: PgExecutor<'e>>(ex: E, id: Uuid, title: &str) -> anyhow::Result<Task> {
    set_column(ex, id, "title", title.to_string()).await
}

pub async fn update_description<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    description: &str,
) -> anyhow::Result<Task> {
    set_column(ex, id, "description", description.to_string()).await
}

pub async fn update_status<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    status: TaskStatus,
) -> anyhow::Result<Task> {
    set_column(ex, id, "status", status).await
}

pub async fn update_priority<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    priority: TaskPriority,
) -> anyhow::Result<Task> {
    set_column(ex, id, "priority", priority).await
}

pub async fn update_assignees<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    assignees: Vec<Uuid>,
) -> anyhow::Result<Task> {
    set_column(ex, id, "assignees", assignees).await
}

/// Adds `user_id` to the watchers, or removes it if present, in one statement.
pub async fn toggle_watcher<'e, E: PgExecutor<'e>>(
    ex: E,
    id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Task> {
    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks
           SET watchers = CASE WHEN $2 = ANY(watchers)
                               THEN array_remove(watchers, $2)
                               ELSE array_append(watchers, $2) END,
               updated_at = now()
         WHERE id = $1
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(id)
    .bind(user_id)
    .fetch_one(ex)
    .await
    .context("toggle task watcher")?;
    Ok(task)
}

pub async fn toggle_archived<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<Task> {
    let task = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks SET is_archived = NOT is_archived, updated_at = now() WHERE id = $1 RETURNING {}",
        TASK_COLUMNS
    ))
    .bind(id)
    .fetch_one(ex)
    .await
    .context("toggle task archived")?;
    Ok(task)
}

/// Subtasks, comments and attachments go with the task.
pub async fn delete<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("delete task")?;
    Ok(())
}

pub async fn touch<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("UPDATE tasks SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("touch task")?;
    Ok(())
}

pub async fn subtasks(db: &PgPool, task_id: Uuid) -> anyhow::Result<Vec<Subtask>> {
    let rows = sqlx::query_as::<_, Subtask>(
        "SELECT id, task_id, title, completed, created_at FROM subtasks WHERE task_id = $1 ORDER BY created_at",
    )
    .bind(task_id)
    .fetch_all(db)
    .await
    .context("list subtasks")?;
    Ok(rows)
}

pub async fn add_subtask<'e, E: PgExecutor<'e>>(
    ex: E,
    task_id: Uuid,
    title: &str,
) -> anyhow::Result<Subtask> {
    let row = sqlx::query_as::<_, Subtask>(
        r#"
        INSERT INTO subtasks (id, task_id, title)
        VALUES ($1, $2, $3)
        RETURNING id, task_id, title, completed, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(task_id)
    .bind(title)
    .fetch_one(ex)
    .await
    .context("insert subtask")?;
    Ok(row)
}

/// `None` when the subtask does not belong to the task.
pub async fn set_subtask_completed<'e, E: PgExecutor<'e>>(
    ex: E,
    task_id: Uuid,
    subtask_id: Uuid,
    completed: bool,
) -> anyhow::Result<Option<Subtask>> {
    let row = sqlx::query_as::<_, Subtask>(
        r#"
        UPDATE subtasks SET completed = $3
         WHERE id = $2 AND task_id = $1
        RETURNING id, task_id, title, completed, created_at
        "#,
    )
    .bind(task_id)
    .bind(subtask_id)
    .bind(completed)
    .fetch_optional(ex)
    .await
    .context("update subtask")?;
    Ok(row)
}

pub async fn attachments(db: &PgPool, task_id: Uuid) -> anyhow::Result<Vec<Attachment>> {
    let rows = sqlx::query_as::<_, Attachment>(
        r#"
        SELECT id, task_id, file_name, file_url, file_type, file_size, uploaded_by, uploaded_at
          FROM attachments
         WHERE task_id = $1
         ORDER BY uploaded_at
        "#,
    )
    .bind(task_id)
    .fetch_all(db)
    .await
    .context("list attachments")?;
    Ok(rows)
}

pub struct NewAttachment<'a> {
    pub task_id: Uuid,
    pub file_name: &'a str,
    pub file_url: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
    pub uploaded_by: Uuid,
}

pub async fn add_attachment<'e, E: PgExecutor<'e>>(
    ex: E,
    new: &NewAttachment<'_>,
) -> anyhow::Result<Attachment> {
    let row = sqlx::query_as::<_, Attachment>(
        r#"
        INSERT INTO attachments (id, task_id, file_name, file_url, file_type, file_size, uploaded_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, task_id, file_name, file_url, file_type, file_size, uploaded_by, uploaded_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.task_id)
    .bind(new.file_name)
    .bind(new.file_url)
    .bind(new.file_type)
    .bind(new.file_size)
    .bind(new.uploaded_by)
    .fetch_one(ex)
    .await
    .context("insert attachment")?;
    Ok(row)
}

pub async fn add_comment<'e, E: PgExecutor<'e>>(
    ex: E,
    task_id: Uuid,
    author_id: Uuid,
    text: &str,
) -> anyhow::Result<CommentRow> {
    let row = sqlx::query_as::<_, CommentRow>(
        r#"
        WITH c AS (
            INSERT INTO comments (id, task_id, author_id, text)
            VALUES ($1, $2, $3, $4)
            RETURNING id, task_id, author_id, text, created_at
        )
        SELECT c.id, c.task_id, c.author_id, c.text, c.created_at,
               u.name AS author_name, u.profile_picture AS author_profile_picture
          FROM c
          LEFT JOIN users u ON u.id = c.author_id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(task_id)
    .bind(author_id)
    .bind(text)
    .fetch_one(ex)
    .await
    .context("insert comment")?;
    Ok(row)
}

/// Newest first.
pub async fn comments(db: &PgPool, task_id: Uuid) -> anyhow::Result<Vec<CommentRow>> {
    let rows = sqlx::query_as::<_, CommentRow>(
        r#"
        SELECT c.id, c.task_id, c.author_id, c.text, c.created_at,
               u.name AS author_name, u.profile_picture AS author_profile_picture
          FROM comments c
          LEFT JOIN users u ON u.id = c.author_id
         WHERE c.task_id = $1
         ORDER BY c.created_at DESC
        "#,
    )
    .bind(task_id)
    .fetch_all(db)
    .await
    .context("list comments")?;
    Ok(rows)
}
