use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Project, ProjectMemberRow, ProjectRole, ProjectStatus};

const PROJECT_COLUMNS: &str = "id, workspace_id, title, description, status, start_date, due_date, \
     tags, created_by, is_archived, created_at, updated_at";

pub struct NewProject<'a> {
    pub workspace_id: Uuid,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub status: ProjectStatus,
    pub start_date: Option<OffsetDateTime>,
    pub due_date: Option<OffsetDateTime>,
    pub tags: &'a [String],
    pub created_by: Uuid,
}

impl Project {
    pub async fn create_tx(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewProject<'_>,
        members: &[(Uuid, ProjectRole)],
    ) -> anyhow::Result<Project> {
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects
                (id, workspace_id, title, description, status, start_date, due_date, tags, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(new.workspace_id)
        .bind(new.title)
        .bind(new.description)
        .bind(new.status)
        .bind(new.start_date)
        .bind(new.due_date)
        .bind(new.tags)
        .bind(new.created_by)
        .fetch_one(&mut **tx)
        .await
        .context("insert project")?;

        for (user_id, role) in members {
            sqlx::query(
                "INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, $3)",
            )
            .bind(project.id)
            .bind(user_id)
            .bind(role)
            .execute(&mut **tx)
            .await
            .context("insert project member")?;
        }
        Ok(project)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find project")?;
        Ok(row)
    }
}

pub async fn member_role(
    db: &PgPool,
    project_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<ProjectRole>> {
    let role = sqlx::query_scalar::<_, ProjectRole>(
        "SELECT role FROM project_members WHERE project_id = $1 AND user_id = $2",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("project member role")?;
    Ok(role)
}

/// Members of every listed project, with profiles, in insertion order.
pub async fn members_of(db: &PgPool, project_ids: &[Uuid]) -> anyhow::Result<Vec<ProjectMemberRow>> {
    let rows = sqlx::query_as::<_, ProjectMemberRow>(
        r#"
        SELECT m.project_id, m.user_id, m.role, u.name, u.profile_picture
          FROM project_members m
          JOIN users u ON u.id = m.user_id
         WHERE m.project_id = ANY($1)
         ORDER BY m.project_id, u.name
        "#,
    )
    .bind(project_ids)
    .fetch_all(db)
    .await
    .context("list project members")?;
    Ok(rows)
}

/// All projects of a workspace, archived included, newest first.
pub async fn list_in_workspace(db: &PgPool, workspace_id: Uuid) -> anyhow::Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, Project>(&format!(
        "SELECT {} FROM projects WHERE workspace_id = $1 ORDER BY created_at DESC",
        PROJECT_COLUMNS
    ))
    .bind(workspace_id)
    .fetch_all(db)
    .await
    .context("list workspace projects")?;
    Ok(rows)
}

pub async fn count_in_workspace(db: &PgPool, workspace_id: Uuid) -> anyhow::Result<i64> {
    let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM projects WHERE workspace_id = $1")
        .bind(workspace_id)
        .fetch_one(db)
        .await
        .context("count workspace projects")?;
    Ok(n)
}

/// Non-archived projects of a workspace that `user_id` is a member of, newest first.
pub async fn list_visible(
    db: &PgPool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, Project>(
        r#"
        SELECT p.id, p.workspace_id, p.title, p.description, p.status, p.start_date, p.due_date,
               p.tags, p.created_by, p.is_archived, p.created_at, p.updated_at
          FROM projects p
          JOIN project_members m ON m.project_id = p.id AND m.user_id = $2
         WHERE p.workspace_id = $1 AND NOT p.is_archived
         ORDER BY p.created_at DESC
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list visible projects")?;
    Ok(rows)
}
