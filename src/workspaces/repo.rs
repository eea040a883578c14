use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Workspace, WorkspaceInvite, WorkspaceMemberRow, WorkspaceRole};

const WORKSPACE_COLUMNS: &str = "id, name, description, color, owner_id, created_at, updated_at";

/// Creates the workspace with its creator as the sole `owner` member.
pub async fn create(
    db: &PgPool,
    owner_id: Uuid,
    name: &str,
    description: Option<&str>,
    color: &str,
) -> anyhow::Result<Workspace> {
    let mut tx = db.begin().await.context("begin tx")?;
    let ws = sqlx::query_as::<_, Workspace>(&format!(
        r#"
        INSERT INTO workspaces (id, name, description, color, owner_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        WORKSPACE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(description)
    .bind(color)
    .bind(owner_id)
    .fetch_one(&mut *tx)
    .await
    .context("insert workspace")?;
    add_member(&mut *tx, ws.id, owner_id, WorkspaceRole::Owner).await?;
    tx.commit().await.context("commit tx")?;
    Ok(ws)
}

pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Workspace>> {
    let ws = sqlx::query_as::<_, Workspace>(&format!(
        "SELECT {} FROM workspaces WHERE id = $1",
        WORKSPACE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(db)
    .await
    .context("find workspace")?;
    Ok(ws)
}

pub async fn list_for_member(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Workspace>> {
    let rows = sqlx::query_as::<_, Workspace>(
        r#"
        SELECT w.id, w.name, w.description, w.color, w.owner_id, w.created_at, w.updated_at
          FROM workspaces w
          JOIN workspace_members m ON m.workspace_id = w.id
         WHERE m.user_id = $1
         ORDER BY w.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list workspaces for member")?;
    Ok(rows)
}

pub async fn members(db: &PgPool, workspace_id: Uuid) -> anyhow::Result<Vec<WorkspaceMemberRow>> {
    let rows = sqlx::query_as::<_, WorkspaceMemberRow>(
        r#"
        SELECT m.user_id, m.role, m.joined_at, u.name, u.email, u.profile_picture
          FROM workspace_members m
          JOIN users u ON u.id = m.user_id
         WHERE m.workspace_id = $1
         ORDER BY m.joined_at ASC
        "#,
    )
    .bind(workspace_id)
    .fetch_all(db)
    .await
    .context("list workspace members")?;
    Ok(rows)
}

pub async fn member_role(
    db: &PgPool,
    workspace_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<Option<WorkspaceRole>> {
    let role = sqlx::query_scalar::<_, WorkspaceRole>(
        "SELECT role FROM workspace_members WHERE workspace_id = $1 AND user_id = $2",
    )
    .bind(workspace_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("workspace member role")?;
    Ok(role)
}

/// Inserts a membership. Returns `false` when the user already was a member.
pub async fn add_member<'e, E: PgExecutor<'e>>(
    ex: E,
    workspace_id: Uuid,
    user_id: Uuid,
    role: WorkspaceRole,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        INSERT INTO workspace_members (workspace_id, user_id, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (workspace_id, user_id) DO NOTHING
        "#,
    )
    .bind(workspace_id)
    .bind(user_id)
    .bind(role)
    .execute(ex)
    .await
    .context("insert workspace member")?;
    Ok(res.rows_affected() == 1)
}

pub async fn find_invite(
    db: &PgPool,
    user_id: Uuid,
    workspace_id: Uuid,
) -> anyhow::Result<Option<WorkspaceInvite>> {
    let row = sqlx::query_as::<_, WorkspaceInvite>(
        r#"
        SELECT id, user_id, workspace_id, token, role, expires_at, created_at
          FROM workspace_invites
         WHERE user_id = $1 AND workspace_id = $2
        "#,
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_optional(db)
    .await
    .context("find workspace invite")?;
    Ok(row)
}

/// Stores the invite, overwriting an expired one for the same (user, workspace).
pub async fn upsert_invite(
    db: &PgPool,
    user_id: Uuid,
    workspace_id: Uuid,
    token: &str,
    role: WorkspaceRole,
    expires_at: OffsetDateTime,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO workspace_invites (id, user_id, workspace_id, token, role, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id, workspace_id)
        DO UPDATE SET token = EXCLUDED.token,
                      role = EXCLUDED.role,
                      expires_at = EXCLUDED.expires_at,
                      created_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(workspace_id)
    .bind(token)
    .bind(role)
    .bind(expires_at)
    .execute(db)
    .await
    .context("upsert workspace invite")?;
    Ok(())
}

pub async fn delete_invite<'e, E: PgExecutor<'e>>(ex: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM workspace_invites WHERE id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("delete workspace invite")?;
    Ok(())
}

/// Returns the ids in `user_ids` that are not members of the workspace.
pub async fn non_members(
    db: &PgPool,
    workspace_id: Uuid,
    user_ids: &[Uuid],
) -> anyhow::Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT u.id
          FROM unnest($2::uuid[]) AS u(id)
         WHERE NOT EXISTS (
               SELECT 1 FROM workspace_members m
                WHERE m.workspace_id = $1 AND m.user_id = u.id)
        "#,
    )
    .bind(workspace_id)
    .bind(user_ids)
    .fetch_all(db)
    .await
    .context("workspace non-members")?;
    Ok(ids)
}
