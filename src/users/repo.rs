use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::repo_types::UserRef;
use crate::auth::repo_types::User;

/// Public references for the given ids. Unknown ids are simply absent.
pub async fn refs_by_ids(db: &PgPool, ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, UserRef>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query_as::<_, UserRef>(
        "SELECT id, name, profile_picture FROM users WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(db)
    .await
    .context("load user refs")?;
    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub workspaces: u64,
    pub projects: u64,
    pub tasks: u64,
}

/// Removes the user and everything reachable from the workspaces they own, and
/// scrubs them from every other membership and task list.
///
/// Runs inside the caller's transaction; nothing is visible until it commits.
pub async fn delete_account_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> anyhow::Result<CascadeReport> {
    let owned: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM workspaces WHERE owner_id = $1")
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .context("owned workspaces")?;

    let mut report = CascadeReport::default();
    if !owned.is_empty() {
        report.tasks = sqlx::query(
            r#"
            DELETE FROM tasks
             WHERE project_id IN (SELECT id FROM projects WHERE workspace_id = ANY($1))
            "#,
        )
        .bind(&owned)
        .execute(&mut **tx)
        .await
        .context("delete owned tasks")?
        .rows_affected();

        report.projects = sqlx::query("DELETE FROM projects WHERE workspace_id = ANY($1)")
            .bind(&owned)
            .execute(&mut **tx)
            .await
            .context("delete owned projects")?
            .rows_affected();

        report.workspaces = sqlx::query("DELETE FROM workspaces WHERE id = ANY($1)")
            .bind(&owned)
            .execute(&mut **tx)
            .await
            .context("delete owned workspaces")?
            .rows_affected();
    }

    sqlx::query("DELETE FROM workspace_members WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("leave workspaces")?;

    sqlx::query("DELETE FROM project_members WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .context("leave projects")?;

    sqlx::query(
        r#"
        UPDATE tasks
           SET assignees = array_remove(assignees, $1),
               watchers = array_remove(watchers, $1)
         WHERE $1 = ANY(assignees) OR $1 = ANY(watchers)
        "#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .context("unassign from tasks")?;

    if User::delete_tx(tx, user_id).await? == 0 {
        anyhow::bail!("user {} vanished during account deletion", user_id);
    }
    Ok(report)
}
