use anyhow::Context;
use serde_json::json;
use sqlx::{PgExecutor, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::repo_types::{Action, ActivityRow, ResourceType};

/// Appends one entry. Accepts a pool or an open transaction.
pub async fn record<'e, E: PgExecutor<'e>>(
    ex: E,
    user_id: Uuid,
    action: Action,
    resource_type: ResourceType,
    resource_id: Uuid,
    description: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_logs (id, user_id, action, resource_type, resource_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.as_str())
    .bind(resource_type.as_str())
    .bind(resource_id)
    .bind(json!({ "description": description }))
    .execute(ex)
    .await
    .context("insert activity")?;
    debug!(%user_id, action = action.as_str(), %resource_id, "activity recorded");
    Ok(())
}

const SELECT_WITH_ACTOR: &str = r#"
    SELECT a.id, a.user_id, a.action, a.resource_type, a.resource_id, a.details, a.created_at,
           u.name AS user_name, u.profile_picture AS user_profile_picture
      FROM activity_logs a
      LEFT JOIN users u ON u.id = a.user_id
"#;

/// Everything that happened to one resource, newest first.
pub async fn list_by_resource(db: &PgPool, resource_id: Uuid) -> anyhow::Result<Vec<ActivityRow>> {
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        "{} WHERE a.resource_id = $1 ORDER BY a.created_at DESC",
        SELECT_WITH_ACTOR
    ))
    .bind(resource_id)
    .fetch_all(db)
    .await
    .context("list activity by resource")?;
    Ok(rows)
}

/// Other people's activity on tasks assigned to `user_id`, newest first.
pub async fn list_for_assignee(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ActivityRow>> {
    let rows = sqlx::query_as::<_, ActivityRow>(&format!(
        r#"{}
         WHERE a.resource_id IN (SELECT t.id FROM tasks t WHERE $1 = ANY(t.assignees))
           AND a.user_id <> $1
         ORDER BY a.created_at DESC
        "#,
        SELECT_WITH_ACTOR
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list activity for assignee")?;
    Ok(rows)
}
