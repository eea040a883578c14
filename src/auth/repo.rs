use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{User, Verification, VerificationPurpose};

const USER_COLUMNS: &str = r#"
    id, email, name, password_hash, profile_picture, is_email_verified, last_login,
    is_two_factor_enabled, two_factor_secret, created_at, updated_at
"#;

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    pub async fn create(
        db: &PgPool,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    pub async fn mark_email_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET is_email_verified = TRUE, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("mark email verified")?;
        Ok(())
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET last_login = now(), updated_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_one(db)
        .await
        .context("update last login")?;
        Ok(user)
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await
            .context("update password")?;
        Ok(())
    }

    pub async fn enable_two_factor(db: &PgPool, id: Uuid, secret: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET is_two_factor_enabled = TRUE, two_factor_secret = $2, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(secret)
        .execute(db)
        .await
        .context("enable 2fa")?;
        Ok(())
    }

    pub async fn disable_two_factor(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET is_two_factor_enabled = FALSE, two_factor_secret = NULL, updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await
        .context("disable 2fa")?;
        Ok(())
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: &str,
        profile_picture: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET name = $2,
                   profile_picture = COALESCE($3, profile_picture),
                   updated_at = now()
             WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(name)
        .bind(profile_picture)
        .fetch_one(db)
        .await
        .context("update profile")?;
        Ok(user)
    }

    pub async fn set_profile_picture(db: &PgPool, id: Uuid, url: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET profile_picture = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(url)
            .execute(db)
            .await
            .context("set profile picture")?;
        Ok(())
    }

    pub async fn delete_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .context("delete user")?;
        Ok(res.rows_affected())
    }
}

impl Verification {
    /// Most recent verification of `purpose` for the user, expired or not.
    pub async fn find_latest(
        db: &PgPool,
        user_id: Uuid,
        purpose: VerificationPurpose,
    ) -> anyhow::Result<Option<Verification>> {
        let row = sqlx::query_as::<_, Verification>(
            r#"
            SELECT id, user_id, purpose, token, expires_at, created_at
              FROM verifications
             WHERE user_id = $1 AND purpose = $2
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .fetch_optional(db)
        .await
        .context("find latest verification")?;
        Ok(row)
    }

    pub async fn find_by_token(
        db: &PgPool,
        user_id: Uuid,
        token: &str,
    ) -> anyhow::Result<Option<Verification>> {
        let row = sqlx::query_as::<_, Verification>(
            r#"
            SELECT id, user_id, purpose, token, expires_at, created_at
              FROM verifications
             WHERE user_id = $1 AND token = $2
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_optional(db)
        .await
        .context("find verification by token")?;
        Ok(row)
    }

    /// Replaces every verification of `purpose` for the user with a single new row.
    pub async fn replace(
        db: &PgPool,
        user_id: Uuid,
        purpose: VerificationPurpose,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<Verification> {
        let mut tx = db.begin().await.context("begin tx")?;
        sqlx::query("DELETE FROM verifications WHERE user_id = $1 AND purpose = $2")
            .bind(user_id)
            .bind(purpose)
            .execute(&mut *tx)
            .await
            .context("delete stale verifications")?;
        let row = sqlx::query_as::<_, Verification>(
            r#"
            INSERT INTO verifications (id, user_id, purpose, token, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, purpose, token, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(purpose)
        .bind(token)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .context("insert verification")?;
        tx.commit().await.context("commit tx")?;
        Ok(row)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM verifications WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("delete verification")?;
        Ok(())
    }

    pub async fn delete_all_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM verifications WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await
            .context("delete verifications for user")?;
        Ok(res.rows_affected())
    }
}
