use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Carries secrets; clients only ever see `PublicUser`.
#[derive(Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub is_email_verified: bool,
    pub last_login: Option<OffsetDateTime>,
    pub is_two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("is_email_verified", &self.is_email_verified)
            .field("is_two_factor_enabled", &self.is_two_factor_enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_purpose", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VerificationPurpose {
    EmailVerification,
    ResetPassword,
}

/// One-time token row backing email verification and password reset links.
#[derive(Debug, Clone, FromRow)]
pub struct Verification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purpose: VerificationPurpose,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl Verification {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at < now
    }
}
