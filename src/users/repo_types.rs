use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Minimal public projection of a user, used wherever a reference is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub profile_picture: Option<String>,
}
