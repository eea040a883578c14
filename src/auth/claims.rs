use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workspaces::repo_types::WorkspaceRole;

/// What a signed token may be used for. Handlers only accept their own purpose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    Login,
    EmailVerification,
    ResetPassword,
}

/// JWT payload for sessions and one-time verification links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,              // user ID
    pub iat: usize,             // issued at (unix timestamp)
    pub exp: usize,             // expires at (unix timestamp)
    pub iss: String,            // issuer
    pub aud: String,            // audience
    pub purpose: TokenPurpose,
}

/// JWT payload of a workspace invitation link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteClaims {
    pub user: Uuid,
    pub workspace_id: Uuid,
    pub role: WorkspaceRole,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}
