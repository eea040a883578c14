use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Workspace, WorkspaceMemberRow, WorkspaceRole};
use crate::{error::AppError, projects::dto::ProjectView};

pub const DEFAULT_COLOR: &str = "#FF5733";

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl CreateWorkspaceRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(AppError::bad_request("Workspace name is required"));
        }
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.color = self
            .color
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct InviteMemberRequest {
    pub email: String,
    pub role: Option<WorkspaceRole>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteTokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub owner: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&Workspace> for WorkspaceView {
    fn from(w: &Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name.clone(),
            description: w.description.clone(),
            color: w.color.clone(),
            owner: w.owner_id,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMemberView {
    pub user: MemberUser,
    pub role: WorkspaceRole,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

impl From<WorkspaceMemberRow> for WorkspaceMemberView {
    fn from(m: WorkspaceMemberRow) -> Self {
        Self {
            user: MemberUser {
                id: m.user_id,
                name: m.name,
                email: m.email,
                profile_picture: m.profile_picture,
            },
            role: m.role,
            joined_at: m.joined_at,
        }
    }
}

/// Workspace with its members populated.
#[derive(Debug, Serialize)]
pub struct WorkspaceDetails {
    #[serde(flatten)]
    pub workspace: WorkspaceView,
    pub members: Vec<WorkspaceMemberView>,
}

impl WorkspaceDetails {
    pub fn new(ws: &Workspace, members: Vec<WorkspaceMemberRow>) -> Self {
        Self {
            workspace: WorkspaceView::from(ws),
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedWorkspaceResponse {
    pub workspace: WorkspaceView,
}

#[derive(Debug, Serialize)]
pub struct WorkspaceProjectsResponse {
    pub projects: Vec<ProjectView>,
    pub workspace: WorkspaceDetails,
}
