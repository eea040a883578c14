use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Project, ProjectMemberRow, ProjectRole, ProjectStatus};
use crate::{error::AppError, tasks::dto::TaskSummary, users::repo_types::UserRef};

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMemberInput {
    pub user: Uuid,
    pub role: ProjectRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub members: Vec<ProjectMemberInput>,
}

impl CreateProjectRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(AppError::bad_request("Project title is required"));
        }
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for t in self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !tags.iter().any(|x| x == t) {
                tags.push(t.to_string());
            }
        }
        self.tags = tags;
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectMemberView {
    pub user: UserRef,
    pub role: ProjectRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: Uuid,
    pub workspace: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub tags: Vec<String>,
    pub members: Vec<ProjectMemberView>,
    pub created_by: Uuid,
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ProjectView {
    /// `members` may hold rows of other projects; only this project's are kept.
    pub fn new(p: Project, members: &[ProjectMemberRow]) -> Self {
        let members = members
            .iter()
            .filter(|m| m.project_id == p.id)
            .map(|m| ProjectMemberView {
                user: UserRef {
                    id: m.user_id,
                    name: m.name.clone(),
                    profile_picture: m.profile_picture.clone(),
                },
                role: m.role,
            })
            .collect();
        Self {
            id: p.id,
            workspace: p.workspace_id,
            title: p.title,
            description: p.description,
            status: p.status,
            start_date: p.start_date,
            due_date: p.due_date,
            tags: p.tags,
            members,
            created_by: p.created_by,
            is_archived: p.is_archived,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectTasksResponse {
    pub project: ProjectView,
    pub tasks: Vec<TaskSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_parses_dates_and_statuses() {
        let req: CreateProjectRequest = serde_json::from_str(
            r#"{
                "title": " Launch ",
                "status": "In Progress",
                "dueDate": "2024-06-01T00:00:00Z",
                "tags": ["web", " web ", "", "api"],
                "members": [{"user": "00000000-0000-0000-0000-000000000001", "role": "contributor"}]
            }"#,
        )
        .unwrap();
        let req = req.normalize().unwrap();
        assert_eq!(req.title, "Launch");
        assert_eq!(req.status, Some(ProjectStatus::InProgress));
        assert!(req.due_date.is_some());
        assert!(req.start_date.is_none());
        assert_eq!(req.tags, ["web", "api"]);
        assert_eq!(req.members[0].role, ProjectRole::Contributor);
    }

    #[test]
    fn blank_title_rejected() {
        let req: CreateProjectRequest = serde_json::from_str(r#"{"title":"  "}"#).unwrap();
        assert!(matches!(req.normalize(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn view_keeps_only_own_members() {
        let now = OffsetDateTime::now_utc();
        let p = Project {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            title: "P".into(),
            description: None,
            status: ProjectStatus::OnHold,
            start_date: None,
            due_date: None,
            tags: vec![],
            created_by: Uuid::nil(),
            is_archived: false,
            created_at: now,
            updated_at: now,
        };
        let row = |project_id| ProjectMemberRow {
            project_id,
            user_id: Uuid::new_v4(),
            role: ProjectRole::Manager,
            name: "n".into(),
            profile_picture: None,
        };
        let rows = vec![row(p.id), row(Uuid::new_v4())];
        let v = serde_json::to_value(ProjectView::new(p, &rows)).unwrap();
        assert_eq!(v["members"].as_array().unwrap().len(), 1);
        assert_eq!(v["members"][0]["role"], "manager");
        assert_eq!(v["status"], "On Hold");
        assert!(v["dueDate"].is_null());
    }
}
