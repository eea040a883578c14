use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Verbs written to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreatedTask,
    UpdatedTask,
    UpdatedTaskStatus,
    UpdatedTaskAssignees,
    UpdatedTaskPriority,
    CreatedSubtask,
    UpdatedSubtask,
    AddedComment,
    UploadedAttachment,
    DeletedTask,
    CreatedProject,
    JoinedWorkspace,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::CreatedTask => "created_task",
            Action::UpdatedTask => "updated_task",
            Action::UpdatedTaskStatus => "updated_task_status",
            Action::UpdatedTaskAssignees => "updated_task_assignees",
            Action::UpdatedTaskPriority => "updated_task_priority",
            Action::CreatedSubtask => "created_subtask",
            Action::UpdatedSubtask => "updated_subtask",
            Action::AddedComment => "added_comment",
            Action::UploadedAttachment => "uploaded_attachment",
            Action::DeletedTask => "deleted_task",
            Action::CreatedProject => "created_project",
            Action::JoinedWorkspace => "joined_workspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Task,
    Project,
    Workspace,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Task => "Task",
            ResourceType::Project => "Project",
            ResourceType::Workspace => "Workspace",
        }
    }
}

/// Activity row joined with its actor. The actor may be gone (account deleted).
#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub user_name: Option<String>,
    pub user_profile_picture: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityActor {
    pub id: Uuid,
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user: ActivityActor,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub details: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(r: ActivityRow) -> Self {
        Self {
            id: r.id,
            user: ActivityActor {
                id: r.user_id,
                name: r.user_name,
                profile_picture: r.user_profile_picture,
            },
            action: r.action,
            resource_type: r.resource_type,
            resource_id: r.resource_id,
            details: r.details,
            created_at: r.created_at,
        }
    }
}
