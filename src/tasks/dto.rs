use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    Attachment, CommentRow, Subtask, Task, TaskPriority, TaskStatus, TaskWithProjectRow,
};
use crate::{error::AppError, projects::dto::ProjectView, users::repo_types::UserRef};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(default)]
    pub assignees: Vec<Uuid>,
}

impl CreateTaskRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(AppError::bad_request("Task title is required"));
        }
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.assignees = dedup(self.assignees);
        Ok(self)
    }
}

pub(crate) fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: TaskPriority,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAssigneesRequest {
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AddSubtaskRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubtaskRequest {
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

/// Looks up each id in `refs`, keeping order and skipping users that no longer exist.
pub(crate) fn populate(ids: &[Uuid], refs: &HashMap<Uuid, UserRef>) -> Vec<UserRef> {
    ids.iter().filter_map(|id| refs.get(id).cloned()).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskView {
    pub id: Uuid,
    pub title: String,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Subtask> for SubtaskView {
    fn from(s: Subtask) -> Self {
        Self {
            id: s.id,
            title: s.title,
            completed: s.completed,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentView {
    pub id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl From<Attachment> for AttachmentView {
    fn from(a: Attachment) -> Self {
        Self {
            id: a.id,
            file_name: a.file_name,
            file_url: a.file_url,
            file_type: a.file_type,
            file_size: a.file_size,
            uploaded_by: a.uploaded_by,
            uploaded_at: a.uploaded_at,
        }
    }
}

/// A task with every embedded collection and reference resolved.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: Uuid,
    pub project: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assignees: Vec<UserRef>,
    pub watchers: Vec<UserRef>,
    pub subtasks: Vec<SubtaskView>,
    pub attachments: Vec<AttachmentView>,
    pub is_archived: bool,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TaskView {
    pub fn new(
        t: Task,
        refs: &HashMap<Uuid, UserRef>,
        subtasks: Vec<Subtask>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self {
            id: t.id,
            project: t.project_id,
            assignees: populate(&t.assignees, refs),
            watchers: populate(&t.watchers, refs),
            title: t.title,
            description: t.description,
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            subtasks: subtasks.into_iter().map(Into::into).collect(),
            attachments: attachments.into_iter().map(Into::into).collect(),
            is_archived: t.is_archived,
            created_by: t.created_by,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub id: Uuid,
    pub title: String,
    pub workspace: Uuid,
}

/// List entry: assignees resolved, embedded collections left out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectRef>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    pub assignees: Vec<UserRef>,
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TaskSummary {
    pub fn new(t: Task, refs: &HashMap<Uuid, UserRef>) -> Self {
        Self {
            id: t.id,
            project_id: t.project_id,
            project: None,
            assignees: populate(&t.assignees, refs),
            title: t.title,
            description: t.description,
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            is_archived: t.is_archived,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }

    pub fn with_project(row: TaskWithProjectRow, refs: &HashMap<Uuid, UserRef>) -> Self {
        let project = ProjectRef {
            id: row.task.project_id,
            title: row.project_title,
            workspace: row.workspace_id,
        };
        Self {
            project: Some(project),
            ..Self::new(row.task, refs)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDetailsResponse {
    pub task: TaskView,
    pub project: ProjectView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTasksResponse {
    pub archived_tasks: Vec<TaskSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub id: Uuid,
    pub name: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: Uuid,
    pub task: Uuid,
    pub author: CommentAuthor,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentView {
    fn from(c: CommentRow) -> Self {
        Self {
            id: c.id,
            task: c.task_id,
            author: CommentAuthor {
                id: c.author_id,
                name: c.author_name,
                profile_picture: c.author_profile_picture,
            },
            text: c.text,
            created_at: c.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            name: name.into(),
            profile_picture: None,
        }
    }

    #[test]
    fn populate_keeps_order_and_skips_missing() {
        let a = user("a");
        let b = user("b");
        let refs: HashMap<_, _> = [(a.id, a.clone()), (b.id, b.clone())].into_iter().collect();
        let out = populate(&[b.id, Uuid::new_v4(), a.id], &refs);
        assert_eq!(out, vec![b, a]);
    }

    #[test]
    fn create_request_uses_display_names_for_enums() {
        let id = Uuid::new_v4();
        let body = format!(
            r#"{{"title":" Fix ","status":"To Do","priority":"High","assignees":["{id}","{id}"]}}"#
        );
        let req: CreateTaskRequest = serde_json::from_str(&body).unwrap();
        let req = req.normalize().unwrap();
        assert_eq!(req.title, "Fix");
        assert_eq!(req.status, TaskStatus::ToDo);
        assert_eq!(req.priority, TaskPriority::High);
        assert_eq!(req.assignees, vec![id]);
    }

    #[test]
    fn unknown_status_is_rejected_at_the_boundary() {
        let r: Result<UpdateStatusRequest, _> = serde_json::from_str(r#"{"status":"Blocked"}"#);
        assert!(r.is_err());
    }

    #[test]
    fn assignees_body_is_camel_case() {
        let r: UpdateAssigneesRequest = serde_json::from_str(r#"{"assigneeIds":[]}"#).unwrap();
        assert!(r.assignee_ids.is_empty());
    }

    #[test]
    fn summary_with_project_embeds_ref() {
        let now = OffsetDateTime::now_utc();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "t".into(),
            description: None,
            status: TaskStatus::Review,
            priority: TaskPriority::Low,
            due_date: None,
            assignees: vec![],
            watchers: vec![],
            is_archived: true,
            created_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
        };
        let ws = Uuid::new_v4();
        let pid = task.project_id;
        let row = TaskWithProjectRow {
            task,
            project_title: "Proj".into(),
            workspace_id: ws,
        };
        let v = serde_json::to_value(TaskSummary::with_project(row, &HashMap::new())).unwrap();
        assert_eq!(v["project"]["title"], "Proj");
        assert_eq!(v["project"]["workspace"], ws.to_string());
        assert_eq!(v["projectId"], pid.to_string());
        assert_eq!(v["status"], "Review");
    }
}
