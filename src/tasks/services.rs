use sqlx::{Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{
        dedup, ArchivedTasksResponse, CommentView, CreateTaskRequest, TaskDetailsResponse,
        TaskSummary, TaskView,
    },
    repo::{self, NewAttachment, NewTask},
    repo_types::{Task, TaskPriority, TaskStatus},
};
use crate::{
    activity::{self, Action, ActivityEntry, ResourceType},
    auth::repo_types::User,
    error::AppError,
    projects::{
        self,
        repo_types::{Project, ProjectRole},
    },
    state::AppState,
    storage,
    uploads::UploadedFile,
    users,
    workspaces,
};

pub const NOT_PROJECT_MEMBER: &str = "Not a member of this project";

/// A task together with its project and the caller's role in that project.
pub struct TaskAccess {
    pub task: Task,
    pub project: Project,
    pub role: ProjectRole,
}

pub(crate) fn require_manager(role: ProjectRole, msg: &str) -> Result<(), AppError> {
    if role == ProjectRole::Manager {
        Ok(())
    } else {
        Err(AppError::forbidden(msg))
    }
}

fn non_empty(s: &str, what: &str) -> Result<String, AppError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", what)));
    }
    Ok(s.to_string())
}

/// Human-readable activity descriptions.
pub(crate) mod describe {
    use super::*;

    pub fn created(title: &str) -> String {
        format!("created task {}", title)
    }

    pub fn title(old: &str, new: &str) -> String {
        format!("updated task title from {} to {}", old, new)
    }

    pub fn description(old: Option<&str>, new: &str) -> String {
        format!("updated task description from {} to {}", old.unwrap_or(""), new)
    }

    pub fn status(old: TaskStatus, new: TaskStatus) -> String {
        format!("updated task status from {} to {}", old.label(), new.label())
    }

    pub fn priority(old: TaskPriority, new: TaskPriority) -> String {
        format!("updated task priority from {} to {}", old.label(), new.label())
    }

    pub fn assignees(old: usize, new: usize) -> String {
        format!("updated task assignees from {} to {}", old, new)
    }

    pub fn watch(started: bool, title: &str) -> String {
        let verb = if started { "started watching" } else { "stopped watching" };
        format!("{} task {}", verb, title)
    }

    pub fn archive(archived: bool, title: &str) -> String {
        let verb = if archived { "Archived" } else { "Unarchived" };
        format!("{} task {}", verb, title)
    }

    pub fn deleted(title: &str) -> String {
        format!("Deleted task: {}", title)
    }
}

/// 404 for a missing task or project, 403 (with `not_member`) for outsiders.
pub async fn load_for_member(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
    not_member: &str,
) -> Result<TaskAccess, AppError> {
    let task = repo::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))?;
    let project = projects::services::find_project(state, task.project_id).await?;
    let role = projects::repo::member_role(&state.db, project.id, user_id)
        .await?
        .ok_or_else(|| AppError::forbidden(not_member))?;
    Ok(TaskAccess {
        task,
        project,
        role,
    })
}

/// Read access: the caller must belong to the task's workspace.
async fn load_for_reader(
    state: &AppState,
    task_id: Uuid,
    user_id: Uuid,
) -> Result<(Task, Project), AppError> {
    let task = repo::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))?;
    let project = projects::services::find_project(state, task.project_id).await?;
    workspaces::services::require_member(state, project.workspace_id, user_id).await?;
    Ok((task, project))
}

async fn record_and_commit(
    mut tx: Transaction<'_, Postgres>,
    user_id: Uuid,
    action: Action,
    task_id: Uuid,
    description: &str,
) -> Result<(), AppError> {
    activity::record(&mut *tx, user_id, action, ResourceType::Task, task_id, description).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn task_view(state: &AppState, task: Task) -> Result<TaskView, AppError> {
    let people: Vec<Uuid> = task.assignees.iter().chain(&task.watchers).copied().collect();
    let refs = users::repo::refs_by_ids(&state.db, &people).await?;
    let subtasks = repo::subtasks(&state.db, task.id).await?;
    let attachments = repo::attachments(&state.db, task.id).await?;
    Ok(TaskView::new(task, &refs, subtasks, attachments))
}

pub async fn summaries_for_project(
    state: &AppState,
    project_id: Uuid,
) -> Result<Vec<TaskSummary>, AppError> {
    let tasks = repo::list_by_project(&state.db, project_id).await?;
    let people: Vec<Uuid> = tasks.iter().flat_map(|t| t.assignees.iter().copied()).collect();
    let refs = users::repo::refs_by_ids(&state.db, &people).await?;
    Ok(tasks
        .into_iter()
        .map(|t| TaskSummary::new(t, &refs))
        .collect())
}

async fn assigned_to(
    state: &AppState,
    user: &User,
    archived_only: bool,
) -> Result<Vec<TaskSummary>, AppError> {
    let rows = repo::list_assigned(&state.db, user.id, archived_only).await?;
    let people: Vec<Uuid> = rows
        .iter()
        .flat_map(|r| r.task.assignees.iter().copied())
        .collect();
    let refs = users::repo::refs_by_ids(&state.db, &people).await?;
    Ok(rows
        .into_iter()
        .map(|r| TaskSummary::with_project(r, &refs))
        .collect())
}

pub async fn my_tasks(state: &AppState, user: &User) -> Result<Vec<TaskSummary>, AppError> {
    assigned_to(state, user, false).await
}

pub async fn archived_tasks(state: &AppState, user: &User) -> Result<ArchivedTasksResponse, AppError> {
    Ok(ArchivedTasksResponse {
        archived_tasks: assigned_to(state, user, true).await?,
    })
}

pub async fn my_activities(state: &AppState, user: &User) -> Result<Vec<ActivityEntry>, AppError> {
    let rows = activity::repo::list_for_assignee(&state.db, user.id).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn resource_activity(
    state: &AppState,
    resource_id: Uuid,
) -> Result<Vec<ActivityEntry>, AppError> {
    let rows = activity::repo::list_by_resource(&state.db, resource_id).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn create_task(
    state: &AppState,
    user: &User,
    project_id: Uuid,
    req: CreateTaskRequest,
) -> Result<TaskView, AppError> {
    let req = req.normalize()?;
    let project = projects::services::find_project(state, project_id).await?;
    workspaces::services::require_member(state, project.workspace_id, user.id).await?;

    let mut tx = state.db.begin().await?;
    let task = repo::create(
        &mut *tx,
        &NewTask {
            project_id: project.id,
            title: &req.title,
            description: req.description.as_deref(),
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            assignees: &req.assignees,
            created_by: user.id,
        },
    )
    .await?;
    record_and_commit(tx, user.id, Action::CreatedTask, task.id, &describe::created(&task.title))
        .await?;

    info!(task_id = %task.id, project_id = %project.id, "task created");
    task_view(state, task).await
}

pub async fn task_details(
    state: &AppState,
    user: &User,
    task_id: Uuid,
) -> Result<TaskDetailsResponse, AppError> {
    let (task, project) = load_for_reader(state, task_id, user.id).await?;
    Ok(TaskDetailsResponse {
        task: task_view(state, task).await?,
        project: projects::services::view(state, project).await?,
    })
}

pub async fn update_title(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    title: &str,
) -> Result<TaskView, AppError> {
    let title = non_empty(title, "Title")?;
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let task = repo::update_title(&mut *tx, task_id, &title).await?;
    let desc = describe::title(&access.task.title, &title);
    record_and_commit(tx, user.id, Action::UpdatedTask, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn update_description(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    description: &str,
) -> Result<TaskView, AppError> {
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let task = repo::update_description(&mut *tx, task_id, description).await?;
    let desc = describe::description(access.task.description.as_deref(), description);
    record_and_commit(tx, user.id, Action::UpdatedTask, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn update_status(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    status: TaskStatus,
) -> Result<TaskView, AppError> {
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let task = repo::update_status(&mut *tx, task_id, status).await?;
    let desc = describe::status(access.task.status, status);
    record_and_commit(tx, user.id, Action::UpdatedTaskStatus, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn update_priority(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    priority: TaskPriority,
) -> Result<TaskView, AppError> {
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let task = repo::update_priority(&mut *tx, task_id, priority).await?;
    let desc = describe::priority(access.task.priority, priority);
    record_and_commit(tx, user.id, Action::UpdatedTaskPriority, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn update_assignees(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    assignee_ids: Vec<Uuid>,
) -> Result<TaskView, AppError> {
    let assignees = dedup(assignee_ids);
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let desc = describe::assignees(access.task.assignees.len(), assignees.len());
    let mut tx = state.db.begin().await?;
    let task = repo::update_assignees(&mut *tx, task_id, assignees).await?;
    record_and_commit(tx, user.id, Action::UpdatedTaskAssignees, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn add_subtask(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    title: &str,
) -> Result<TaskView, AppError> {
    let title = non_empty(title, "Title")?;
    let access = load_for_member(state, task_id, user.id, "You are not a member of this project")
        .await?;
    let mut tx = state.db.begin().await?;
    repo::add_subtask(&mut *tx, task_id, &title).await?;
    repo::touch(&mut *tx, task_id).await?;
    let desc = format!("created subtask {}", title);
    record_and_commit(tx, user.id, Action::CreatedSubtask, task_id, &desc).await?;
    let task = refreshed(state, access.task.id).await?;
    task_view(state, task).await
}

pub async fn update_subtask(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    subtask_id: Uuid,
    completed: bool,
) -> Result<TaskView, AppError> {
    load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let sub = repo::set_subtask_completed(&mut *tx, task_id, subtask_id, completed)
        .await?
        .ok_or_else(|| AppError::not_found("Subtask not found"))?;
    repo::touch(&mut *tx, task_id).await?;
    let desc = format!("updated subtask {}", sub.title);
    record_and_commit(tx, user.id, Action::UpdatedSubtask, task_id, &desc).await?;
    let task = refreshed(state, task_id).await?;
    task_view(state, task).await
}

pub async fn add_comment(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    text: &str,
) -> Result<CommentView, AppError> {
    let text = non_empty(text, "Comment")?;
    load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let comment = repo::add_comment(&mut *tx, task_id, user.id, &text).await?;
    let desc = format!("added comment {}", text);
    record_and_commit(tx, user.id, Action::AddedComment, task_id, &desc).await?;
    Ok(comment.into())
}

pub async fn comments(
    state: &AppState,
    user: &User,
    task_id: Uuid,
) -> Result<Vec<CommentView>, AppError> {
    load_for_reader(state, task_id, user.id).await?;
    let rows = repo::comments(&state.db, task_id).await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn toggle_watch(state: &AppState, user: &User, task_id: Uuid) -> Result<TaskView, AppError> {
    load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    let mut tx = state.db.begin().await?;
    let task = repo::toggle_watcher(&mut *tx, task_id, user.id).await?;
    let desc = describe::watch(task.watchers.contains(&user.id), &task.title);
    record_and_commit(tx, user.id, Action::UpdatedTask, task_id, &desc).await?;
    task_view(state, task).await
}

pub async fn toggle_archive(
    state: &AppState,
    user: &User,
    task_id: Uuid,
) -> Result<TaskView, AppError> {
    let access = load_for_member(state, task_id, user.id, NOT_PROJECT_MEMBER).await?;
    require_manager(access.role, "Only project managers can archive or unarchive tasks")?;
    let mut tx = state.db.begin().await?;
    let task = repo::toggle_archived(&mut *tx, task_id).await?;
    let desc = describe::archive(task.is_archived, &task.title);
    record_and_commit(tx, user.id, Action::UpdatedTask, task_id, &desc).await?;
    task_view(state, task).await
}

async fn persist_attachment(
    state: &AppState,
    user_id: Uuid,
    attachment: &NewAttachment<'_>,
) -> Result<(), AppError> {
    let mut tx = state.db.begin().await?;
    repo::add_attachment(&mut *tx, attachment).await?;
    repo::touch(&mut *tx, attachment.task_id).await?;
    let desc = format!("uploaded attachment {}", attachment.file_name);
    record_and_commit(tx, user_id, Action::UploadedAttachment, attachment.task_id, &desc).await
}

pub async fn upload_attachment(
    state: &AppState,
    user: &User,
    task_id: Uuid,
    file: UploadedFile,
) -> Result<TaskView, AppError> {
    load_for_member(
        state,
        task_id,
        user.id,
        "You must be a member of the project to upload files",
    )
    .await?;

    let size = file.size();
    let UploadedFile {
        file_name,
        content_type,
        body,
    } = file;
    let stored = storage::store(state.storage.as_ref(), "attachments", body, &content_type)
        .await
        .map_err(|e| AppError::internal("Upload failed", e))?;

    let attachment = NewAttachment {
        task_id,
        file_name: &file_name,
        file_url: &stored.url,
        file_type: &content_type,
        file_size: size,
        uploaded_by: user.id,
    };
    if let Err(e) = persist_attachment(state, user.id, &attachment).await {
        storage::discard(state.storage.as_ref(), &stored.key).await;
        return Err(e);
    }

    info!(%task_id, key = %stored.key, size, "attachment uploaded");
    let task = refreshed(state, task_id).await?;
    task_view(state, task).await
}

pub async fn delete_task(state: &AppState, user: &User, task_id: Uuid) -> Result<(), AppError> {
    let access = load_for_member(
        state,
        task_id,
        user.id,
        "You are not a member of the project",
    )
    .await?;
    require_manager(access.role, "Only project managers can delete tasks")?;

    let mut tx = state.db.begin().await?;
    repo::delete(&mut *tx, task_id).await?;
    record_and_commit(
        tx,
        user.id,
        Action::DeletedTask,
        task_id,
        &describe::deleted(&access.task.title),
    )
    .await?;
    info!(%task_id, project_id = %access.project.id, "task deleted");
    Ok(())
}

async fn refreshed(state: &AppState, task_id: Uuid) -> Result<Task, AppError> {
    repo::find_by_id(&state.db, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("Task not found"))
}
