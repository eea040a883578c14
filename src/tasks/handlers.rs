use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AddCommentRequest, AddSubtaskRequest, ArchivedTasksResponse, CommentView,
        CreateTaskRequest, TaskDetailsResponse, TaskSummary, TaskView, UpdateAssigneesRequest,
        UpdateDescriptionRequest, UpdatePriorityRequest, UpdateStatusRequest,
        UpdateSubtaskRequest, UpdateTitleRequest,
    },
    services,
};
use crate::{
    activity::ActivityEntry,
    auth::AuthUser,
    error::{message, AppError},
    extract::{Json, Path},
    state::AppState,
    uploads,
};

// One parameter name per segment: `:id` is a project id for create-task and a
// task (or any resource, for `/activity`) id everywhere else.
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks/:id/create-task", post(create_task))
        .route("/tasks/my-tasks", get(my_tasks))
        .route("/tasks/my-activities", get(my_activities))
        .route("/tasks/archived-tasks", get(archived_tasks))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/title", patch(update_title))
        .route("/tasks/:id/description", patch(update_description))
        .route("/tasks/:id/status", patch(update_status))
        .route("/tasks/:id/assignees", patch(update_assignees))
        .route("/tasks/:id/priority", patch(update_priority))
        .route("/tasks/:id/add-subtask", post(add_subtask))
        .route("/tasks/:id/update-subtask/:sub_id", patch(update_subtask))
        .route("/tasks/:id/add-comment", post(add_comment))
        .route("/tasks/:id/comments", get(get_comments))
        .route("/tasks/:id/watch", post(watch_task))
        .route("/tasks/:id/archived", post(archive_task))
        .route("/tasks/:id/upload-attachment", post(upload_attachment))
        .route("/tasks/:id/delete-task", delete(delete_task))
        .route("/tasks/:id/activity", get(get_activity))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskView>), AppError> {
    let task = services::create_task(&state, &user, project_id, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<TaskSummary>>, AppError> {
    Ok(Json(services::my_tasks(&state, &user).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_activities(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    Ok(Json(services::my_activities(&state, &user).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn archived_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<ArchivedTasksResponse>, AppError> {
    Ok(Json(services::archived_tasks(&state, &user).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskDetailsResponse>, AppError> {
    Ok(Json(services::task_details(&state, &user, task_id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_title(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateTitleRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_title(&state, &user, task_id, &payload.title).await?,
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_description(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateDescriptionRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_description(&state, &user, task_id, &payload.description).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_status(&state, &user, task_id, payload.status).await?,
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_assignees(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdateAssigneesRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_assignees(&state, &user, task_id, payload.assignee_ids).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update_priority(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<UpdatePriorityRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_priority(&state, &user, task_id, payload.priority).await?,
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn add_subtask(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<AddSubtaskRequest>,
) -> Result<(StatusCode, Json<TaskView>), AppError> {
    let task = services::add_subtask(&state, &user, task_id, &payload.title).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update_subtask(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((task_id, subtask_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateSubtaskRequest>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(
        services::update_subtask(&state, &user, task_id, subtask_id, payload.completed).await?,
    ))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn add_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(payload): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let comment = services::add_comment(&state, &user, task_id, &payload.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_comments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    Ok(Json(services::comments(&state, &user, task_id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn watch_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(services::toggle_watch(&state, &user, task_id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn archive_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskView>, AppError> {
    Ok(Json(services::toggle_archive(&state, &user, task_id).await?))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_attachment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<Json<TaskView>, AppError> {
    let file = uploads::single_file(&mut mp, "attachment", state.config.upload_max_bytes)
        .await?
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    Ok(Json(
        services::upload_attachment(&state, &user, task_id, file).await?,
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::delete_task(&state, &user, task_id).await?;
    Ok(message("Task deleted successfully"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_activity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(resource_id): Path<Uuid>,
) -> Result<Json<Vec<ActivityEntry>>, AppError> {
    Ok(Json(services::resource_activity(&state, resource_id).await?))
}
