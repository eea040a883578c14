use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateProjectRequest, ProjectTasksResponse, ProjectView},
    services,
};
use crate::{
    auth::AuthUser,
    error::AppError,
    extract::{Json, Path},
    state::AppState,
};

// `:id` is a workspace id for create-project and a project id elsewhere; the
// router needs one parameter name per segment.
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/create-project", post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/tasks", get(get_project_tasks))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectView>), AppError> {
    let project = services::create_project(&state, &user, workspace_id, payload).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectView>, AppError> {
    Ok(Json(services::project_details(&state, &user, project_id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_project_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectTasksResponse>, AppError> {
    Ok(Json(services::project_tasks(&state, &user, project_id).await?))
}
