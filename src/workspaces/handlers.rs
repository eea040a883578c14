use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{
        AcceptInviteTokenRequest, CreateWorkspaceRequest, CreatedWorkspaceResponse,
        InviteMemberRequest, WorkspaceDetails, WorkspaceProjectsResponse, WorkspaceView,
    },
    repo, services,
    stats::{self, WorkspaceStats},
};
use crate::{
    auth::AuthUser,
    error::{message, AppError},
    extract::{Json, Path},
    projects,
    state::AppState,
};

pub fn workspace_routes() -> Router<AppState> {
    Router::new()
        .route("/workspaces", post(create_workspace).get(list_workspaces))
        .route("/workspaces/accept-invite-token", post(accept_invite_token))
        .route("/workspaces/:workspace_id", get(get_workspace))
        .route("/workspaces/:workspace_id/projects", get(get_workspace_projects))
        .route("/workspaces/:workspace_id/stats", get(get_workspace_stats))
        .route("/workspaces/:workspace_id/invite-member", post(invite_member))
        .route(
            "/workspaces/:workspace_id/accept-general-invite",
            post(accept_general_invite),
        )
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_workspace(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<CreatedWorkspaceResponse>), AppError> {
    let ws = services::create_workspace(&state, &user, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedWorkspaceResponse {
            workspace: WorkspaceView::from(&ws),
        }),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_workspaces(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<WorkspaceView>>, AppError> {
    let rows = repo::list_for_member(&state.db, user.id).await?;
    Ok(Json(rows.iter().map(WorkspaceView::from).collect()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_workspace(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<WorkspaceDetails>, AppError> {
    let ws = services::find_workspace(&state, workspace_id).await?;
    let members = repo::members(&state.db, ws.id).await?;
    Ok(Json(WorkspaceDetails::new(&ws, members)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_workspace_projects(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<WorkspaceProjectsResponse>, AppError> {
    // non-members get the same 404 as a missing workspace
    let ws = match repo::find_by_id(&state.db, workspace_id).await? {
        Some(ws) if repo::member_role(&state.db, ws.id, user.id).await?.is_some() => ws,
        _ => return Err(AppError::not_found("Workspace not found")),
    };
    let members = repo::members(&state.db, ws.id).await?;
    let projects = projects::services::visible_in_workspace(&state, ws.id, user.id).await?;
    Ok(Json(WorkspaceProjectsResponse {
        projects,
        workspace: WorkspaceDetails::new(&ws, members),
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_workspace_stats(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<WorkspaceStats>, AppError> {
    services::require_member(&state, workspace_id, user.id).await?;
    Ok(Json(stats::load(&state.db, workspace_id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn invite_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
    Json(payload): Json<InviteMemberRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::invite_member(&state, &user, workspace_id, payload).await?;
    Ok(message("Member invited"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn accept_general_invite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::accept_general_invite(&state, &user, workspace_id).await?;
    Ok(message("Invitation accepted"))
}

#[instrument(skip(state, payload))]
pub async fn accept_invite_token(
    State(state): State<AppState>,
    Json(payload): Json<AcceptInviteTokenRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::accept_invite_token(&state, &payload.token).await?;
    Ok(message("Invitation accepted"))
}
