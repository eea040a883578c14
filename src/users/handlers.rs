use axum::{
    extract::{Multipart, State},
    routing::{get, patch, post},
    Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use super::{
    dto::{ChangePasswordRequest, UpdateProfileRequest},
    services,
};
use crate::{
    auth::{dto::PublicUser, services::cleared_session_cookie, AuthUser},
    error::{message, AppError},
    extract::Json,
    state::AppState,
    uploads,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).patch(update_profile))
        .route("/users/change-password", patch(change_password))
        .route("/users/upload-profile-pic", post(upload_profile_pic))
        .route("/users/delete-account", post(delete_account))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn get_profile(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let updated = services::update_profile(&state, &user, payload).await?;
    Ok(Json(PublicUser::from(&updated)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::change_password(&state, &user, payload).await?;
    Ok(message("Password updated successfully"))
}

#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_profile_pic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut mp: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let file = uploads::single_file(&mut mp, "image", state.config.upload_max_bytes)
        .await?
        .ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    let url = services::upload_profile_picture(&state, &user, file).await?;
    Ok(Json(serde_json::json!({
        "message": "Profile picture updated successfully",
        "profilePicture": url,
    })))
}

#[instrument(skip(state, user, jar), fields(user_id = %user.id))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    services::delete_account(&state, &user).await?;
    Ok((
        jar.remove(cleared_session_cookie()),
        message("Account and all owned data deleted successfully"),
    ))
}
