use tracing::{error, info, warn};

use super::{
    dto::{ChangePasswordRequest, UpdateProfileRequest},
    repo,
};
use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        repo_types::User,
    },
    error::AppError,
    state::AppState,
    storage,
    uploads::UploadedFile,
};

pub async fn update_profile(
    state: &AppState,
    user: &User,
    req: UpdateProfileRequest,
) -> Result<User, AppError> {
    let req = req.normalize()?;
    let updated =
        User::update_profile(&state.db, user.id, &req.name, req.profile_picture.as_deref()).await?;
    info!(user_id = %user.id, "profile updated");
    Ok(updated)
}

pub async fn change_password(
    state: &AppState,
    user: &User,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    req.validate()?;

    let ok = verify_password_blocking(req.current_password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(AppError::forbidden("Invalid old password"));
    }

    let hash = hash_password_blocking(req.new_password).await?;
    User::update_password(&state.db, user.id, &hash).await?;
    info!(user_id = %user.id, "password changed");
    Ok(())
}

pub async fn upload_profile_picture(
    state: &AppState,
    user: &User,
    file: UploadedFile,
) -> Result<String, AppError> {
    let stored = storage::store(state.storage.as_ref(), "avatars", file.body, &file.content_type)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user.id, "avatar upload failed");
            AppError::internal("Upload failed", e)
        })?;
    if let Err(e) = User::set_profile_picture(&state.db, user.id, &stored.url).await {
        storage::discard(state.storage.as_ref(), &stored.key).await;
        return Err(e.into());
    }
    info!(user_id = %user.id, key = %stored.key, "profile picture updated");
    Ok(stored.url)
}

/// Deletes the account and every workspace it owns in one transaction.
pub async fn delete_account(state: &AppState, user: &User) -> Result<(), AppError> {
    let fail = |e: anyhow::Error| {
        error!(error = %e, user_id = %user.id, "account deletion failed");
        AppError::internal("Delete failed", e)
    };

    let mut tx = state.db.begin().await.map_err(|e| fail(e.into()))?;
    let report = repo::delete_account_tx(&mut tx, user.id).await.map_err(fail)?;
    tx.commit().await.map_err(|e| fail(e.into()))?;

    info!(
        user_id = %user.id,
        workspaces = report.workspaces,
        projects = report.projects,
        tasks = report.tasks,
        "account deleted"
    );
    Ok(())
}
