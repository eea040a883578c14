use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    dto::{CreateWorkspaceRequest, InviteMemberRequest, DEFAULT_COLOR},
    repo,
    repo_types::{Workspace, WorkspaceInvite, WorkspaceRole},
};
use crate::{
    activity::{self, Action, ResourceType},
    auth::{jwt::JwtKeys, repo_types::User},
    error::AppError,
    mail,
    state::AppState,
};

/// Where an existing invite for the (user, workspace) pair leaves a new one.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InviteSlot {
    Free,
    Outstanding,
    Expired(Uuid),
}

pub(crate) fn invite_slot(existing: Option<&WorkspaceInvite>, now: OffsetDateTime) -> InviteSlot {
    match existing {
        None => InviteSlot::Free,
        Some(inv) if inv.is_expired_at(now) => InviteSlot::Expired(inv.id),
        Some(_) => InviteSlot::Outstanding,
    }
}

/// Invites grant `member` unless told otherwise. Ownership is never handed out by invite.
pub(crate) fn invite_role(requested: Option<WorkspaceRole>) -> Result<WorkspaceRole, AppError> {
    match requested.unwrap_or(WorkspaceRole::Member) {
        WorkspaceRole::Owner => Err(AppError::bad_request("Invalid role")),
        role => Ok(role),
    }
}

pub(crate) fn require_inviter(role: Option<WorkspaceRole>) -> Result<WorkspaceRole, AppError> {
    match role {
        Some(r) if r.can_invite() => Ok(r),
        _ => Err(AppError::forbidden("You are not authorized to invite members")),
    }
}

pub async fn find_workspace(state: &AppState, id: Uuid) -> Result<Workspace, AppError> {
    repo::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::not_found("Workspace not found"))
}

/// 404 when the workspace is missing, 403 when the caller is not in it.
pub async fn require_member(
    state: &AppState,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<(Workspace, WorkspaceRole), AppError> {
    let ws = find_workspace(state, workspace_id).await?;
    let role = repo::member_role(&state.db, workspace_id, user_id)
        .await?
        .ok_or_else(|| AppError::forbidden("You are not a member of this workspace"))?;
    Ok((ws, role))
}

pub async fn create_workspace(
    state: &AppState,
    owner: &User,
    req: CreateWorkspaceRequest,
) -> Result<Workspace, AppError> {
    let req = req.normalize()?;
    let ws = repo::create(
        &state.db,
        owner.id,
        &req.name,
        req.description.as_deref(),
        req.color.as_deref().unwrap_or(DEFAULT_COLOR),
    )
    .await?;
    info!(workspace_id = %ws.id, user_id = %owner.id, "workspace created");
    Ok(ws)
}

pub async fn invite_member(
    state: &AppState,
    inviter: &User,
    workspace_id: Uuid,
    req: InviteMemberRequest,
) -> Result<(), AppError> {
    let ws = find_workspace(state, workspace_id).await?;
    require_inviter(repo::member_role(&state.db, ws.id, inviter.id).await?)?;
    let role = invite_role(req.role)?;

    let email = req.email.trim().to_lowercase();
    let invitee = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if repo::member_role(&state.db, ws.id, invitee.id).await?.is_some() {
        return Err(AppError::bad_request("User already a part of this workspace"));
    }

    let existing = repo::find_invite(&state.db, invitee.id, ws.id).await?;
    match invite_slot(existing.as_ref(), OffsetDateTime::now_utc()) {
        InviteSlot::Outstanding => {
            return Err(AppError::bad_request("User already invited to the workspace"))
        }
        InviteSlot::Expired(id) => {
            info!(invite_id = %id, "replacing expired invite");
        }
        InviteSlot::Free => {}
    }

    let keys = JwtKeys::from_ref(state);
    let signed = keys.sign_invite(invitee.id, ws.id, role)?;
    repo::upsert_invite(
        &state.db,
        invitee.id,
        ws.id,
        &signed.token,
        role,
        signed.expires_at,
    )
    .await?;

    let (subject, html) =
        mail::workspace_invite_email(&state.config.client_url, ws.id, &ws.name, &signed.token);
    state.mailer.send(&invitee.email, &subject, &html).await.map_err(|e| {
        error!(error = %e, workspace_id = %ws.id, "invite email failed");
        AppError::internal("Failed to send invitation email", e)
    })?;

    info!(workspace_id = %ws.id, inviter = %inviter.id, invitee = %invitee.id, ?role, "member invited");
    Ok(())
}

/// Path-only join: no invite record is consulted and the role is always `member`.
pub async fn accept_general_invite(
    state: &AppState,
    user: &User,
    workspace_id: Uuid,
) -> Result<(), AppError> {
    let ws = find_workspace(state, workspace_id).await?;
    if repo::member_role(&state.db, ws.id, user.id).await?.is_some() {
        return Err(AppError::bad_request("You are already a member of the workspace"));
    }
    warn!(workspace_id = %ws.id, user_id = %user.id, "workspace joined without an invite record");

    let mut tx = state.db.begin().await?;
    if !repo::add_member(&mut *tx, ws.id, user.id, WorkspaceRole::Member).await? {
        return Err(AppError::bad_request("You are already a member of the workspace"));
    }
    activity::record(
        &mut *tx,
        user.id,
        Action::JoinedWorkspace,
        ResourceType::Workspace,
        ws.id,
        &format!("Joined {} workspace", ws.name),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn accept_invite_token(state: &AppState, token: &str) -> Result<(), AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_invite(token).map_err(|e| {
        warn!(error = %e, "invite token rejected");
        AppError::unauthorized("Invalid or expired invitation")
    })?;

    let ws = repo::find_by_id(&state.db, claims.workspace_id)
        .await?
        .ok_or_else(|| AppError::not_found("No workspace found"))?;

    if repo::member_role(&state.db, ws.id, claims.user).await?.is_some() {
        return Err(AppError::bad_request("User already a member of the workspace"));
    }

    let invite = repo::find_invite(&state.db, claims.user, ws.id)
        .await?
        .ok_or_else(|| AppError::not_found("Invitation request not found"))?;
    if invite.is_expired_at(OffsetDateTime::now_utc()) {
        return Err(AppError::bad_request("Invitation has expired"));
    }

    let mut tx = state.db.begin().await?;
    if !repo::add_member(&mut *tx, ws.id, claims.user, claims.role).await? {
        return Err(AppError::bad_request("User already a member of the workspace"));
    }
    repo::delete_invite(&mut *tx, invite.id).await?;
    activity::record(
        &mut *tx,
        claims.user,
        Action::JoinedWorkspace,
        ResourceType::Workspace,
        ws.id,
        &format!("Joined {} workspace", ws.name),
    )
    .await?;
    tx.commit().await?;

    info!(workspace_id = %ws.id, user_id = %claims.user, role = ?claims.role, "invitation accepted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn invite(expires_in: Duration) -> WorkspaceInvite {
        let now = OffsetDateTime::now_utc();
        WorkspaceInvite {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            token: "tok".into(),
            role: WorkspaceRole::Member,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn only_owner_and_admin_may_invite() {
        assert!(require_inviter(Some(WorkspaceRole::Owner)).is_ok());
        assert!(require_inviter(Some(WorkspaceRole::Admin)).is_ok());
        for r in [Some(WorkspaceRole::Member), Some(WorkspaceRole::Viewer), None] {
            let err = require_inviter(r).unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
    }

    #[test]
    fn invite_role_defaults_to_member_and_refuses_owner() {
        assert_eq!(invite_role(None).unwrap(), WorkspaceRole::Member);
        assert_eq!(invite_role(Some(WorkspaceRole::Admin)).unwrap(), WorkspaceRole::Admin);
        assert!(invite_role(Some(WorkspaceRole::Owner)).is_err());
    }

    #[test]
    fn outstanding_invite_blocks_and_expired_is_replaced() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(invite_slot(None, now), InviteSlot::Free);
        assert_eq!(
            invite_slot(Some(&invite(Duration::days(3))), now),
            InviteSlot::Outstanding
        );
        let stale = invite(Duration::hours(-1));
        assert_eq!(invite_slot(Some(&stale), now), InviteSlot::Expired(stale.id));
    }

    #[tokio::test]
    async fn forged_invite_token_is_unauthorized() {
        let state = AppState::fake();
        let err = accept_invite_token(&state, "not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    mod db {
        use super::*;
        use sqlx::PgPool;

        fn state(db: &PgPool) -> AppState {
            AppState {
                db: db.clone(),
                ..AppState::fake()
            }
        }

        async fn user(db: &PgPool, email: &str) -> User {
            User::create(db, email, email, "hash").await.unwrap()
        }

        async fn memberships(db: &PgPool, workspace_id: Uuid, user_id: Uuid) -> usize {
            repo::members(db, workspace_id)
                .await
                .unwrap()
                .iter()
                .filter(|m| m.user_id == user_id)
                .count()
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn joining_twice_by_link_keeps_one_membership(db: PgPool) {
            let state = state(&db);
            let owner = user(&db, "owner@example.com").await;
            let guest = user(&db, "guest@example.com").await;
            let ws = repo::create(&db, owner.id, "W", None, DEFAULT_COLOR).await.unwrap();

            accept_general_invite(&state, &guest, ws.id).await.unwrap();
            assert_eq!(
                repo::member_role(&db, ws.id, guest.id).await.unwrap(),
                Some(WorkspaceRole::Member)
            );

            let err = accept_general_invite(&state, &guest, ws.id).await.unwrap_err();
            assert!(
                matches!(err, AppError::BadRequest(ref m) if m == "You are already a member of the workspace")
            );
            assert_eq!(memberships(&db, ws.id, guest.id).await, 1);

            let err = accept_general_invite(&state, &owner, ws.id).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
            assert_eq!(
                repo::member_role(&db, ws.id, owner.id).await.unwrap(),
                Some(WorkspaceRole::Owner)
            );
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn admin_invite_round_trip(db: PgPool) {
            let state = state(&db);
            let owner = user(&db, "owner@example.com").await;
            let invitee = user(&db, "admin@example.com").await;
            let ws = repo::create(&db, owner.id, "W", None, DEFAULT_COLOR).await.unwrap();

            let req = || InviteMemberRequest {
                email: " Admin@Example.com ".into(),
                role: Some(WorkspaceRole::Admin),
            };
            invite_member(&state, &owner, ws.id, req()).await.unwrap();

            let err = invite_member(&state, &owner, ws.id, req()).await.unwrap_err();
            assert!(
                matches!(err, AppError::BadRequest(ref m) if m == "User already invited to the workspace")
            );

            let err = invite_member(&state, &invitee, ws.id, req()).await.unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));

            let invite = repo::find_invite(&db, invitee.id, ws.id).await.unwrap().unwrap();
            assert_eq!(invite.role, WorkspaceRole::Admin);

            accept_invite_token(&state, &invite.token).await.unwrap();
            assert_eq!(
                repo::member_role(&db, ws.id, invitee.id).await.unwrap(),
                Some(WorkspaceRole::Admin)
            );
            assert!(repo::find_invite(&db, invitee.id, ws.id).await.unwrap().is_none());

            let err = accept_invite_token(&state, &invite.token).await.unwrap_err();
            assert!(
                matches!(err, AppError::BadRequest(ref m) if m == "User already a member of the workspace")
            );
            assert_eq!(memberships(&db, ws.id, invitee.id).await, 1);

            let err = invite_member(&state, &owner, ws.id, req()).await.unwrap_err();
            assert!(
                matches!(err, AppError::BadRequest(ref m) if m == "User already a part of this workspace")
            );
        }
    }
}
