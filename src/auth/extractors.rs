use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::CookieJar;
use tracing::warn;

use super::{claims::TokenPurpose, jwt::JwtKeys, repo_types::User};
use crate::{error::AppError, state::AppState};

pub const SESSION_COOKIE: &str = "token";

/// The authenticated caller, resolved from the session cookie or bearer token.
pub struct AuthUser(pub User);

/// Cookie first, then `Authorization: Bearer <token>`.
pub(crate) fn session_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(c) = jar.get(SESSION_COOKIE) {
        if !c.value().is_empty() {
            return Some(c.value().to_string());
        }
    }
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(parts).ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = match keys.verify_purpose(&token, TokenPurpose::Login) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "invalid or expired session token");
                return Err(AppError::unauthorized("Unauthorized"));
            }
        };

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "session for unknown user");
                AppError::unauthorized("Unauthorized")
            })?;

        Ok(AuthUser(user))
    }
}
