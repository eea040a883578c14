use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    claims::TokenPurpose,
    dto::{LoginRequest, RegisterRequest, ResetPasswordBody},
    extractors::SESSION_COOKIE,
    jwt::{JwtKeys, SignedToken},
    password::{hash_password_blocking, verify_password_blocking},
    repo_types::{User, Verification, VerificationPurpose},
    totp,
};
use crate::{
    config::AppConfig,
    error::{is_unique_violation, AppError},
    mail,
    shield::ShieldRequest,
    state::AppState,
};

pub enum LoginOutcome {
    /// Unverified account; a fresh verification mail went out.
    VerificationResent,
    /// Second factor needed before a session is issued.
    TwoFactorRequired(Uuid),
    Session { token: SignedToken, user: User },
}

/// Loads the stored row behind a one-time token and checks its own expiry,
/// which is tracked separately from the token's signed `exp`.
pub(crate) fn check_stored_verification(
    row: Option<Verification>,
    now: OffsetDateTime,
) -> Result<Verification, AppError> {
    let row = row.ok_or_else(|| AppError::unauthorized("Unauthorized"))?;
    if row.is_expired_at(now) {
        return Err(AppError::unauthorized("Token expired"));
    }
    Ok(row)
}

pub(crate) fn is_active(row: Option<&Verification>, now: OffsetDateTime) -> bool {
    row.map_or(false, |v| !v.is_expired_at(now))
}

fn token_purpose(purpose: VerificationPurpose) -> TokenPurpose {
    match purpose {
        VerificationPurpose::EmailVerification => TokenPurpose::EmailVerification,
        VerificationPurpose::ResetPassword => TokenPurpose::ResetPassword,
    }
}

/// Mints a token for `purpose` and stores it as the user's only row of that purpose.
async fn issue_verification(
    state: &AppState,
    user_id: Uuid,
    purpose: VerificationPurpose,
) -> Result<SignedToken, AppError> {
    let keys = JwtKeys::from_ref(state);
    let signed = keys.sign(user_id, token_purpose(purpose))?;
    Verification::replace(&state.db, user_id, purpose, &signed.token, signed.expires_at).await?;
    Ok(signed)
}

async fn send_verification_mail(state: &AppState, email: &str, token: &str) -> Result<(), AppError> {
    let (subject, html) = mail::verification_email(&state.config.client_url, token);
    state.mailer.send(email, &subject, &html).await.map_err(|e| {
        error!(error = %e, %email, "verification email failed");
        AppError::internal("Failed to send verification email", e)
    })
}

pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    user_agent: Option<&str>,
) -> Result<User, AppError> {
    let decision = state
        .shield
        .evaluate(&ShieldRequest {
            email: &req.email,
            user_agent,
        })
        .await;
    if decision.is_denied() {
        return Err(AppError::forbidden("Invalid email address"));
    }
    let req = req.normalize()?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::bad_request("User already exists"));
    }

    let hash = hash_password_blocking(req.password).await?;
    let user = insert_user(state, &req.email, &req.name, &hash).await?;

    // From here on a mail failure leaves an unverified user without a usable link;
    // logging in again re-issues one.
    let signed = issue_verification(state, user.id, VerificationPurpose::EmailVerification).await?;
    send_verification_mail(state, &user.email, &signed.token).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// A concurrent registration can win the race past `find_by_email`; the
/// `users.email` constraint then decides.
async fn insert_user(
    state: &AppState,
    email: &str,
    name: &str,
    password_hash: &str,
) -> Result<User, AppError> {
    match User::create(&state.db, email, name, password_hash).await {
        Ok(user) => Ok(user),
        Err(e) if is_unique_violation(&e) => {
            warn!(%email, "email registered concurrently");
            Err(AppError::bad_request("User already exists"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn verify_email(state: &AppState, token: &str) -> Result<(), AppError> {
    let keys = JwtKeys::from_ref(state);
    let claims = keys
        .verify_purpose(token, TokenPurpose::EmailVerification)
        .map_err(|e| {
            warn!(error = %e, "email verification token rejected");
            AppError::unauthorized("Unauthorized")
        })?;

    let row = Verification::find_by_token(&state.db, claims.sub, token).await?;
    check_stored_verification(row, OffsetDateTime::now_utc())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    if user.is_email_verified {
        return Err(AppError::bad_request("Email already verified"));
    }

    User::mark_email_verified(&state.db, user.id).await?;
    let removed = Verification::delete_all_for_user(&state.db, user.id).await?;
    info!(user_id = %user.id, removed, "email verified");
    Ok(())
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<LoginOutcome, AppError> {
    let req = req.normalize()?;
    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if !user.is_email_verified {
        let latest = Verification::find_latest(
            &state.db,
            user.id,
            VerificationPurpose::EmailVerification,
        )
        .await?;
        if is_active(latest.as_ref(), OffsetDateTime::now_utc()) {
            return Err(AppError::bad_request(
                "Email not verified. Please check your email for verification link.",
            ));
        }
        let signed =
            issue_verification(state, user.id, VerificationPurpose::EmailVerification).await?;
        send_verification_mail(state, &user.email, &signed.token).await?;
        info!(user_id = %user.id, "verification re-sent on login");
        return Ok(LoginOutcome::VerificationResent);
    }

    if user.is_two_factor_enabled {
        if state.config.two_factor_requires_password
            && !verify_password_blocking(req.password, user.password_hash.clone()).await?
        {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::bad_request("Invalid credentials"));
        }
        info!(user_id = %user.id, "second factor required");
        return Ok(LoginOutcome::TwoFactorRequired(user.id));
    }

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::bad_request("Invalid credentials"));
    }

    let (token, user) = issue_session(state, user.id).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginOutcome::Session { token, user })
}

pub async fn issue_session(state: &AppState, user_id: Uuid) -> Result<(SignedToken, User), AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user_id, TokenPurpose::Login)?;
    let user = User::touch_last_login(&state.db, user_id).await?;
    Ok((token, user))
}

pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| AppError::bad_request("User not found"))?;
    if !user.is_email_verified {
        return Err(AppError::bad_request("Email not verified!"));
    }

    let latest =
        Verification::find_latest(&state.db, user.id, VerificationPurpose::ResetPassword).await?;
    if is_active(latest.as_ref(), OffsetDateTime::now_utc()) {
        return Err(AppError::bad_request("Reset password request already sent"));
    }

    let signed = issue_verification(state, user.id, VerificationPurpose::ResetPassword).await?;
    let (subject, html) = mail::reset_password_email(&state.config.client_url, &signed.token);
    state
        .mailer
        .send(&user.email, &subject, &html)
        .await
        .map_err(|e| AppError::internal("Failed to send reset password email", e))?;
    info!(user_id = %user.id, "password reset requested");
    Ok(())
}

pub async fn reset_password(state: &AppState, body: ResetPasswordBody) -> Result<(), AppError> {
    body.validate()?;
    let keys = JwtKeys::from_ref(state);
    let claims = keys
        .verify_purpose(&body.token, TokenPurpose::ResetPassword)
        .map_err(|e| {
            warn!(error = %e, "reset token rejected");
            AppError::unauthorized("Unauthorized")
        })?;

    let row = Verification::find_by_token(&state.db, claims.sub, &body.token).await?;
    let row = check_stored_verification(row, OffsetDateTime::now_utc())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

    let hash = hash_password_blocking(body.new_password).await?;
    User::update_password(&state.db, user.id, &hash).await?;
    Verification::delete(&state.db, row.id).await?;
    info!(user_id = %user.id, "password reset");
    Ok(())
}

pub fn two_factor_setup(user: &User) -> Result<totp::Enrollment, AppError> {
    Ok(totp::generate_enrollment(&user.email)?)
}

pub async fn enable_two_factor(
    state: &AppState,
    user: &User,
    code: &str,
    secret: &str,
) -> Result<(), AppError> {
    let ok = totp::verify_code(secret, code, totp::ENROLL_SKEW)
        .map_err(|_| AppError::bad_request("Invalid code. Please try again."))?;
    if !ok {
        return Err(AppError::bad_request("Invalid code. Please try again."));
    }
    User::enable_two_factor(&state.db, user.id, secret).await?;
    info!(user_id = %user.id, "2fa enabled");
    Ok(())
}

pub async fn disable_two_factor(state: &AppState, user: &User) -> Result<(), AppError> {
    User::disable_two_factor(&state.db, user.id).await?;
    info!(user_id = %user.id, "2fa disabled");
    Ok(())
}

pub async fn validate_two_factor(
    state: &AppState,
    user_id: Uuid,
    code: &str,
) -> Result<(SignedToken, User), AppError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let secret = match (&user.two_factor_secret, user.is_two_factor_enabled) {
        (Some(s), true) => s,
        _ => return Err(AppError::bad_request("Two-factor authentication is not enabled")),
    };

    if !totp::verify_code(secret, code, totp::LOGIN_SKEW)? {
        warn!(user_id = %user.id, "invalid 2fa code");
        return Err(AppError::bad_request("Invalid 2FA code"));
    }

    let session = issue_session(state, user.id).await?;
    info!(user_id = %user.id, "user logged in with 2fa");
    Ok(session)
}

pub fn session_cookie(cfg: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(cfg.cookie_secure)
        .same_site(if cfg.cookie_secure {
            SameSite::None
        } else {
            SameSite::Lax
        })
        .max_age(time::Duration::days(cfg.jwt.session_ttl_days))
        .build()
}

pub fn cleared_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn verification(expires_in: Duration) -> Verification {
        let now = OffsetDateTime::now_utc();
        Verification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            purpose: VerificationPurpose::EmailVerification,
            token: "tok".into(),
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn missing_row_is_unauthorized() {
        let err = check_stored_verification(None, OffsetDateTime::now_utc()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Unauthorized"));
    }

    #[test]
    fn expired_row_is_rejected_even_if_present() {
        let row = verification(Duration::minutes(-1));
        let err = check_stored_verification(Some(row), OffsetDateTime::now_utc()).unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn live_row_passes() {
        let row = verification(Duration::minutes(30));
        assert!(check_stored_verification(Some(row), OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn activity_of_latest_row() {
        let now = OffsetDateTime::now_utc();
        assert!(!is_active(None, now));
        assert!(!is_active(Some(&verification(Duration::seconds(-5))), now));
        assert!(is_active(Some(&verification(Duration::hours(1))), now));
    }

    #[test]
    fn session_cookie_attributes() {
        let cfg = AppState::fake_config();
        let c = session_cookie(&cfg, "abc".into());
        assert_eq!(c.name(), SESSION_COOKIE);
        assert_eq!(c.value(), "abc");
        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.max_age(), Some(Duration::days(7)));
        assert_eq!(c.path(), Some("/"));
    }

    mod db {
        use super::*;
        use crate::auth::password::hash_password;
        use sqlx::PgPool;
        use std::time::{SystemTime, UNIX_EPOCH};

        const PASSWORD: &str = "correct-horse-battery";

        fn state(db: &PgPool) -> AppState {
            AppState {
                db: db.clone(),
                ..AppState::fake()
            }
        }

        async fn verification_rows(db: &PgPool, user_id: Uuid) -> i64 {
            sqlx::query_scalar("SELECT COUNT(*) FROM verifications WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(db)
                .await
                .unwrap()
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn reissuing_keeps_a_single_verification(db: PgPool) {
            let state = state(&db);
            let user = User::create(&db, "ann@example.com", "Ann", "hash").await.unwrap();

            for _ in 0..3 {
                issue_verification(&state, user.id, VerificationPurpose::EmailVerification)
                    .await
                    .unwrap();
            }
            assert_eq!(verification_rows(&db, user.id).await, 1);

            issue_verification(&state, user.id, VerificationPurpose::ResetPassword)
                .await
                .unwrap();
            assert_eq!(verification_rows(&db, user.id).await, 2);
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn verification_link_works_once(db: PgPool) {
            let state = state(&db);
            let user = register(
                &state,
                RegisterRequest {
                    email: "Bob@Example.com".into(),
                    name: "Bob".into(),
                    password: PASSWORD.into(),
                },
                Some("test-agent"),
            )
            .await
            .unwrap();
            assert_eq!(user.email, "bob@example.com");
            assert!(!user.is_email_verified);

            let token = Verification::find_latest(&db, user.id, VerificationPurpose::EmailVerification)
                .await
                .unwrap()
                .unwrap()
                .token;
            verify_email(&state, &token).await.unwrap();
            let verified = User::find_by_id(&db, user.id).await.unwrap().unwrap();
            assert!(verified.is_email_verified);
            assert_eq!(verification_rows(&db, user.id).await, 0);

            let err = verify_email(&state, &token).await.unwrap_err();
            assert!(matches!(err, AppError::Unauthorized(_)));
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn second_factor_login_issues_session(db: PgPool) {
            let state = state(&db);
            let hash = hash_password(PASSWORD).unwrap();
            let user = User::create(&db, "cy@example.com", "Cy", &hash).await.unwrap();
            User::mark_email_verified(&db, user.id).await.unwrap();
            let secret = totp::generate_enrollment(&user.email).unwrap().secret;
            User::enable_two_factor(&db, user.id, &secret).await.unwrap();

            let outcome = login(
                &state,
                LoginRequest {
                    email: "cy@example.com".into(),
                    password: PASSWORD.into(),
                },
            )
            .await
            .unwrap();
            assert!(matches!(outcome, LoginOutcome::TwoFactorRequired(id) if id == user.id));
            let untouched = User::find_by_id(&db, user.id).await.unwrap().unwrap();
            assert!(untouched.last_login.is_none());

            // login accepts the current 30s step only; stay clear of its edge
            let mut now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
            if now % 30 >= 27 {
                tokio::time::sleep(std::time::Duration::from_secs(4)).await;
                now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
            }
            let code = totp::code_at(&secret, now);
            let (session, logged_in) = validate_two_factor(&state, user.id, &code).await.unwrap();
            let claims = JwtKeys::from_ref(&state)
                .verify_purpose(&session.token, TokenPurpose::Login)
                .unwrap();
            assert_eq!(claims.sub, user.id);
            assert!(logged_in.last_login.is_some());
        }

        #[sqlx::test(migrations = "./migrations")]
        #[ignore = "needs a live PostgreSQL (DATABASE_URL)"]
        async fn duplicate_email_insert_is_a_client_error(db: PgPool) {
            let state = state(&db);
            insert_user(&state, "dee@example.com", "Dee", "hash").await.unwrap();

            let raw = User::create(&db, "dee@example.com", "Dee", "hash").await.unwrap_err();
            assert!(is_unique_violation(&raw));

            let err = insert_user(&state, "dee@example.com", "Dee", "hash")
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::BadRequest(ref m) if m == "User already exists"));

            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
                .bind("dee@example.com")
                .fetch_one(&db)
                .await
                .unwrap();
            assert_eq!(count, 1);
        }
    }
}
