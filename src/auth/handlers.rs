use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use axum_extra::extract::CookieJar;
use tracing::instrument;

use super::{
    dto::{
        EnableTwoFactorRequest, LoginRequest, LoginResponse, PublicUser, RegisterRequest,
        ResetPasswordBody, ResetPasswordRequestBody, TwoFactorSetupResponse,
        ValidateTwoFactorRequest, VerifyEmailRequest,
    },
    extractors::AuthUser,
    services::{self, LoginOutcome},
};
use crate::{
    error::{message, AppError},
    extract::Json,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/reset-password-request", post(reset_password_request))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/2fa/generate", post(generate_two_factor))
        .route("/auth/2fa/verify", post(verify_two_factor))
        .route("/auth/2fa/disable", post(disable_two_factor))
        .route("/auth/2fa/validate", post(validate_two_factor))
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    services::register(&state, payload, user_agent).await?;
    Ok((
        StatusCode::CREATED,
        message("Verification email sent! Please verify your email."),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(StatusCode, CookieJar, Json<LoginResponse>), AppError> {
    match services::login(&state, payload).await? {
        LoginOutcome::VerificationResent => Ok((
            StatusCode::CREATED,
            jar,
            Json(LoginResponse::VerificationSent {
                message: "Verification email sent! Please verify your email.",
            }),
        )),
        LoginOutcome::TwoFactorRequired(user_id) => Ok((
            StatusCode::OK,
            jar,
            Json(LoginResponse::TwoFactorRequired {
                message: "2FA required",
                is_two_factor_required: true,
                user_id,
            }),
        )),
        LoginOutcome::Session { token, user } => {
            let jar = jar.add(services::session_cookie(&state.config, token.token.clone()));
            Ok((
                StatusCode::OK,
                jar,
                Json(LoginResponse::LoggedIn {
                    message: "Login successful",
                    token: token.token,
                    user: PublicUser::from(&user),
                }),
            ))
        }
    }
}

/// Sessions are self-contained tokens; logging out only drops the cookie.
#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<serde_json::Value>) {
    (
        jar.remove(services::cleared_session_cookie()),
        message("Logged out successfully"),
    )
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::verify_email(&state, &payload.token).await?;
    Ok(message("Email verified successfully!"))
}

#[instrument(skip(state, payload))]
pub async fn reset_password_request(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequestBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::request_password_reset(&state, &payload.email).await?;
    Ok(message("Reset password email sent"))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::reset_password(&state, payload).await?;
    Ok(message("Password reset successfully"))
}

#[instrument(skip(user), fields(user_id = %user.id))]
pub async fn generate_two_factor(
    AuthUser(user): AuthUser,
) -> Result<Json<TwoFactorSetupResponse>, AppError> {
    let e = services::two_factor_setup(&user)?;
    Ok(Json(TwoFactorSetupResponse {
        secret: e.secret,
        otpauth_url: e.otpauth_url,
        qr_code_url: e.qr_code_url,
    }))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn verify_two_factor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(payload): Json<EnableTwoFactorRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    services::enable_two_factor(&state, &user, &payload.token, &payload.secret).await?;
    Ok(message("2FA enabled successfully"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn disable_two_factor(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    services::disable_two_factor(&state, &user).await?;
    Ok(message("2FA disabled"))
}

#[instrument(skip(state, jar, payload), fields(user_id = %payload.user_id))]
pub async fn validate_two_factor(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<ValidateTwoFactorRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let (token, user) = services::validate_two_factor(&state, payload.user_id, &payload.token).await?;
    let jar = jar.add(services::session_cookie(&state.config, token.token.clone()));
    Ok((
        jar,
        Json(LoginResponse::LoggedIn {
            message: "Login successful",
            token: token.token,
            user: PublicUser::from(&user),
        }),
    ))
}
