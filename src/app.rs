use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::uploads::MULTIPART_OVERHEAD;
use crate::{auth, projects, tasks, users, workspaces};

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.config.client_url)
        .with_context(|| format!("CLIENT_URL is not a valid origin: {}", state.config.client_url))?;
    // Cookie sessions: credentials on, so origin/methods/headers must be explicit.
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT]);
    let body_limit = state.config.upload_max_bytes + MULTIPART_OVERHEAD;

    Ok(Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .merge(workspaces::router())
                .merge(projects::router())
                .merge(tasks::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        ))
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{claims::TokenPurpose, jwt::JwtKeys};
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header::SET_COOKIE, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (AppState, Router) {
        let state = AppState::fake();
        let app = build_app(state.clone()).unwrap();
        (state, app)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_, app) = app();
        let res = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_session_is_401() {
        let (_, app) = app();
        let res = app
            .oneshot(Request::get("/api/v1/workspaces").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["message"], "Unauthorized");
    }

    #[tokio::test]
    async fn verification_token_is_not_a_session() {
        let (state, app) = app();
        let token = JwtKeys::from_ref(&state)
            .sign(Uuid::new_v4(), TokenPurpose::EmailVerification)
            .unwrap()
            .token;
        let res = app
            .oneshot(
                Request::get("/api/v1/tasks/my-tasks")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn disposable_domain_registration_is_forbidden() {
        let (_, app) = app();
        let res = app
            .oneshot(post_json(
                "/api/v1/auth/register",
                serde_json::json!({
                    "email": "someone@mailinator.com",
                    "name": "Someone",
                    "password": "long-enough-password"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(res).await["message"], "Invalid email address");
    }

    #[tokio::test]
    async fn reset_with_mismatched_passwords_is_400() {
        let (_, app) = app();
        let res = app
            .oneshot(post_json(
                "/api/v1/auth/reset-password",
                serde_json::json!({
                    "token": "whatever",
                    "newPassword": "password-one",
                    "confirmPassword": "password-two"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Passwords do not match");
    }

    #[tokio::test]
    async fn missing_field_body_is_400_with_message() {
        let (_, app) = app();
        let res = app
            .oneshot(post_json(
                "/api/v1/auth/reset-password",
                serde_json::json!({ "token": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let msg = body_json(res).await["message"].as_str().unwrap().to_string();
        assert!(msg.contains("newPassword"), "{msg}");
    }

    #[tokio::test]
    async fn reset_token_cannot_verify_email() {
        let (state, app) = app();
        let token = JwtKeys::from_ref(&state)
            .sign(Uuid::new_v4(), TokenPurpose::ResetPassword)
            .unwrap()
            .token;
        let res = app
            .oneshot(post_json(
                "/api/v1/auth/verify-email",
                serde_json::json!({ "token": token }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_clears_session_cookie() {
        let (_, app) = app();
        let res = app
            .oneshot(
                Request::post("/api/v1/auth/logout")
                    .header("cookie", "token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn garbage_invite_token_is_401() {
        let (_, app) = app();
        let res = app
            .oneshot(post_json(
                "/api/v1/workspaces/accept-invite-token",
                serde_json::json!({ "token": "not-a-jwt" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(res).await["message"],
            "Invalid or expired invitation"
        );
    }

    #[tokio::test]
    async fn cors_preflight_allows_client_origin_with_credentials() {
        let (state, app) = app();
        let res = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/v1/workspaces")
                    .header("origin", state.config.client_url.as_str())
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let headers = res.headers();
        assert_eq!(
            headers.get("access-control-allow-origin").unwrap(),
            state.config.client_url.as_str()
        );
        assert_eq!(
            headers.get("access-control-allow-credentials").unwrap(),
            "true"
        );
    }
}
