//! `Json` and `Path` whose rejections go through [`AppError`], so malformed
//! bodies and ids get the same `{message}` shape as every other failure.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(status = %rejection.status(), "rejected json body");
        AppError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        warn!(status = %rejection.status(), "rejected path parameters");
        AppError::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Debug, Deserialize)]
    struct Thing {
        #[allow(dead_code)]
        name: String,
    }

    fn router() -> Router {
        Router::new()
            .route("/things", post(|Json(_): Json<Thing>| async { "ok" }))
            .route("/things/:id", post(|Path(_): Path<Uuid>| async { "ok" }))
    }

    async fn message_of(res: Response) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        v["message"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn wrong_content_type_is_400_json() {
        let res = router()
            .oneshot(
                Request::post("/things")
                    .body(Body::from(r#"{"name":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(!message_of(res).await.is_empty());
    }

    #[tokio::test]
    async fn broken_json_is_400_json() {
        let res = router()
            .oneshot(
                Request::post("/things")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(!message_of(res).await.is_empty());
    }

    #[tokio::test]
    async fn non_uuid_path_is_400_json() {
        let res = router()
            .oneshot(Request::post("/things/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(!message_of(res).await.is_empty());
    }

    #[test]
    fn json_response_serializes_inner_value() {
        let res = Json(serde_json::json!({ "a": 1 })).into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
