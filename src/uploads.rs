//! Single-file multipart uploads, buffered in memory before they go to storage.

use axum::extract::Multipart;
use bytes::{Bytes, BytesMut};
use tracing::warn;

use crate::error::AppError;

/// Room for multipart boundaries and part headers on top of the file itself.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> i64 {
        self.body.len() as i64
    }
}

/// Reads the part named `field`, ignoring every other part.
///
/// Returns `Ok(None)` when the part is missing or empty. A part over
/// `max_bytes` is rejected as soon as the limit is crossed.
pub async fn single_file(
    mp: &mut Multipart,
    field: &str,
    max_bytes: usize,
) -> Result<Option<UploadedFile>, AppError> {
    while let Some(mut part) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "malformed multipart body");
        AppError::bad_request("Invalid multipart body")
    })? {
        if part.name() != Some(field) {
            continue;
        }
        let file_name = part.file_name().unwrap_or("upload").to_string();
        let content_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let mut buf = BytesMut::new();
        while let Some(chunk) = part
            .chunk()
            .await
            .map_err(|_| AppError::bad_request("Invalid multipart body"))?
        {
            if buf.len() + chunk.len() > max_bytes {
                warn!(field, max_bytes, "upload over size limit");
                return Err(AppError::bad_request("File too large"));
            }
            buf.extend_from_slice(&chunk);
        }
        if buf.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            body: buf.freeze(),
        }));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::FromRequest, http::Request};

    const BOUNDARY: &str = "X-TASKLY-BOUNDARY";

    async fn multipart(parts: &[(&str, &str, &[u8])]) -> Multipart {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn picks_named_field_and_skips_others() {
        let mut mp = multipart(&[("other", "a.txt", b"zzz"), ("image", "me.png", b"png-bytes")]).await;
        let f = single_file(&mut mp, "image", 1024).await.unwrap().unwrap();
        assert_eq!(f.file_name, "me.png");
        assert_eq!(f.content_type, "image/png");
        assert_eq!(&f.body[..], b"png-bytes");
        assert_eq!(f.size(), 9);
    }

    #[tokio::test]
    async fn missing_field_is_none() {
        let mut mp = multipart(&[("other", "a.txt", b"zzz")]).await;
        assert!(single_file(&mut mp, "attachment", 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_field_is_rejected() {
        let big = vec![7u8; 2048];
        let mut mp = multipart(&[("attachment", "big.bin", &big)]).await;
        let err = single_file(&mut mp, "attachment", 1024).await.unwrap_err();
        assert_eq!(err.to_string(), "File too large");
    }
}
