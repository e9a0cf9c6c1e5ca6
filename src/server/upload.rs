//! Request body parsing for `POST /api/convert`.
//!
//! Accepts `multipart/form-data` (with an optional `htmlFile` upload),
//! `application/x-www-form-urlencoded` and JSON bodies. Uploads are streamed
//! into the temp directory and persisted into the uploads directory under a
//! unique name; the returned [`UploadedFile`] deletes it again when dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Form;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::AppState;
use crate::convert::unique_stamp;

/// A persisted upload, removed from disk when dropped.
#[derive(Debug)]
pub struct UploadedFile {
    path: PathBuf,
}

impl UploadedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Cleaned up uploaded file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Error deleting uploaded file"),
        }
    }
}

/// Fields of a conversion request.
#[derive(Debug, Default)]
pub struct ConvertInput {
    pub upload: Option<UploadedFile>,
    pub html_url: Option<String>,
    pub options: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BodyFields {
    html_url: Option<String>,
    options: Option<Value>,
}

impl BodyFields {
    fn into_input(self) -> ConvertInput {
        ConvertInput {
            upload: None,
            html_url: self.html_url.filter(|u| !u.trim().is_empty()),
            options: self.options,
        }
    }
}

impl FromRequest<Arc<AppState>> for ConvertInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request("Malformed upload", e.body_text()))?;
            return read_multipart(multipart, state).await;
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<BodyFields>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request("Malformed form body", e.body_text()))?;
            return Ok(fields.into_input());
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request("Unreadable request body", e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ConvertInput::default());
        }
        let fields: BodyFields = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::bad_request("Malformed JSON body", e.to_string()))?;
        Ok(fields.into_input())
    }
}

async fn read_multipart(mut multipart: Multipart, state: &AppState) -> Result<ConvertInput, ApiError> {
    let mut input = ConvertInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, state))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "htmlFile" => {
                let name = field.file_name().unwrap_or("").to_string();
                if let Some(upload) = persist_upload(field, &name, state).await? {
                    input.upload = Some(upload);
                }
            }
            "htmlUrl" => {
                let url = field.text().await.map_err(|e| multipart_error(e, state))?;
                input.html_url = Some(url).filter(|u| !u.trim().is_empty());
            }
            "options" => {
                let raw = field.text().await.map_err(|e| multipart_error(e, state))?;
                input.options = Some(Value::String(raw));
            }
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    Ok(input)
}

fn multipart_error(e: axum::extract::multipart::MultipartError, state: &AppState) -> ApiError {
    if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge {
            limit_mb: state.config.max_upload_mb(),
        };
    }
    ApiError::bad_request("Malformed upload", e.body_text())
}

/// Stream one file field into the temp directory, then move it into the
/// uploads directory as `<stamp>-<name>`.
///
/// A part with no file name and no content is what a form sends when no file
/// was picked; it yields `None`.
async fn persist_upload(
    mut field: axum::extract::multipart::Field<'_>,
    original_name: &str,
    state: &AppState,
) -> Result<Option<UploadedFile>, ApiError> {
    let verbose = !state.config.is_production();
    let io_error = |what: &str, e: std::io::Error| ApiError::internal(format!("{}: {}", what, e), verbose);

    let staged = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(state.config.temp_dir())
        .map_err(|e| io_error("Failed to stage upload", e))?;
    let std_file = staged.reopen().map_err(|e| io_error("Failed to stage upload", e))?;
    let mut file = tokio::fs::File::from_std(std_file);

    let limit = state.config.max_upload_bytes;
    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, state))? {
        written += chunk.len();
        if written > limit {
            return Err(ApiError::PayloadTooLarge {
                limit_mb: state.config.max_upload_mb(),
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| io_error("Failed to write upload", e))?;
    }
    file.flush().await.map_err(|e| io_error("Failed to write upload", e))?;
    drop(file);

    if written == 0 && original_name.trim().is_empty() {
        debug!("ignoring empty file field");
        return Ok(None);
    }

    let target = state
        .config
        .uploads_dir()
        .join(format!("{}-{}", unique_stamp(), sanitize_filename(original_name)));
    staged
        .persist(&target)
        .map_err(|e| io_error("Failed to persist upload", e.error))?;

    info!(path = %target.display(), size_bytes = written, original_name, "saved uploaded file");
    Ok(Some(UploadedFile { path: target }))
}

/// Keep only the last path component and replace anything unusual with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.html".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_odd_characters() {
        assert_eq!(sanitize_filename("page.html"), "page.html");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my page.html"), "my_page.html");
        assert_eq!(sanitize_filename(".."), "upload.html");
        assert_eq!(sanitize_filename(""), "upload.html");
    }

    #[test]
    fn uploaded_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1-page.html");
        std::fs::write(&path, "<html></html>").unwrap();
        let upload = UploadedFile { path: path.clone() };
        assert_eq!(upload.path(), path);
        drop(upload);
        assert!(!path.exists());
    }
}
