//! Request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::error::ApiError;
use super::upload::ConvertInput;
use super::AppState;
use crate::convert::output_file_name;
use crate::options::{ConversionOptions, Dimensions};
use crate::render::Target;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub success: bool,
    pub download_url: String,
    pub filename: String,
    pub format: String,
    pub dimensions: Dimensions,
}

/// `POST /api/convert`
pub async fn convert(
    State(state): State<Arc<AppState>>,
    input: ConvertInput,
) -> Result<Json<ConvertResponse>, ApiError> {
    let verbose = !state.config.is_production();
    let ConvertInput {
        upload,
        html_url,
        options,
    } = input;

    let target = match (&upload, html_url) {
        (Some(file), _) => Target::File(file.path().to_path_buf()),
        (None, Some(url)) => Target::parse(&url),
        (None, None) => {
            return Err(ApiError::bad_request(
                "No input provided",
                "Please provide either a file upload or URL",
            ))
        }
    };

    let options = ConversionOptions::from_value(options.as_ref()).map_err(|e| ApiError::conversion(e, verbose))?;

    if let Target::File(path) = &target {
        if !path.exists() {
            return Err(ApiError::bad_request(
                "File not found",
                format!("The file {} does not exist.", path.display()),
            ));
        }
    }

    let filename = output_file_name(options.format);
    let output = state.config.output_dir().join(&filename);
    info!(input = ?target, output = %output.display(), format = %options.format, "starting conversion");

    let result = state
        .converter
        .convert(&target, &output, &options)
        .await
        .map_err(|e| ApiError::conversion(e, verbose))?;

    Ok(Json(ConvertResponse {
        success: true,
        download_url: state.config.download_url(&filename),
        filename,
        format: result.format.to_string(),
        dimensions: result.dimensions,
    }))
}

#[derive(Debug, Serialize)]
pub struct DirectoryStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub writable: bool,
}

impl DirectoryStatus {
    pub fn inspect(path: &Path) -> Self {
        let exists = path.is_dir();
        let writable = exists && tempfile::tempfile_in(path).is_ok();
        if exists && !writable {
            warn!(path = %path.display(), "directory is not writable");
        }
        Self {
            path: path.to_path_buf(),
            exists,
            writable,
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let directories: Vec<DirectoryStatus> = state
        .config
        .directories()
        .iter()
        .map(|dir| DirectoryStatus::inspect(dir))
        .collect();

    let ffmpeg = state
        .config
        .ffmpeg_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "system".to_string());
    let chrome = state
        .config
        .chrome_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "bundled".to_string());

    Json(json!({
        "status": "healthy",
        "mode": state.config.mode.as_str(),
        "directories": directories,
        "dependencies": {
            "ffmpeg": ffmpeg,
            "chrome": chrome,
        },
    }))
}

/// Any unmatched route.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Endpoint not found" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_uses_camel_case() {
        let body = serde_json::to_value(ConvertResponse {
            success: true,
            download_url: "/output/converted-1.png".into(),
            filename: "converted-1.png".into(),
            format: "png".into(),
            dimensions: Dimensions {
                width: Some(800),
                height: None,
                scale: None,
            },
        })
        .unwrap();
        assert_eq!(body["downloadUrl"], "/output/converted-1.png");
        assert_eq!(body["dimensions"], json!({ "width": 800 }));
    }

    #[test]
    fn inspect_reports_missing_and_writable_directories() {
        let dir = tempfile::tempdir().unwrap();
        let status = DirectoryStatus::inspect(dir.path());
        assert!(status.exists && status.writable);

        let missing = DirectoryStatus::inspect(&dir.path().join("nope"));
        assert!(!missing.exists && !missing.writable);
    }
}
