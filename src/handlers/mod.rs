//! HTTP handlers, one module per resource.
//!
//! Every handler follows the same shape: resolve the caller (`AuthUser` + guard),
//! validate the payload, write through the repository, record an activity entry,
//! and respond with the `ApiResponse` envelope.

use axum::{Json, extract::Multipart, http::StatusCode};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{ActivityLog, ContentStatus, ContentType},
    repository::{RepoError, RepositoryState},
    response::ApiResponse,
};

pub mod activity;
pub mod analytics;
pub mod assessments;
pub mod assignments;
pub mod auth;
pub mod learning_paths;
pub mod modules;
pub mod organizations;
pub mod progress;
pub mod surveys;
pub mod teams;
pub mod users;

/// Result type of every JSON handler.
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Largest CSV accepted by the import endpoints.
pub const MAX_CSV_BYTES: usize = 2 * 1024 * 1024;

/// record_activity
///
/// Appends an audit entry. A failure here is logged and swallowed: the mutation it
/// describes has already been committed.
pub async fn record_activity(repo: &RepositoryState, entry: ActivityLog) {
    let action = entry.action.clone();
    if let Err(e) = repo.log_activity(entry).await {
        tracing::error!(%action, error = %e, "failed to write activity log");
    }
}

/// UploadedFile
///
/// The `file` part of a multipart request.
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// read_file_field
///
/// Returns the first part named `file`. Other parts are ignored.
pub async fn read_file_field(mut multipart: Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }
        return Ok(UploadedFile {
            filename,
            content_type,
            bytes,
        });
    }
    Err(ApiError::BadRequest(
        "Missing multipart field 'file'".to_string(),
    ))
}

/// read_csv_upload
///
/// Reads the `file` part as UTF-8 CSV text.
pub async fn read_csv_upload(multipart: Multipart) -> Result<String, ApiError> {
    let file = read_file_field(multipart).await?;
    if file.bytes.len() > MAX_CSV_BYTES {
        return Err(ApiError::BadRequest("CSV file is too large".to_string()));
    }
    String::from_utf8(file.bytes)
        .map_err(|_| ApiError::BadRequest("CSV file must be UTF-8 encoded".to_string()))
}

/// ContentRef
///
/// Title and publishing state of an assignable content item.
pub struct ContentRef {
    pub title: String,
    pub status: ContentStatus,
}

/// lookup_content
///
/// Resolves `(content_type, content_id)` inside `org`, 404 when it does not exist.
pub async fn lookup_content(
    repo: &RepositoryState,
    org: Uuid,
    content_type: ContentType,
    content_id: Uuid,
) -> Result<ContentRef, ApiError> {
    let content = match content_type {
        ContentType::Module => {
            let m = repo.get_module(org, content_id).await?;
            ContentRef {
                title: m.title,
                status: m.status,
            }
        }
        ContentType::Assessment => {
            let a = repo.get_assessment(org, content_id).await?;
            ContentRef {
                title: a.title,
                status: a.status,
            }
        }
        ContentType::Survey => {
            let s = repo.get_survey(org, content_id).await?;
            ContentRef {
                title: s.title,
                status: s.status,
            }
        }
        ContentType::LearningPath => {
            let p = repo.get_learning_path(org, content_id).await?;
            ContentRef {
                title: p.title,
                status: p.status,
            }
        }
    };
    Ok(content)
}

/// Result type of handlers answering `201 Created`.
pub type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// created
pub fn created<T>(message: &str, data: T) -> CreatedResult<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message, data))))
}

/// Trims `value`, mapping blank strings to `None`.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Maps a missing referenced row to 400 (it came from the request body), keeping
/// other repository errors as they are.
pub fn missing_reference(err: RepoError, message: String) -> ApiError {
    match err {
        RepoError::NotFound(_) => ApiError::BadRequest(message),
        other => other.into(),
    }
}
