use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::ContentStatus;

/// TrainingModule
///
/// A unit of reading/watching material. `resource_key` points at the uploaded file
/// in object storage (PDF, video, slides).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct TrainingModule {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Markdown body shown to the learner.
    pub content: Option<String>,
    pub resource_key: Option<String>,
    pub duration_minutes: i32,
    pub status: ContentStatus,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateModuleRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    #[validate(range(min = 0, max = 10000))]
    pub duration_minutes: Option<i32>,
    pub status: Option<ContentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateModuleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0, max = 10000))]
    pub duration_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    /// Key returned by the presigned upload endpoint, once the upload finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
}

/// ModuleFilter
///
/// Extra filter for the module listing, combined with `PageQuery`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ModuleFilter {
    pub status: Option<ContentStatus>,
}
