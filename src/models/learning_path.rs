use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{ContentStatus, ContentType};

/// LearningPath
///
/// An ordered curriculum of lessons, each pointing at a module, assessment or survey.
/// With `enforce_order` a lesson stays locked until every earlier lesson is complete.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct LearningPath {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub enforce_order: bool,
    pub status: ContentStatus,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Lesson {
    pub id: Uuid,
    pub learning_path_id: Uuid,
    pub position: i32,
    pub title: String,
    pub content_type: ContentType,
    pub content_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct LessonInput {
    /// Id of the lesson being kept on update. Without it, a lesson pointing at the
    /// same content as an existing one keeps that lesson's id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Defaults to the referenced content's title.
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub content_type: ContentType,
    pub content_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateLearningPathRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub enforce_order: Option<bool>,
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub lessons: Vec<LessonInput>,
}

/// UpdateLearningPathRequest
///
/// Partial update. When `lessons` is present the lesson list is replaced.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateLearningPathRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_order: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lessons: Option<Vec<LessonInput>>,
}

#[derive(Debug, Clone, Default)]
pub struct LearningPathChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub enforce_order: Option<bool>,
    pub status: Option<ContentStatus>,
    pub lessons: Option<Vec<Lesson>>,
}

/// LessonState
///
/// A lesson as seen by one learner.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LessonState {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub completed: bool,
    pub locked: bool,
}
