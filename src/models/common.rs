use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Role
///
/// RBAC role stored on every user. `global_admin` manages organizations and has no
/// organization of its own; `admin` manages one organization; `user` consumes content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    GlobalAdmin,
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::GlobalAdmin => "global_admin",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parses the role column of CSV imports. Blank means `user`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "global_admin" => Some(Role::GlobalAdmin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ContentType
///
/// The four kinds of assignable content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ContentType {
    #[default]
    Module,
    Assessment,
    Survey,
    LearningPath,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Module => "module",
            ContentType::Assessment => "assessment",
            ContentType::Survey => "survey",
            ContentType::LearningPath => "learning_path",
        }
    }

    pub fn all() -> &'static [ContentType] {
        &[
            ContentType::Module,
            ContentType::Assessment,
            ContentType::Survey,
            ContentType::LearningPath,
        ]
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ContentStatus
///
/// Publishing state of authored content. Only `published` content can be assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "content_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ContentStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// ProgressStatus
///
/// Lifecycle of a `UserContentProgress` record.
///
/// `not_started` -> `in_progress` -> `completed`; assessments may end in `failed`
/// once every attempt is used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "progress_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    /// A record is open while the learner can still act on it.
    pub fn is_open(&self) -> bool {
        matches!(self, ProgressStatus::NotStarted | ProgressStatus::InProgress)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QuestionKind
///
/// Answer shape of a survey question.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "question_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum QuestionKind {
    #[default]
    SingleChoice,
    MultiChoice,
    Text,
    Rating,
}

impl QuestionKind {
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultiChoice)
    }
}

/// ImportReport
///
/// Outcome of a CSV import. Rows are validated independently; only valid rows are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ImportReport {
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

/// ImportError
///
/// A rejected CSV row. `line` is 1-based and counts the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ImportError {
    pub line: usize,
    pub message: String,
}

/// PresignedUrlRequest
///
/// Input payload for requesting a short-lived upload URL.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlRequest {
    /// The original filename, used to derive the file extension.
    #[schema(example = "onboarding.pdf")]
    pub filename: String,
    /// The MIME type the upload is constrained to.
    #[schema(example = "application/pdf")]
    pub file_type: String,
}

/// PresignedUrlResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct PresignedUrlResponse {
    /// The time-limited URL for the PUT request.
    pub upload_url: String,
    /// The object key to store on the module once the upload finishes.
    pub resource_key: String,
}
