use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::ContentStatus;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

/// Assessment
///
/// A scored multiple-choice quiz. `questions` is loaded separately and ordered by
/// `position`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Assessment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Minimum percentage (0-100) required to pass.
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: i32,
    pub status: ContentStatus,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub questions: Vec<AssessmentQuestion>,
}

/// AssessmentQuestion
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AssessmentQuestion {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub position: i32,
    pub prompt: String,
    pub options: Vec<String>,
    /// Zero-based index into `options`.
    pub correct_option: i32,
    pub points: i32,
}

/// QuestionInput
///
/// Question as supplied by an admin. Cross-field bounds (`correct_option` inside
/// `options`) are checked by `validate_question`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct QuestionInput {
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: i32,
    #[validate(range(min = 1, max = 100))]
    pub points: Option<i32>,
}

impl QuestionInput {
    pub fn into_question(self, assessment_id: Uuid, position: i32) -> AssessmentQuestion {
        AssessmentQuestion {
            id: Uuid::new_v4(),
            assessment_id,
            position,
            prompt: self.prompt.trim().to_string(),
            options: self.options.into_iter().map(|o| o.trim().to_string()).collect(),
            correct_option: self.correct_option,
            points: self.points.unwrap_or(1),
        }
    }
}

/// Checks option count, blank options and the `correct_option` bounds.
pub fn validate_question(q: &QuestionInput) -> Result<(), String> {
    if q.prompt.trim().is_empty() {
        return Err("question prompt must not be empty".to_string());
    }
    if q.options.len() < MIN_OPTIONS || q.options.len() > MAX_OPTIONS {
        return Err(format!(
            "question must have between {MIN_OPTIONS} and {MAX_OPTIONS} options, got {}",
            q.options.len()
        ));
    }
    if q.options.iter().any(|o| o.trim().is_empty()) {
        return Err("question options must not be empty".to_string());
    }
    if q.correct_option < 0 || q.correct_option as usize >= q.options.len() {
        return Err(format!(
            "correct_option {} is out of range for {} options",
            q.correct_option,
            q.options.len()
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateAssessmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i32>,
    #[validate(range(min = 1, max = 1440))]
    pub time_limit_minutes: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
}

/// UpdateAssessmentRequest
///
/// Partial update. When `questions` is present it replaces the whole question set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateAssessmentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0, max = 100))]
    pub passing_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1440))]
    pub time_limit_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions: Option<Vec<QuestionInput>>,
}

/// AssessmentChanges
///
/// Repository-level partial update with questions already materialized.
#[derive(Debug, Clone, Default)]
pub struct AssessmentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub passing_score: Option<i32>,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: Option<i32>,
    pub status: Option<ContentStatus>,
    pub questions: Option<Vec<AssessmentQuestion>>,
}

/// AssessmentAttempt
///
/// One submission of answers against an assessment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AssessmentAttempt {
    pub id: Uuid,
    pub progress_id: Uuid,
    pub assessment_id: Uuid,
    pub user_id: Uuid,
    pub answers: Vec<i32>,
    pub score: i32,
    pub passed: bool,
    #[ts(type = "string")]
    pub submitted_at: DateTime<Utc>,
}

/// PublicQuestion
///
/// Question as shown to a learner: no correct answer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublicQuestion {
    pub id: Uuid,
    pub position: i32,
    pub prompt: String,
    pub options: Vec<String>,
    pub points: i32,
}

/// AssessmentForLearner
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssessmentForLearner {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub passing_score: i32,
    pub time_limit_minutes: Option<i32>,
    pub max_attempts: i32,
    pub attempts_used: i32,
    pub questions: Vec<PublicQuestion>,
}

impl AssessmentForLearner {
    pub fn new(assessment: &Assessment, attempts_used: i32) -> Self {
        Self {
            id: assessment.id,
            title: assessment.title.clone(),
            description: assessment.description.clone(),
            passing_score: assessment.passing_score,
            time_limit_minutes: assessment.time_limit_minutes,
            max_attempts: assessment.max_attempts,
            attempts_used,
            questions: assessment
                .questions
                .iter()
                .map(|q| PublicQuestion {
                    id: q.id,
                    position: q.position,
                    prompt: q.prompt.clone(),
                    options: q.options.clone(),
                    points: q.points,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubmitAssessmentRequest {
    /// One selected option index per question, in question order.
    pub answers: Vec<i32>,
}

/// AssessmentResult
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssessmentResult {
    pub score: i32,
    pub passed: bool,
    pub earned_points: i32,
    pub total_points: i32,
    pub attempts_used: i32,
    pub attempts_remaining: i32,
    pub progress: super::UserContentProgress,
}
