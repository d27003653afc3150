use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{ContentStatus, QuestionKind};

pub const RATING_MIN: i64 = 1;
pub const RATING_MAX: i64 = 5;

/// Survey
///
/// Unscored questionnaire organized in ordered sections.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Survey {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ContentStatus,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub sections: Vec<SurveySection>,
}

impl Survey {
    pub fn questions(&self) -> impl Iterator<Item = &SurveyQuestion> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SurveySection {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub position: i32,
    pub title: String,
    #[sqlx(skip)]
    pub questions: Vec<SurveyQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SurveyQuestion {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub section_id: Uuid,
    pub position: i32,
    pub prompt: String,
    pub kind: QuestionKind,
    /// Choices for `single_choice` / `multi_choice`; empty for other kinds.
    pub options: Vec<String>,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct SectionInput {
    /// Id of the section being kept on update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<SurveyQuestionInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct SurveyQuestionInput {
    /// Id of the question being kept on update. Submitted answers follow the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    pub kind: QuestionKind,
    pub options: Option<Vec<String>>,
    pub required: Option<bool>,
}

/// Checks that choice questions carry at least two non-blank options and that
/// the other kinds carry none.
pub fn validate_survey_question(q: &SurveyQuestionInput) -> Result<(), String> {
    let options = q.options.as_deref().unwrap_or_default();
    if q.kind.is_choice() {
        if options.len() < 2 {
            return Err(format!(
                "choice question '{}' needs at least 2 options",
                q.prompt.trim()
            ));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(format!("question '{}' has an empty option", q.prompt.trim()));
        }
    } else if !options.is_empty() {
        return Err(format!(
            "question '{}' of kind {:?} must not have options",
            q.prompt.trim(),
            q.kind
        ));
    }
    Ok(())
}

/// build_sections
///
/// Builds the section tree with contiguous positions. Ids from `existing` survive
/// an edit so that submitted answers keep pointing at their questions: an input
/// carrying an `id` keeps it, and an input without one takes the id of the section
/// at the same position, or of the same-kind question at the same position inside
/// it. Everything else gets a fresh id.
pub fn build_sections(
    survey_id: Uuid,
    inputs: Vec<SectionInput>,
    existing: &[SurveySection],
) -> Result<Vec<SurveySection>, String> {
    let mut claimed = HashSet::new();
    for (s_idx, section) in inputs.iter().enumerate() {
        if let Some(id) = section.id {
            if !existing.iter().any(|s| s.id == id) || !claimed.insert(id) {
                return Err(format!(
                    "Section {}: unknown or repeated section id {id}",
                    s_idx + 1
                ));
            }
        }
        for (q_idx, question) in section.questions.iter().enumerate() {
            let Some(id) = question.id else { continue };
            let known = existing
                .iter()
                .flat_map(|s| s.questions.iter())
                .any(|q| q.id == id);
            if !known || !claimed.insert(id) {
                return Err(format!(
                    "Section {}, question {}: unknown or repeated question id {id}",
                    s_idx + 1,
                    q_idx + 1
                ));
            }
        }
    }

    let mut sections = Vec::with_capacity(inputs.len());
    for (s_idx, section) in inputs.into_iter().enumerate() {
        let previous = match section.id {
            Some(id) => existing.iter().find(|s| s.id == id),
            None => existing
                .iter()
                .find(|s| s.position == s_idx as i32 && !claimed.contains(&s.id)),
        };
        if let Some(previous) = previous {
            claimed.insert(previous.id);
        }
        let section_id = previous.map_or_else(Uuid::new_v4, |s| s.id);

        let mut questions = Vec::with_capacity(section.questions.len());
        for (q_idx, q) in section.questions.into_iter().enumerate() {
            let id = match q.id {
                Some(id) => id,
                None => {
                    let reused = previous
                        .and_then(|s| {
                            s.questions.iter().find(|old| {
                                old.position == q_idx as i32
                                    && old.kind == q.kind
                                    && !claimed.contains(&old.id)
                            })
                        })
                        .map(|old| old.id);
                    if let Some(id) = reused {
                        claimed.insert(id);
                    }
                    reused.unwrap_or_else(Uuid::new_v4)
                }
            };
            questions.push(SurveyQuestion {
                id,
                survey_id,
                section_id,
                position: q_idx as i32,
                prompt: q.prompt.trim().to_string(),
                kind: q.kind,
                options: q
                    .options
                    .unwrap_or_default()
                    .into_iter()
                    .map(|o| o.trim().to_string())
                    .collect(),
                required: q.required.unwrap_or(true),
            });
        }

        sections.push(SurveySection {
            id: section_id,
            survey_id,
            position: s_idx as i32,
            title: section.title.trim().to_string(),
            questions,
        });
    }
    Ok(sections)
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateSurveyRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub status: Option<ContentStatus>,
    #[serde(default)]
    pub sections: Vec<SectionInput>,
}

/// UpdateSurveyRequest
///
/// Partial update. When `sections` is present the whole section/question tree is
/// replaced.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateSurveyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<SectionInput>>,
}

#[derive(Debug, Clone, Default)]
pub struct SurveyChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ContentStatus>,
    pub sections: Option<Vec<SurveySection>>,
}

/// SurveyAnswer
///
/// One answer. `value` is an option index for `single_choice`, an array of indexes
/// for `multi_choice`, a string for `text` and an integer 1-5 for `rating`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SurveyAnswer {
    pub question_id: Uuid,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubmitSurveyRequest {
    pub answers: Vec<SurveyAnswer>,
}

/// SurveyResponse
///
/// Stored submission; `answers` is a JSONB column.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub progress_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub answers: Vec<SurveyAnswer>,
    #[ts(type = "string")]
    pub submitted_at: DateTime<Utc>,
}

/// SurveyResponseView
///
/// Admin listing row, joined with the respondent's identity.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct SurveyResponseView {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    #[sqlx(json)]
    pub answers: Vec<SurveyAnswer>,
    #[ts(type = "string")]
    pub submitted_at: DateTime<Utc>,
}
