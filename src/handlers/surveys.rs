use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, non_blank, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    csv::CsvWriter,
    error::ApiError,
    models::{
        ActivityLog, ContentStatus, CreateSurveyRequest, QuestionKind, SectionInput, Survey,
        SurveyChanges, SurveyQuestion, SurveyResponseView, SurveySection, UpdateSurveyRequest,
        build_sections, validate_survey_question,
    },
    response::{ApiResponse, CsvFile, PageQuery, Pagination},
};

/// Validates the section tree and builds it, keeping the ids of `existing`.
fn checked_sections(
    survey_id: Uuid,
    inputs: Vec<SectionInput>,
    existing: &[SurveySection],
) -> Result<Vec<SurveySection>, ApiError> {
    for (s_idx, section) in inputs.iter().enumerate() {
        section
            .validate()
            .map_err(|e| ApiError::BadRequest(format!("Section {}: {e}", s_idx + 1)))?;
        for (q_idx, question) in section.questions.iter().enumerate() {
            let at = format!("Section {}, question {}", s_idx + 1, q_idx + 1);
            question
                .validate()
                .map_err(|e| ApiError::BadRequest(format!("{at}: {e}")))?;
            validate_survey_question(question)
                .map_err(|e| ApiError::BadRequest(format!("{at}: {e}")))?;
        }
    }
    build_sections(survey_id, inputs, existing).map_err(ApiError::BadRequest)
}

fn check_publishable(status: ContentStatus, sections: &[SurveySection]) -> Result<(), ApiError> {
    if status == ContentStatus::Published && sections.iter().all(|s| s.questions.is_empty()) {
        return Err(ApiError::BadRequest(
            "A published survey needs at least one question".to_string(),
        ));
    }
    Ok(())
}

/// create_survey
///
/// [Admin Route] Creates a survey with its ordered sections and questions.
#[utoipa::path(
    post,
    path = "/api/admin/surveys",
    tag = "surveys",
    request_body = CreateSurveyRequest,
    responses(
        (status = 201, description = "Survey created", body = ApiResponse<Survey>),
        (status = 400, description = "Invalid question", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSurveyRequest>,
) -> CreatedResult<Survey> {
    let org = auth.require_admin()?;
    payload.validate()?;

    let id = Uuid::new_v4();
    let sections = checked_sections(id, payload.sections, &[])?;
    let status = payload.status.unwrap_or_default();
    check_publishable(status, &sections)?;

    let now = Utc::now();
    let survey = state
        .repo
        .create_survey(Survey {
            id,
            organization_id: org,
            title: payload.title.trim().to_string(),
            description: non_blank(payload.description),
            status,
            created_by: auth.id,
            created_at: now,
            updated_at: now,
            sections,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "survey",
            "created",
            Some(survey.id),
            json!({ "title": survey.title, "sections": survey.sections.len() }),
        ),
    )
    .await;

    created("Survey created", survey)
}

/// list_surveys
#[utoipa::path(
    get,
    path = "/api/admin/surveys",
    tag = "surveys",
    params(PageQuery),
    responses((status = 200, description = "Surveys", body = ApiResponse<Vec<Survey>>))
)]
pub async fn list_surveys(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<Survey>> {
    let org = auth.require_admin()?;
    let (surveys, total) = state.repo.list_surveys(org, &q).await?;
    Ok(Json(ApiResponse::paginated(
        "Surveys retrieved",
        surveys,
        Pagination::new(&q, total),
    )))
}

/// get_survey
#[utoipa::path(
    get,
    path = "/api/admin/surveys/{id}",
    tag = "surveys",
    params(("id" = Uuid, Path, description = "Survey id")),
    responses(
        (status = 200, description = "Survey with its sections", body = ApiResponse<Survey>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Survey> {
    let org = auth.require_admin()?;
    let survey = state.repo.get_survey(org, id).await?;
    Ok(Json(ApiResponse::ok("Survey retrieved", survey)))
}

/// update_survey
///
/// [Admin Route] Partial update. A `sections` array replaces the whole tree.
#[utoipa::path(
    put,
    path = "/api/admin/surveys/{id}",
    tag = "surveys",
    params(("id" = Uuid, Path, description = "Survey id")),
    request_body = UpdateSurveyRequest,
    responses((status = 200, description = "Survey updated", body = ApiResponse<Survey>))
)]
pub async fn update_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSurveyRequest>,
) -> ApiResult<Survey> {
    let org = auth.require_admin()?;
    payload.validate()?;
    let current = state.repo.get_survey(org, id).await?;

    let sections = payload
        .sections
        .map(|inputs| checked_sections(id, inputs, &current.sections))
        .transpose()?;
    check_publishable(
        payload.status.unwrap_or(current.status),
        sections.as_deref().unwrap_or(&current.sections),
    )?;

    let details = json!({
        "title": payload.title,
        "status": payload.status,
        "sections_replaced": sections.as_ref().map(Vec::len),
    });
    let changes = SurveyChanges {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description,
        status: payload.status,
        sections,
    };
    let survey = state.repo.update_survey(org, id, changes).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(Some(org), Some(auth.id), "survey", "updated", Some(id), details),
    )
    .await;

    Ok(Json(ApiResponse::ok("Survey updated", survey)))
}

/// delete_survey
///
/// [Admin Route] Removes the survey with its sections, questions, responses,
/// assignments and progress records.
#[utoipa::path(
    delete,
    path = "/api/admin/surveys/{id}",
    tag = "surveys",
    params(("id" = Uuid, Path, description = "Survey id")),
    responses((status = 200, description = "Survey deleted"))
)]
pub async fn delete_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let survey = state.repo.get_survey(org, id).await?;
    state.repo.delete_survey(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "survey",
            "deleted",
            Some(id),
            json!({ "title": survey.title }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Survey deleted")))
}

/// list_survey_responses
///
/// [Admin Route] Submitted responses with the respondent's name and email, newest
/// first.
#[utoipa::path(
    get,
    path = "/api/admin/surveys/{id}/responses",
    tag = "surveys",
    params(("id" = Uuid, Path, description = "Survey id"), PageQuery),
    responses((status = 200, description = "Responses", body = ApiResponse<Vec<SurveyResponseView>>))
)]
pub async fn list_survey_responses(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<SurveyResponseView>> {
    let org = auth.require_admin()?;
    state.repo.get_survey(org, id).await?;
    let (responses, total) = state.repo.list_survey_responses(id, &q).await?;
    Ok(Json(ApiResponse::paginated(
        "Responses retrieved",
        responses,
        Pagination::new(&q, total),
    )))
}

/// Human readable answer: option text for choice questions, the raw value otherwise.
fn render_answer(question: &SurveyQuestion, value: &Value) -> String {
    let option = |v: &Value| {
        v.as_u64()
            .and_then(|idx| question.options.get(idx as usize))
            .cloned()
            .unwrap_or_else(|| v.to_string())
    };
    match (question.kind, value) {
        (QuestionKind::SingleChoice, v) => option(v),
        (QuestionKind::MultiChoice, Value::Array(picks)) => {
            picks.iter().map(option).collect::<Vec<_>>().join("; ")
        }
        (_, Value::String(text)) => text.clone(),
        (_, v) => v.to_string(),
    }
}

/// export_survey_responses
///
/// [Admin Route] All responses as CSV, one row per answer.
#[utoipa::path(
    get,
    path = "/api/admin/surveys/{id}/responses/export",
    tag = "surveys",
    params(("id" = Uuid, Path, description = "Survey id")),
    responses((status = 200, description = "CSV file", content_type = "text/csv", body = String))
)]
pub async fn export_survey_responses(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<CsvFile, ApiError> {
    let org = auth.require_admin()?;
    let survey = state.repo.get_survey(org, id).await?;
    let responses = state.repo.all_survey_responses(id).await?;

    let questions: HashMap<Uuid, (&str, &SurveyQuestion)> = survey
        .sections
        .iter()
        .flat_map(|s| s.questions.iter().map(move |q| (q.id, (s.title.as_str(), q))))
        .collect();

    let mut writer = CsvWriter::with_header(&[
        "response_id",
        "user_email",
        "section",
        "question",
        "answer",
        "submitted_at",
    ]);
    for response in &responses {
        for answer in &response.answers {
            // Answers to questions removed by a later edit are not exported.
            let Some((section, question)) = questions.get(&answer.question_id) else {
                continue;
            };
            writer.row(&[
                response.id.to_string(),
                response.user_email.clone(),
                section.to_string(),
                question.prompt.clone(),
                render_answer(question, &answer.value),
                response.submitted_at.to_rfc3339(),
            ]);
        }
    }

    Ok(CsvFile {
        filename: format!("survey-{id}-responses.csv"),
        body: writer.finish(),
    })
}
