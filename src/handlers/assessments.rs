use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, non_blank, read_csv_upload, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    csv::{self, Header},
    error::ApiError,
    models::{
        ActivityLog, Assessment, AssessmentChanges, AssessmentQuestion, ContentStatus,
        CreateAssessmentRequest, ImportError, ImportReport, QuestionInput,
        UpdateAssessmentRequest, validate_question,
    },
    response::{ApiResponse, PageQuery, Pagination},
};

const DEFAULT_PASSING_SCORE: i32 = 70;
const DEFAULT_MAX_ATTEMPTS: i32 = 1;
const IMPORT_COLUMNS: [&str; 3] = ["prompt", "options", "correct_option"];

/// Validates every question and materializes them with positions starting at `first_position`.
fn build_questions(
    assessment_id: Uuid,
    inputs: Vec<QuestionInput>,
    first_position: i32,
) -> Result<Vec<AssessmentQuestion>, ApiError> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let number = idx + 1;
            input
                .validate()
                .map_err(|e| ApiError::BadRequest(format!("Question {number}: {e}")))?;
            validate_question(&input)
                .map_err(|e| ApiError::BadRequest(format!("Question {number}: {e}")))?;
            Ok(input.into_question(assessment_id, first_position + idx as i32))
        })
        .collect()
}

fn check_publishable(status: ContentStatus, question_count: usize) -> Result<(), ApiError> {
    if status == ContentStatus::Published && question_count == 0 {
        return Err(ApiError::BadRequest(
            "A published assessment needs at least one question".to_string(),
        ));
    }
    Ok(())
}

/// create_assessment
///
/// [Admin Route] Creates an assessment with its questions. `passing_score` defaults
/// to 70 and `max_attempts` to 1.
#[utoipa::path(
    post,
    path = "/api/admin/assessments",
    tag = "assessments",
    request_body = CreateAssessmentRequest,
    responses(
        (status = 201, description = "Assessment created", body = ApiResponse<Assessment>),
        (status = 400, description = "Invalid question", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAssessmentRequest>,
) -> CreatedResult<Assessment> {
    let org = auth.require_admin()?;
    payload.validate()?;

    let id = Uuid::new_v4();
    let questions = build_questions(id, payload.questions, 0)?;
    let status = payload.status.unwrap_or_default();
    check_publishable(status, questions.len())?;

    let now = Utc::now();
    let assessment = state
        .repo
        .create_assessment(Assessment {
            id,
            organization_id: org,
            title: payload.title.trim().to_string(),
            description: non_blank(payload.description),
            passing_score: payload.passing_score.unwrap_or(DEFAULT_PASSING_SCORE),
            time_limit_minutes: payload.time_limit_minutes,
            max_attempts: payload.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            status,
            created_by: auth.id,
            created_at: now,
            updated_at: now,
            questions,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assessment",
            "created",
            Some(assessment.id),
            json!({ "title": assessment.title, "questions": assessment.questions.len() }),
        ),
    )
    .await;

    created("Assessment created", assessment)
}

/// list_assessments
#[utoipa::path(
    get,
    path = "/api/admin/assessments",
    tag = "assessments",
    params(PageQuery),
    responses((status = 200, description = "Assessments", body = ApiResponse<Vec<Assessment>>))
)]
pub async fn list_assessments(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<Assessment>> {
    let org = auth.require_admin()?;
    let (assessments, total) = state.repo.list_assessments(org, &q).await?;
    Ok(Json(ApiResponse::paginated(
        "Assessments retrieved",
        assessments,
        Pagination::new(&q, total),
    )))
}

/// get_assessment
///
/// [Admin Route] The assessment with its questions, correct answers included.
#[utoipa::path(
    get,
    path = "/api/admin/assessments/{id}",
    tag = "assessments",
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses(
        (status = 200, description = "Assessment", body = ApiResponse<Assessment>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Assessment> {
    let org = auth.require_admin()?;
    let assessment = state.repo.get_assessment(org, id).await?;
    Ok(Json(ApiResponse::ok("Assessment retrieved", assessment)))
}

/// update_assessment
///
/// [Admin Route] Partial update. A `questions` array replaces the whole question set.
/// Attempts already recorded keep their scores.
#[utoipa::path(
    put,
    path = "/api/admin/assessments/{id}",
    tag = "assessments",
    params(("id" = Uuid, Path, description = "Assessment id")),
    request_body = UpdateAssessmentRequest,
    responses((status = 200, description = "Assessment updated", body = ApiResponse<Assessment>))
)]
pub async fn update_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAssessmentRequest>,
) -> ApiResult<Assessment> {
    let org = auth.require_admin()?;
    payload.validate()?;
    let current = state.repo.get_assessment(org, id).await?;

    let questions = payload
        .questions
        .map(|inputs| build_questions(id, inputs, 0))
        .transpose()?;
    check_publishable(
        payload.status.unwrap_or(current.status),
        questions.as_ref().map_or(current.questions.len(), Vec::len),
    )?;

    let details = json!({
        "title": payload.title,
        "status": payload.status,
        "questions_replaced": questions.as_ref().map(Vec::len),
    });
    let changes = AssessmentChanges {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description,
        passing_score: payload.passing_score,
        time_limit_minutes: payload.time_limit_minutes,
        max_attempts: payload.max_attempts,
        status: payload.status,
        questions,
    };
    let assessment = state.repo.update_assessment(org, id, changes).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assessment",
            "updated",
            Some(id),
            details,
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Assessment updated", assessment)))
}

/// delete_assessment
///
/// [Admin Route] Removes the assessment with its questions, attempts, assignments
/// and progress records.
#[utoipa::path(
    delete,
    path = "/api/admin/assessments/{id}",
    tag = "assessments",
    params(("id" = Uuid, Path, description = "Assessment id")),
    responses((status = 200, description = "Assessment deleted"))
)]
pub async fn delete_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let assessment = state.repo.get_assessment(org, id).await?;
    state.repo.delete_assessment(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assessment",
            "deleted",
            Some(id),
            json!({ "title": assessment.title }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Assessment deleted")))
}

/// import_questions
///
/// [Admin Route] Appends questions from a CSV upload (multipart field `file`).
///
/// Header: `prompt,options,correct_option,points` where `options` is `|`-separated,
/// `correct_option` is the zero-based index of the right option and `points` is
/// optional (default 1). Invalid rows are reported per line; valid rows are
/// appended after the existing questions.
#[utoipa::path(
    post,
    path = "/api/admin/assessments/{id}/questions/import",
    tag = "assessments",
    params(("id" = Uuid, Path, description = "Assessment id")),
    request_body(content_type = "multipart/form-data", description = "CSV file in field `file`"),
    responses(
        (status = 200, description = "Import report", body = ApiResponse<ImportReport>),
        (status = 400, description = "Malformed file", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_questions(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<ImportReport> {
    let org = auth.require_admin()?;
    let assessment = state.repo.get_assessment(org, id).await?;
    let text = read_csv_upload(multipart).await?;

    let mut records = csv::parse(&text).into_iter();
    let header = records
        .next()
        .map(|r| Header::new(&r))
        .ok_or_else(|| ApiError::BadRequest("CSV file is empty".to_string()))?;
    let missing = header.missing(&IMPORT_COLUMNS);
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let mut report = ImportReport::default();
    let mut questions = Vec::new();
    let mut position = assessment.questions.len() as i32;

    for record in records {
        let fail = |message: String| ImportError {
            line: record.line,
            message,
        };

        let Ok(correct_option) = header.field(&record, "correct_option").parse::<i32>() else {
            report
                .errors
                .push(fail("correct_option must be a whole number".to_string()));
            continue;
        };
        let points = match header.field(&record, "points") {
            "" => None,
            raw => match raw.parse::<i32>() {
                Ok(points) => Some(points),
                Err(_) => {
                    report
                        .errors
                        .push(fail("points must be a whole number".to_string()));
                    continue;
                }
            },
        };
        let input = QuestionInput {
            prompt: header.field(&record, "prompt").to_string(),
            options: header
                .field(&record, "options")
                .split('|')
                .map(str::to_string)
                .collect(),
            correct_option,
            points,
        };

        if let Err(e) = input.validate() {
            report.errors.push(fail(format!("Validation failed: {e}")));
            continue;
        }
        if let Err(message) = validate_question(&input) {
            report.errors.push(fail(message));
            continue;
        }
        questions.push(input.into_question(id, position));
        position += 1;
    }

    report.created = questions.len();
    if !questions.is_empty() {
        state.repo.append_questions(org, id, questions).await?;
    }

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assessment",
            "questions_imported",
            Some(id),
            json!({ "created": report.created, "errors": report.errors.len() }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Import finished", report)))
}
