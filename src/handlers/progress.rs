//! Learner endpoints under `/api/user`.
//!
//! Every record is loaded through `get_progress(caller, id)`, so a learner can only
//! ever see and move their own progress.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, auth::build_profile, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        ActivityLog, AssessmentAttempt, AssessmentForLearner, AssessmentResult, ContentType,
        LessonState, MyAssignment, MyAssignmentFilter, SubmitAssessmentRequest,
        SubmitSurveyRequest, Survey, SurveyResponse, UserContentProgress, UserProfile,
    },
    progress::{self, ProgressError},
    response::{ApiResponse, PageQuery, Pagination},
};

fn expect_type(record: &UserContentProgress, expected: ContentType) -> Result<(), ApiError> {
    if record.content_type != expected {
        return Err(ProgressError::WrongContentType(record.content_type.as_str()).into());
    }
    Ok(())
}

fn progress_entry(
    auth: &AuthUser,
    record: &UserContentProgress,
    action: &str,
    details: serde_json::Value,
) -> ActivityLog {
    ActivityLog::new(
        Some(record.organization_id),
        Some(auth.id),
        "progress",
        action,
        Some(record.id),
        details,
    )
}

/// get_me
///
/// [Authenticated Route] The caller's profile with organization and team names.
#[utoipa::path(
    get,
    path = "/api/user/me",
    tag = "learner",
    responses((status = 200, description = "Profile", body = ApiResponse<UserProfile>))
)]
pub async fn get_me(auth: AuthUser, State(state): State<AppState>) -> ApiResult<UserProfile> {
    let user = state.repo.get_user(auth.id).await?;
    let profile = build_profile(&state.repo, &user).await?;
    Ok(Json(ApiResponse::ok("Profile retrieved", profile)))
}

/// my_assignments
///
/// [Authenticated Route] The caller's progress records, newest first, each flagged
/// `overdue` when its due date passed before completion.
#[utoipa::path(
    get,
    path = "/api/user/assignments",
    tag = "learner",
    params(PageQuery, MyAssignmentFilter),
    responses((status = 200, description = "My assignments", body = ApiResponse<Vec<MyAssignment>>))
)]
pub async fn my_assignments(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
    Query(filter): Query<MyAssignmentFilter>,
) -> ApiResult<Vec<MyAssignment>> {
    auth.require_user_org()?;
    let (records, total) = state
        .repo
        .list_user_progress(auth.id, &q, filter.status)
        .await?;
    let now = Utc::now();
    let rows = records
        .into_iter()
        .map(|progress| MyAssignment {
            overdue: progress.is_overdue(now),
            progress,
        })
        .collect();
    Ok(Json(ApiResponse::paginated(
        "Assignments retrieved",
        rows,
        Pagination::new(&q, total),
    )))
}

/// get_progress
#[utoipa::path(
    get,
    path = "/api/user/progress/{id}",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses(
        (status = 200, description = "Progress record", body = ApiResponse<UserContentProgress>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserContentProgress> {
    auth.require_user_org()?;
    let record = state.repo.get_progress(auth.id, id).await?;
    Ok(Json(ApiResponse::ok("Progress retrieved", record)))
}

/// start_progress
///
/// [Authenticated Route] Moves a `not_started` record to `in_progress`. Calling it on
/// a record that is already started or finished returns the record unchanged.
#[utoipa::path(
    post,
    path = "/api/user/progress/{id}/start",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses((status = 200, description = "Progress record", body = ApiResponse<UserContentProgress>))
)]
pub async fn start_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserContentProgress> {
    auth.require_user_org()?;
    let mut record = state.repo.get_progress(auth.id, id).await?;

    if progress::start(&mut record, Utc::now()) {
        state.repo.update_progress(&record).await?;
        record_activity(
            &state.repo,
            progress_entry(
                &auth,
                &record,
                "started",
                json!({ "content_type": record.content_type, "content_id": record.content_id }),
            ),
        )
        .await;
    }

    Ok(Json(ApiResponse::ok("Progress started", record)))
}

/// complete_module
///
/// [Authenticated Route] Marks a module record completed (100%).
#[utoipa::path(
    post,
    path = "/api/user/progress/{id}/complete",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses(
        (status = 200, description = "Module completed", body = ApiResponse<UserContentProgress>),
        (status = 400, description = "Not a module record", body = crate::error::ErrorResponse)
    )
)]
pub async fn complete_module(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<UserContentProgress> {
    auth.require_user_org()?;
    let mut record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::Module)?;

    let was_open = record.status.is_open();
    progress::complete_module(&mut record, Utc::now())?;
    if was_open {
        state.repo.update_progress(&record).await?;
        record_activity(
            &state.repo,
            progress_entry(
                &auth,
                &record,
                "completed",
                json!({ "content_type": record.content_type, "content_id": record.content_id }),
            ),
        )
        .await;
    }

    Ok(Json(ApiResponse::ok("Module completed", record)))
}

/// get_assessment
///
/// [Authenticated Route] The assessment of an assessment record, without the
/// correct answers.
#[utoipa::path(
    get,
    path = "/api/user/progress/{id}/assessment",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses((status = 200, description = "Assessment", body = ApiResponse<AssessmentForLearner>))
)]
pub async fn get_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AssessmentForLearner> {
    auth.require_user_org()?;
    let record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::Assessment)?;

    let assessment = state
        .repo
        .get_assessment(record.organization_id, record.content_id)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Assessment retrieved",
        AssessmentForLearner::new(&assessment, record.attempts),
    )))
}

/// submit_assessment
///
/// [Authenticated Route] Scores one attempt. `answers[i]` is the selected option of
/// question `i`. A pass completes the record; a fail leaves it open for another
/// attempt until `max_attempts` is reached, after which it is `failed`.
#[utoipa::path(
    post,
    path = "/api/user/progress/{id}/assessment",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    request_body = SubmitAssessmentRequest,
    responses(
        (status = 200, description = "Attempt scored", body = ApiResponse<AssessmentResult>),
        (status = 400, description = "Malformed answers", body = crate::error::ErrorResponse),
        (status = 409, description = "Completed or out of attempts", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_assessment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAssessmentRequest>,
) -> ApiResult<AssessmentResult> {
    auth.require_user_org()?;
    let mut record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::Assessment)?;

    let assessment = state
        .repo
        .get_assessment(record.organization_id, record.content_id)
        .await?;
    progress::check_can_attempt(&record, &assessment)?;
    let score = progress::score_answers(&assessment.questions, &payload.answers)?;

    let now = Utc::now();
    let passed = progress::apply_assessment_score(&mut record, &assessment, &score, now)?;
    let attempt = AssessmentAttempt {
        id: Uuid::new_v4(),
        progress_id: record.id,
        assessment_id: assessment.id,
        user_id: auth.id,
        answers: payload.answers,
        score: score.percent,
        passed,
        submitted_at: now,
    };
    state.repo.record_attempt(attempt, &record).await?;

    record_activity(
        &state.repo,
        progress_entry(
            &auth,
            &record,
            if passed { "assessment_passed" } else { "assessment_failed" },
            json!({
                "assessment_id": assessment.id,
                "score": score.percent,
                "attempt": record.attempts,
            }),
        ),
    )
    .await;

    let result = AssessmentResult {
        score: score.percent,
        passed,
        earned_points: score.earned,
        total_points: score.total,
        attempts_used: record.attempts,
        attempts_remaining: (assessment.max_attempts - record.attempts).max(0),
        progress: record,
    };
    let message = if passed {
        "Assessment passed"
    } else {
        "Assessment not passed"
    };
    Ok(Json(ApiResponse::ok(message, result)))
}

/// get_survey
#[utoipa::path(
    get,
    path = "/api/user/progress/{id}/survey",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses((status = 200, description = "Survey", body = ApiResponse<Survey>))
)]
pub async fn get_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Survey> {
    auth.require_user_org()?;
    let record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::Survey)?;

    let survey = state
        .repo
        .get_survey(record.organization_id, record.content_id)
        .await?;
    Ok(Json(ApiResponse::ok("Survey retrieved", survey)))
}

/// submit_survey
///
/// [Authenticated Route] Stores the caller's single response and completes the
/// record. A second submission is rejected with 409.
#[utoipa::path(
    post,
    path = "/api/user/progress/{id}/survey",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    request_body = SubmitSurveyRequest,
    responses(
        (status = 200, description = "Response stored", body = ApiResponse<UserContentProgress>),
        (status = 400, description = "Invalid answers", body = crate::error::ErrorResponse),
        (status = 409, description = "Already submitted", body = crate::error::ErrorResponse)
    )
)]
pub async fn submit_survey(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitSurveyRequest>,
) -> ApiResult<UserContentProgress> {
    auth.require_user_org()?;
    let mut record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::Survey)?;

    let survey = state
        .repo
        .get_survey(record.organization_id, record.content_id)
        .await?;
    let answers = progress::validate_survey_answers(&survey, &payload.answers)?;

    let now = Utc::now();
    progress::complete_survey(&mut record, now)?;
    let response = SurveyResponse {
        id: Uuid::new_v4(),
        survey_id: survey.id,
        progress_id: record.id,
        user_id: auth.id,
        answers,
        submitted_at: now,
    };
    let response_id = response.id;
    state.repo.submit_survey_response(response, &record).await?;

    record_activity(
        &state.repo,
        progress_entry(
            &auth,
            &record,
            "survey_submitted",
            json!({ "survey_id": survey.id, "response_id": response_id }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Survey submitted", record)))
}

/// list_lessons
///
/// [Authenticated Route] Lessons of a learning path record with the caller's
/// `completed` and `locked` flags.
#[utoipa::path(
    get,
    path = "/api/user/progress/{id}/lessons",
    tag = "learner",
    params(("id" = Uuid, Path, description = "Progress record id")),
    responses((status = 200, description = "Lessons", body = ApiResponse<Vec<LessonState>>))
)]
pub async fn list_lessons(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<LessonState>> {
    auth.require_user_org()?;
    let record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::LearningPath)?;

    let path = state
        .repo
        .get_learning_path(record.organization_id, record.content_id)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Lessons retrieved",
        progress::lesson_states(&path, &record.completed_lessons),
    )))
}

/// complete_lesson
///
/// [Authenticated Route] Marks one lesson done. Locked lessons are rejected with 403
/// and lessons outside the path with 404. Completing an already completed lesson is
/// a no-op.
#[utoipa::path(
    post,
    path = "/api/user/progress/{id}/lessons/{lesson_id}/complete",
    tag = "learner",
    params(
        ("id" = Uuid, Path, description = "Progress record id"),
        ("lesson_id" = Uuid, Path, description = "Lesson id")
    ),
    responses(
        (status = 200, description = "Lesson completed", body = ApiResponse<UserContentProgress>),
        (status = 403, description = "Lesson locked", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown lesson", body = crate::error::ErrorResponse)
    )
)]
pub async fn complete_lesson(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, lesson_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<UserContentProgress> {
    auth.require_user_org()?;
    let mut record = state.repo.get_progress(auth.id, id).await?;
    expect_type(&record, ContentType::LearningPath)?;

    let path = state
        .repo
        .get_learning_path(record.organization_id, record.content_id)
        .await?;
    let before = record.completed_lessons.clone();
    progress::complete_lesson(&mut record, &path, lesson_id, Utc::now())?;

    if record.completed_lessons != before {
        state.repo.update_progress(&record).await?;
        record_activity(
            &state.repo,
            progress_entry(
                &auth,
                &record,
                "lesson_completed",
                json!({
                    "lesson_id": lesson_id,
                    "progress_percent": record.progress_percent,
                    "status": record.status,
                }),
            ),
        )
        .await;
    }

    Ok(Json(ApiResponse::ok("Lesson completed", record)))
}
