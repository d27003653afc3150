use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, lookup_content, non_blank, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        ActivityLog, ContentStatus, ContentType, CreateLearningPathRequest, LearningPath,
        LearningPathChanges, Lesson, LessonInput, UpdateLearningPathRequest,
    },
    repository::RepositoryState,
    response::{ApiResponse, PageQuery, Pagination},
};

/// build_lessons
///
/// Resolves every lesson's content inside `org`. Learning paths cannot be nested,
/// and a lesson without a title takes the title of its content. Lessons already in
/// `existing` keep their ids, so learners' completed lessons survive an edit.
async fn build_lessons(
    repo: &RepositoryState,
    org: Uuid,
    path_id: Uuid,
    inputs: Vec<LessonInput>,
    existing: &[Lesson],
) -> Result<Vec<Lesson>, ApiError> {
    let mut claimed = HashSet::new();
    for (idx, input) in inputs.iter().enumerate() {
        if let Some(id) = input.id {
            if !existing.iter().any(|l| l.id == id) || !claimed.insert(id) {
                return Err(ApiError::BadRequest(format!(
                    "Lesson {}: unknown or repeated lesson id {id}",
                    idx + 1
                )));
            }
        }
    }

    let mut lessons = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.into_iter().enumerate() {
        let number = idx + 1;
        input
            .validate()
            .map_err(|e| ApiError::BadRequest(format!("Lesson {number}: {e}")))?;
        if input.content_type == ContentType::LearningPath {
            return Err(ApiError::BadRequest(format!(
                "Lesson {number}: learning paths cannot contain other learning paths"
            )));
        }
        let content = lookup_content(repo, org, input.content_type, input.content_id)
            .await
            .map_err(|e| match e {
                ApiError::NotFound(_) => ApiError::BadRequest(format!(
                    "Lesson {number}: {} {} does not exist",
                    input.content_type, input.content_id
                )),
                other => other,
            })?;

        let id = input.id.unwrap_or_else(|| {
            existing
                .iter()
                .find(|l| {
                    l.content_type == input.content_type
                        && l.content_id == input.content_id
                        && !claimed.contains(&l.id)
                })
                .map(|l| {
                    claimed.insert(l.id);
                    l.id
                })
                .unwrap_or_else(Uuid::new_v4)
        });

        lessons.push(Lesson {
            id,
            learning_path_id: path_id,
            position: idx as i32,
            title: non_blank(input.title).unwrap_or(content.title),
            content_type: input.content_type,
            content_id: input.content_id,
        });
    }
    Ok(lessons)
}

fn check_publishable(status: ContentStatus, lesson_count: usize) -> Result<(), ApiError> {
    if status == ContentStatus::Published && lesson_count == 0 {
        return Err(ApiError::BadRequest(
            "A published learning path needs at least one lesson".to_string(),
        ));
    }
    Ok(())
}

/// create_learning_path
///
/// [Admin Route] Creates a learning path. `enforce_order` defaults to `true`.
#[utoipa::path(
    post,
    path = "/api/admin/learning-paths",
    tag = "learning_paths",
    request_body = CreateLearningPathRequest,
    responses(
        (status = 201, description = "Learning path created", body = ApiResponse<LearningPath>),
        (status = 400, description = "Invalid lesson", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_learning_path(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateLearningPathRequest>,
) -> CreatedResult<LearningPath> {
    let org = auth.require_admin()?;
    payload.validate()?;

    let id = Uuid::new_v4();
    let lessons = build_lessons(&state.repo, org, id, payload.lessons, &[]).await?;
    let status = payload.status.unwrap_or_default();
    check_publishable(status, lessons.len())?;

    let now = Utc::now();
    let path = state
        .repo
        .create_learning_path(LearningPath {
            id,
            organization_id: org,
            title: payload.title.trim().to_string(),
            description: non_blank(payload.description),
            enforce_order: payload.enforce_order.unwrap_or(true),
            status,
            created_by: auth.id,
            created_at: now,
            updated_at: now,
            lessons,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "learning_path",
            "created",
            Some(path.id),
            json!({ "title": path.title, "lessons": path.lessons.len() }),
        ),
    )
    .await;

    created("Learning path created", path)
}

/// list_learning_paths
#[utoipa::path(
    get,
    path = "/api/admin/learning-paths",
    tag = "learning_paths",
    params(PageQuery),
    responses((status = 200, description = "Learning paths", body = ApiResponse<Vec<LearningPath>>))
)]
pub async fn list_learning_paths(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<LearningPath>> {
    let org = auth.require_admin()?;
    let (paths, total) = state.repo.list_learning_paths(org, &q).await?;
    Ok(Json(ApiResponse::paginated(
        "Learning paths retrieved",
        paths,
        Pagination::new(&q, total),
    )))
}

/// get_learning_path
#[utoipa::path(
    get,
    path = "/api/admin/learning-paths/{id}",
    tag = "learning_paths",
    params(("id" = Uuid, Path, description = "Learning path id")),
    responses(
        (status = 200, description = "Learning path", body = ApiResponse<LearningPath>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_learning_path(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<LearningPath> {
    let org = auth.require_admin()?;
    let path = state.repo.get_learning_path(org, id).await?;
    Ok(Json(ApiResponse::ok("Learning path retrieved", path)))
}

/// update_learning_path
///
/// [Admin Route] Partial update. A `lessons` array replaces the lesson list; kept
/// lessons retain their ids, and learners' completed lessons that no longer exist
/// stop counting at their next completion.
#[utoipa::path(
    put,
    path = "/api/admin/learning-paths/{id}",
    tag = "learning_paths",
    params(("id" = Uuid, Path, description = "Learning path id")),
    request_body = UpdateLearningPathRequest,
    responses((status = 200, description = "Learning path updated", body = ApiResponse<LearningPath>))
)]
pub async fn update_learning_path(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLearningPathRequest>,
) -> ApiResult<LearningPath> {
    let org = auth.require_admin()?;
    payload.validate()?;
    let current = state.repo.get_learning_path(org, id).await?;

    let lessons = match payload.lessons {
        Some(inputs) => Some(build_lessons(&state.repo, org, id, inputs, &current.lessons).await?),
        None => None,
    };
    check_publishable(
        payload.status.unwrap_or(current.status),
        lessons.as_ref().map_or(current.lessons.len(), Vec::len),
    )?;

    let details = json!({
        "title": payload.title,
        "status": payload.status,
        "enforce_order": payload.enforce_order,
        "lessons_replaced": lessons.as_ref().map(Vec::len),
    });
    let changes = LearningPathChanges {
        title: payload.title.map(|t| t.trim().to_string()),
        description: payload.description,
        enforce_order: payload.enforce_order,
        status: payload.status,
        lessons,
    };
    let path = state.repo.update_learning_path(org, id, changes).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "learning_path",
            "updated",
            Some(id),
            details,
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Learning path updated", path)))
}

/// delete_learning_path
#[utoipa::path(
    delete,
    path = "/api/admin/learning-paths/{id}",
    tag = "learning_paths",
    params(("id" = Uuid, Path, description = "Learning path id")),
    responses((status = 200, description = "Learning path deleted"))
)]
pub async fn delete_learning_path(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let path = state.repo.get_learning_path(org, id).await?;
    state.repo.delete_learning_path(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "learning_path",
            "deleted",
            Some(id),
            json!({ "title": path.title }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Learning path deleted")))
}
