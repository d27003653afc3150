use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use super::{ApiResult, CreatedResult, created, lookup_content, missing_reference, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    csv::CsvWriter,
    error::ApiError,
    models::{
        ActivityLog, Assignment, AssignmentDetail, AssignmentFilter, AssignmentResult,
        ContentStatus, CreateAssignmentRequest, ProgressExportFilter, UpdateAssignmentRequest,
        UserContentProgress,
    },
    repository::RepositoryState,
    response::{ApiResponse, CsvFile, PageQuery, Pagination},
};

fn check_due_date(due_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<(), ApiError> {
    if due_date.is_some_and(|due| due <= now) {
        return Err(ApiError::BadRequest(
            "due_date must be in the future".to_string(),
        ));
    }
    Ok(())
}

/// resolve_targets
///
/// Expands the request into distinct user ids, in request order: explicit users
/// first, then members of each team and of its active sub-teams.
async fn resolve_targets(
    repo: &RepositoryState,
    org: Uuid,
    user_ids: &[Uuid],
    team_ids: &[Uuid],
) -> Result<Vec<Uuid>, ApiError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for user_id in user_ids {
        let user = repo.get_org_user(org, *user_id).await.map_err(|e| {
            missing_reference(e, format!("User {user_id} is not in this organization"))
        })?;
        if !user.is_active {
            return Err(ApiError::BadRequest(format!(
                "User '{}' is deactivated",
                user.email
            )));
        }
        if seen.insert(user.id) {
            targets.push(user.id);
        }
    }

    let mut expanded_teams = Vec::new();
    for team_id in team_ids {
        let team = repo
            .get_team(org, *team_id)
            .await
            .map_err(|e| missing_reference(e, format!("Team {team_id} does not exist")))?;
        if !team.is_active {
            return Err(ApiError::BadRequest(format!(
                "Team '{}' is inactive and cannot receive assignments",
                team.name
            )));
        }
        expanded_teams.push(team.id);
        expanded_teams.extend(
            repo.sub_teams(org, team.id)
                .await?
                .into_iter()
                .filter(|sub| sub.is_active)
                .map(|sub| sub.id),
        );
    }
    if !expanded_teams.is_empty() {
        for user_id in repo.team_member_ids(&expanded_teams).await? {
            if seen.insert(user_id) {
                targets.push(user_id);
            }
        }
    }

    Ok(targets)
}

/// create_assignment
///
/// [Admin Route] Assigns published content to users and teams.
///
/// Team targets include the members of active sub-teams. The union is de-duplicated,
/// and users already holding an open (`not_started` / `in_progress`) record for the
/// same content are skipped and reported. One progress record is created per
/// remaining user, together with the assignment.
#[utoipa::path(
    post,
    path = "/api/admin/assignments",
    tag = "assignments",
    request_body = CreateAssignmentRequest,
    responses(
        (status = 201, description = "Assignment created", body = ApiResponse<AssignmentResult>),
        (status = 400, description = "Unpublished content, inactive team or no targets", body = crate::error::ErrorResponse),
        (status = 409, description = "Every target already has the content open", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_assignment(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> CreatedResult<AssignmentResult> {
    let org = auth.require_admin()?;
    let now = Utc::now();

    let content = lookup_content(&state.repo, org, payload.content_type, payload.content_id).await?;
    if content.status != ContentStatus::Published {
        return Err(ApiError::BadRequest(
            "Only published content can be assigned".to_string(),
        ));
    }
    check_due_date(payload.due_date, now)?;

    let targets = resolve_targets(&state.repo, org, &payload.user_ids, &payload.team_ids).await?;
    if targets.is_empty() {
        return Err(ApiError::BadRequest(
            "The assignment has no target users".to_string(),
        ));
    }

    let open: HashSet<Uuid> = state
        .repo
        .open_progress_user_ids(org, payload.content_type, payload.content_id)
        .await?
        .into_iter()
        .collect();
    let (skipped_user_ids, assignees): (Vec<Uuid>, Vec<Uuid>) =
        targets.into_iter().partition(|id| open.contains(id));
    if assignees.is_empty() {
        return Err(ApiError::Conflict(
            "Every target user already has this content assigned".to_string(),
        ));
    }

    let assignment = Assignment {
        id: Uuid::new_v4(),
        organization_id: org,
        content_type: payload.content_type,
        content_id: payload.content_id,
        content_title: content.title,
        assigned_by: auth.id,
        due_date: payload.due_date,
        total_users: 0,
        completed_users: 0,
        created_at: now,
        updated_at: now,
    };
    let progress = assignees
        .iter()
        .map(|user_id| UserContentProgress::for_assignment(&assignment, *user_id, now))
        .collect();
    let assignment = state.repo.create_assignment(assignment, progress).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assignment",
            "created",
            Some(assignment.id),
            json!({
                "content_type": assignment.content_type,
                "content_id": assignment.content_id,
                "assigned": assignees.len(),
                "skipped": skipped_user_ids.len(),
            }),
        ),
    )
    .await;
    tracing::info!(
        assignment_id = %assignment.id,
        content_type = %assignment.content_type,
        assigned = assignees.len(),
        skipped = skipped_user_ids.len(),
        "assignment created"
    );

    created(
        "Assignment created",
        AssignmentResult {
            assignment,
            assigned: assignees.len(),
            skipped_user_ids,
        },
    )
}

/// list_assignments
///
/// [Admin Route] Assignments with their target and completion counts, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/assignments",
    tag = "assignments",
    params(PageQuery, AssignmentFilter),
    responses((status = 200, description = "Assignments", body = ApiResponse<Vec<Assignment>>))
)]
pub async fn list_assignments(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
    Query(filter): Query<AssignmentFilter>,
) -> ApiResult<Vec<Assignment>> {
    let org = auth.require_admin()?;
    let (assignments, total) = state
        .repo
        .list_assignments(org, &q, filter.content_type)
        .await?;
    Ok(Json(ApiResponse::paginated(
        "Assignments retrieved",
        assignments,
        Pagination::new(&q, total),
    )))
}

/// get_assignment
///
/// [Admin Route] The assignment with every learner's progress.
#[utoipa::path(
    get,
    path = "/api/admin/assignments/{id}",
    tag = "assignments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Assignment", body = ApiResponse<AssignmentDetail>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_assignment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AssignmentDetail> {
    let org = auth.require_admin()?;
    let assignment = state.repo.get_assignment(org, id).await?;
    let progress = state.repo.assignment_progress(id).await?;
    Ok(Json(ApiResponse::ok(
        "Assignment retrieved",
        AssignmentDetail {
            assignment,
            progress,
        },
    )))
}

/// update_assignment
///
/// [Admin Route] Changes (or clears) the due date on the assignment and all of its
/// progress records.
#[utoipa::path(
    put,
    path = "/api/admin/assignments/{id}",
    tag = "assignments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    request_body = UpdateAssignmentRequest,
    responses((status = 200, description = "Assignment updated", body = ApiResponse<Assignment>))
)]
pub async fn update_assignment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAssignmentRequest>,
) -> ApiResult<Assignment> {
    let org = auth.require_admin()?;
    check_due_date(payload.due_date, Utc::now())?;

    let assignment = state
        .repo
        .update_assignment_due_date(org, id, payload.due_date)
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assignment",
            "updated",
            Some(id),
            json!({ "due_date": payload.due_date }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Assignment updated", assignment)))
}

/// delete_assignment
///
/// [Admin Route] Removes the assignment and its progress records.
#[utoipa::path(
    delete,
    path = "/api/admin/assignments/{id}",
    tag = "assignments",
    params(("id" = Uuid, Path, description = "Assignment id")),
    responses((status = 200, description = "Assignment deleted"))
)]
pub async fn delete_assignment(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let assignment = state.repo.get_assignment(org, id).await?;
    state.repo.delete_assignment(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "assignment",
            "deleted",
            Some(id),
            json!({
                "content_type": assignment.content_type,
                "content_title": assignment.content_title,
            }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Assignment deleted")))
}

fn opt_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.to_rfc3339()).unwrap_or_default()
}

/// export_progress
///
/// [Admin Route] Progress report as CSV, for the whole organization or one
/// assignment (`?assignment_id=`).
#[utoipa::path(
    get,
    path = "/api/admin/assignments/progress/export",
    tag = "assignments",
    params(ProgressExportFilter),
    responses((status = 200, description = "CSV file", content_type = "text/csv", body = String))
)]
pub async fn export_progress(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<ProgressExportFilter>,
) -> Result<CsvFile, ApiError> {
    let org = auth.require_admin()?;
    if let Some(assignment_id) = filter.assignment_id {
        state.repo.get_assignment(org, assignment_id).await?;
    }
    let rows = state.repo.export_progress(org, filter.assignment_id).await?;
    let now = Utc::now();

    let mut writer = CsvWriter::with_header(&[
        "user_email",
        "content_type",
        "content_title",
        "status",
        "progress_percent",
        "score",
        "due_date",
        "completed_at",
        "overdue",
    ]);
    for row in &rows {
        let p = &row.progress;
        writer.row(&[
            row.user_email.clone(),
            p.content_type.to_string(),
            p.content_title.clone(),
            p.status.to_string(),
            p.progress_percent.to_string(),
            p.score.map(|s| s.to_string()).unwrap_or_default(),
            opt_date(p.due_date),
            opt_date(p.completed_at),
            p.is_overdue(now).to_string(),
        ]);
    }

    let filename = match filter.assignment_id {
        Some(id) => format!("progress-{id}.csv"),
        None => "progress.csv".to_string(),
    };
    Ok(CsvFile {
        filename,
        body: writer.finish(),
    })
}
