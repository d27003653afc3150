use axum::{
    Json,
    extract::{Query, State},
};

use super::ApiResult;
use crate::{
    AppState,
    auth::AuthUser,
    models::{ActivityFilter, ActivityLog},
    response::{ApiResponse, PageQuery, Pagination},
};

/// list_activity
///
/// [Admin Route] The organization's audit trail, newest first. `entity_type`
/// narrows it to one kind of record (`user`, `team`, `assignment`, `progress`, ...).
#[utoipa::path(
    get,
    path = "/api/admin/activity",
    tag = "activity",
    params(PageQuery, ActivityFilter),
    responses((status = 200, description = "Activity entries", body = ApiResponse<Vec<ActivityLog>>))
)]
pub async fn list_activity(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<ActivityLog>> {
    let org = auth.require_admin()?;
    let entity_type = filter
        .entity_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let (entries, total) = state.repo.list_activity(Some(org), &q, entity_type).await?;
    Ok(Json(ApiResponse::paginated(
        "Activity retrieved",
        entries,
        Pagination::new(&q, total),
    )))
}
