use axum::{Json, extract::State};
use chrono::Utc;

use super::ApiResult;
use crate::{
    AppState,
    analytics,
    auth::AuthUser,
    models::OrgDashboard,
    response::{ApiResponse, PageQuery},
};

/// Entries shown in the dashboard's activity feed.
const RECENT_ACTIVITY: u32 = 5;

/// org_dashboard
///
/// [Admin Route] Counters, progress by status and content type, overdue records,
/// completion rate, average assessment score and the latest activity.
#[utoipa::path(
    get,
    path = "/api/admin/dashboard",
    tag = "analytics",
    responses((status = 200, description = "Dashboard", body = ApiResponse<OrgDashboard>))
)]
pub async fn org_dashboard(auth: AuthUser, State(state): State<AppState>) -> ApiResult<OrgDashboard> {
    let org = auth.require_admin()?;

    let counts = state.repo.org_counts(org).await?;
    let records = state.repo.org_progress(org).await?;
    let latest = PageQuery {
        page: Some(1),
        limit: Some(RECENT_ACTIVITY),
        search: None,
    };
    let (recent_activity, _) = state.repo.list_activity(Some(org), &latest, None).await?;

    let dashboard = analytics::org_dashboard(counts, &records, recent_activity, Utc::now());
    Ok(Json(ApiResponse::ok("Dashboard retrieved", dashboard)))
}
