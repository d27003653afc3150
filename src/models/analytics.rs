use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use super::{ActivityLog, ContentType};

/// OrgCounts
///
/// Raw counters read from the store for one organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct OrgCounts {
    pub total_users: i64,
    pub active_users: i64,
    pub teams: i64,
    pub modules: i64,
    pub assessments: i64,
    pub surveys: i64,
    pub learning_paths: i64,
    pub assignments: i64,
}

/// ProgressBreakdown
///
/// Progress records of one content type grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProgressBreakdown {
    pub content_type: Option<ContentType>,
    pub total: i64,
    pub not_started: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub overdue: i64,
    /// completed / total * 100, rounded to 2 decimals; 0 when there are no records.
    pub completion_rate: f64,
}

/// OrgDashboard
///
/// Output of `GET /api/admin/dashboard`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct OrgDashboard {
    pub counts: OrgCounts,
    pub progress: ProgressBreakdown,
    pub by_content_type: Vec<ProgressBreakdown>,
    /// Mean of the recorded assessment scores, `None` before the first submission.
    pub average_assessment_score: Option<f64>,
    pub recent_activity: Vec<ActivityLog>,
}

/// PlatformCounts
///
/// Output of `GET /api/globalAdmin/dashboard`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PlatformCounts {
    pub organizations: i64,
    pub active_organizations: i64,
    pub users: i64,
    pub content_items: i64,
    pub assignments: i64,
    pub progress_records: i64,
    pub completed_records: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PlatformDashboard {
    #[serde(flatten)]
    pub counts: PlatformCounts,
    pub completion_rate: f64,
}
