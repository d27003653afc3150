use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{ContentType, ProgressStatus};

/// Assignment
///
/// Associates one piece of content with a set of users. The per-user state lives in
/// `UserContentProgress`; the counters are computed from those rows.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Assignment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    /// Title captured at assignment time.
    pub content_title: String,
    pub assigned_by: Uuid,
    #[ts(type = "string | null")]
    pub due_date: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub total_users: i64,
    #[sqlx(default)]
    pub completed_users: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAssignmentRequest {
    pub content_type: ContentType,
    pub content_id: Uuid,
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
    /// Members of these teams and of their sub-teams are assigned.
    #[serde(default)]
    pub team_ids: Vec<Uuid>,
    #[ts(type = "string | null")]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAssignmentRequest {
    /// `null` clears the due date.
    #[ts(type = "string | null")]
    pub due_date: Option<DateTime<Utc>>,
}

/// AssignmentResult
///
/// Output of `POST /api/admin/assignments`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignmentResult {
    pub assignment: Assignment,
    pub assigned: usize,
    /// Users skipped because they already hold an open record for this content.
    pub skipped_user_ids: Vec<Uuid>,
}

/// AssignmentDetail
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignmentDetail {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub progress: Vec<ProgressWithUser>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AssignmentFilter {
    pub content_type: Option<ContentType>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ProgressExportFilter {
    pub assignment_id: Option<Uuid>,
}

/// UserContentProgress
///
/// Per-user tracking record of an assignment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UserContentProgress {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub assignment_id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub content_title: String,
    pub status: ProgressStatus,
    /// 0-100.
    pub progress_percent: i32,
    /// Completed lesson ids (learning paths only).
    pub completed_lessons: Vec<Uuid>,
    /// Best assessment score, percent.
    pub score: Option<i32>,
    pub attempts: i32,
    #[ts(type = "string | null")]
    pub due_date: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub started_at: Option<DateTime<Utc>>,
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl UserContentProgress {
    /// Fresh `not_started` record for `user_id` under `assignment`.
    pub fn for_assignment(assignment: &Assignment, user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: assignment.organization_id,
            user_id,
            assignment_id: assignment.id,
            content_type: assignment.content_type,
            content_id: assignment.content_id,
            content_title: assignment.content_title.clone(),
            status: ProgressStatus::NotStarted,
            progress_percent: 0,
            completed_lessons: Vec::new(),
            score: None,
            attempts: 0,
            due_date: assignment.due_date,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Past the due date and not yet completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != ProgressStatus::Completed && self.due_date.is_some_and(|due| due < now)
    }
}

/// ProgressWithUser
///
/// Progress row joined with the learner's identity, used in admin reports.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ProgressWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub progress: UserContentProgress,
    pub user_name: String,
    pub user_email: String,
}

/// MyAssignment
///
/// Learner-facing listing row.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MyAssignment {
    #[serde(flatten)]
    pub progress: UserContentProgress,
    pub overdue: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct MyAssignmentFilter {
    pub status: Option<ProgressStatus>,
}
