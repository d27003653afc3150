use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Team
///
/// A group of users inside an organization. A team with `parent_team_id` is a
/// sub-team; nesting stops at one level.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Team {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub parent_team_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    /// Inactive teams keep their members but cannot receive assignments or new members.
    pub is_active: bool,
    /// Loaded via a sub-select on `team_members`.
    #[sqlx(default)]
    pub member_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// TeamDetail
///
/// Output of `GET /api/admin/teams/{id}`: the team plus its direct sub-teams.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub sub_teams: Vec<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateTeamRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub parent_team_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateTeamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TeamMembersRequest {
    pub user_ids: Vec<Uuid>,
}
