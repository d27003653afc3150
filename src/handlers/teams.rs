use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, missing_reference, non_blank, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        ActivityLog, CreateTeamRequest, Team, TeamDetail, TeamMembersRequest, UpdateTeamRequest,
        User,
    },
    response::{ApiResponse, PageQuery, Pagination},
};

/// create_team
///
/// [Admin Route] Creates a team, or a sub-team when `parent_team_id` is set. Nesting
/// stops at one level: the parent must be a top-level team.
#[utoipa::path(
    post,
    path = "/api/admin/teams",
    tag = "teams",
    request_body = CreateTeamRequest,
    responses(
        (status = 201, description = "Team created", body = ApiResponse<Team>),
        (status = 409, description = "Name already used under this parent", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_team(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTeamRequest>,
) -> CreatedResult<Team> {
    let org = auth.require_admin()?;
    payload.validate()?;

    if let Some(parent_id) = payload.parent_team_id {
        let parent = state.repo.get_team(org, parent_id).await.map_err(|e| {
            missing_reference(e, format!("Parent team {parent_id} does not exist"))
        })?;
        if parent.parent_team_id.is_some() {
            return Err(ApiError::BadRequest(
                "Sub-teams cannot have sub-teams of their own".to_string(),
            ));
        }
    }

    let now = Utc::now();
    let team = state
        .repo
        .create_team(Team {
            id: Uuid::new_v4(),
            organization_id: org,
            parent_team_id: payload.parent_team_id,
            name: payload.name.trim().to_string(),
            description: non_blank(payload.description),
            is_active: true,
            member_count: 0,
            created_at: now,
            updated_at: now,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "team",
            "created",
            Some(team.id),
            json!({ "name": team.name, "parent_team_id": team.parent_team_id }),
        ),
    )
    .await;

    created("Team created", team)
}

/// list_teams
///
/// [Admin Route] Teams and sub-teams with their member counts.
#[utoipa::path(
    get,
    path = "/api/admin/teams",
    tag = "teams",
    params(PageQuery),
    responses((status = 200, description = "Teams", body = ApiResponse<Vec<Team>>))
)]
pub async fn list_teams(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<Team>> {
    let org = auth.require_admin()?;
    let (teams, total) = state.repo.list_teams(org, &q).await?;
    Ok(Json(ApiResponse::paginated(
        "Teams retrieved",
        teams,
        Pagination::new(&q, total),
    )))
}

/// get_team
///
/// [Admin Route] The team with its direct sub-teams.
#[utoipa::path(
    get,
    path = "/api/admin/teams/{id}",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Team id")),
    responses(
        (status = 200, description = "Team", body = ApiResponse<TeamDetail>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_team(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TeamDetail> {
    let org = auth.require_admin()?;
    let team = state.repo.get_team(org, id).await?;
    let sub_teams = state.repo.sub_teams(org, id).await?;
    Ok(Json(ApiResponse::ok(
        "Team retrieved",
        TeamDetail { team, sub_teams },
    )))
}

/// update_team
#[utoipa::path(
    put,
    path = "/api/admin/teams/{id}",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Team id")),
    request_body = UpdateTeamRequest,
    responses((status = 200, description = "Team updated", body = ApiResponse<Team>))
)]
pub async fn update_team(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateTeamRequest>,
) -> ApiResult<Team> {
    let org = auth.require_admin()?;
    payload.validate()?;
    payload.name = payload.name.map(|n| n.trim().to_string());

    let details = serde_json::to_value(&payload).unwrap_or_default();
    let team = state.repo.update_team(org, id, payload).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(Some(org), Some(auth.id), "team", "updated", Some(id), details),
    )
    .await;

    Ok(Json(ApiResponse::ok("Team updated", team)))
}

/// delete_team
///
/// [Admin Route] Removes the team, its sub-teams and their memberships. Progress
/// records already created from team assignments are kept.
#[utoipa::path(
    delete,
    path = "/api/admin/teams/{id}",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Team id")),
    responses((status = 200, description = "Team deleted"))
)]
pub async fn delete_team(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let team = state.repo.get_team(org, id).await?;
    state.repo.delete_team(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "team",
            "deleted",
            Some(id),
            json!({ "name": team.name }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Team deleted")))
}

/// list_team_members
#[utoipa::path(
    get,
    path = "/api/admin/teams/{id}/members",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Team id")),
    responses((status = 200, description = "Members", body = ApiResponse<Vec<User>>))
)]
pub async fn list_team_members(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<User>> {
    let org = auth.require_admin()?;
    let team = state.repo.get_team(org, id).await?;
    let records = state.repo.team_members(team.id).await?;
    let members = super::users::with_team_ids(&state.repo, records).await?;
    Ok(Json(ApiResponse::ok("Members retrieved", members)))
}

/// add_team_members
///
/// [Admin Route] Adds users to an active team. Users must belong to the
/// organization; existing memberships are left as they are.
#[utoipa::path(
    post,
    path = "/api/admin/teams/{id}/members",
    tag = "teams",
    params(("id" = Uuid, Path, description = "Team id")),
    request_body = TeamMembersRequest,
    responses(
        (status = 200, description = "Members added", body = ApiResponse<Team>),
        (status = 400, description = "Inactive team or unknown user", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_team_members(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TeamMembersRequest>,
) -> ApiResult<Team> {
    let org = auth.require_admin()?;
    let team = state.repo.get_team(org, id).await?;
    if !team.is_active {
        return Err(ApiError::BadRequest(format!(
            "Team '{}' is inactive",
            team.name
        )));
    }
    if payload.user_ids.is_empty() {
        return Err(ApiError::BadRequest("user_ids must not be empty".to_string()));
    }
    for user_id in &payload.user_ids {
        state.repo.get_org_user(org, *user_id).await.map_err(|e| {
            missing_reference(e, format!("User {user_id} is not in this organization"))
        })?;
    }

    let added = state.repo.add_team_members(id, &payload.user_ids).await?;
    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "team",
            "members_added",
            Some(id),
            json!({ "user_ids": payload.user_ids, "added": added }),
        ),
    )
    .await;

    let team = state.repo.get_team(org, id).await?;
    Ok(Json(ApiResponse::ok(
        format!("{added} member(s) added"),
        team,
    )))
}

/// remove_team_member
#[utoipa::path(
    delete,
    path = "/api/admin/teams/{id}/members/{user_id}",
    tag = "teams",
    params(
        ("id" = Uuid, Path, description = "Team id"),
        ("user_id" = Uuid, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Member removed"),
        (status = 404, description = "Not a member", body = crate::error::ErrorResponse)
    )
)]
pub async fn remove_team_member(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    state.repo.get_team(org, id).await?;
    state.repo.remove_team_member(id, user_id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "team",
            "member_removed",
            Some(id),
            json!({ "user_id": user_id }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Member removed")))
}
