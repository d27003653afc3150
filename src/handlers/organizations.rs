use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, record_activity, users::build_new_user};
use crate::{
    AppState,
    analytics,
    auth::AuthUser,
    error::ApiError,
    models::{
        ActivityFilter, ActivityLog, CreateAdminRequest, CreateOrganizationRequest, Organization,
        PlatformDashboard, Role, UpdateOrganizationRequest, User, slugify,
    },
    response::{ApiResponse, PageQuery, Pagination},
};

fn normalize_slug(raw: &str) -> Result<String, ApiError> {
    let slug = slugify(raw);
    if slug.is_empty() {
        return Err(ApiError::BadRequest(
            "Slug must contain at least one letter or digit".to_string(),
        ));
    }
    Ok(slug)
}

/// create_organization
///
/// [Global Admin Route] Creates a tenant. The slug is derived from the name unless
/// one is supplied; either way it is normalized and must be unique (409).
#[utoipa::path(
    post,
    path = "/api/globalAdmin/organizations",
    tag = "organizations",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = ApiResponse<Organization>),
        (status = 409, description = "Slug already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationRequest>,
) -> CreatedResult<Organization> {
    auth.require_global_admin()?;
    payload.validate()?;

    let slug = normalize_slug(payload.slug.as_deref().unwrap_or(&payload.name))?;
    let now = Utc::now();
    let org = state
        .repo
        .create_organization(Organization {
            id: Uuid::new_v4(),
            name: payload.name.trim().to_string(),
            slug,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org.id),
            Some(auth.id),
            "organization",
            "created",
            Some(org.id),
            json!({ "name": org.name, "slug": org.slug }),
        ),
    )
    .await;
    tracing::info!(org_id = %org.id, slug = %org.slug, "organization created");

    created("Organization created", org)
}

/// list_organizations
///
/// [Global Admin Route] Paginated listing, `search` matches name and slug.
#[utoipa::path(
    get,
    path = "/api/globalAdmin/organizations",
    tag = "organizations",
    params(PageQuery),
    responses((status = 200, description = "Organizations", body = ApiResponse<Vec<Organization>>))
)]
pub async fn list_organizations(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<Organization>> {
    auth.require_global_admin()?;
    let (orgs, total) = state.repo.list_organizations(&q).await?;
    Ok(Json(ApiResponse::paginated(
        "Organizations retrieved",
        orgs,
        Pagination::new(&q, total),
    )))
}

/// get_organization
#[utoipa::path(
    get,
    path = "/api/globalAdmin/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization", body = ApiResponse<Organization>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Organization> {
    auth.require_global_admin()?;
    let org = state.repo.get_organization(id).await?;
    Ok(Json(ApiResponse::ok("Organization retrieved", org)))
}

/// update_organization
///
/// [Global Admin Route] Partial update. Deactivating an organization blocks every
/// login of its members; existing sessions end at the next refresh.
#[utoipa::path(
    put,
    path = "/api/globalAdmin/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = UpdateOrganizationRequest,
    responses((status = 200, description = "Organization updated", body = ApiResponse<Organization>))
)]
pub async fn update_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateOrganizationRequest>,
) -> ApiResult<Organization> {
    auth.require_global_admin()?;
    payload.validate()?;

    if let Some(slug) = payload.slug.take() {
        payload.slug = Some(normalize_slug(&slug)?);
    }
    payload.name = payload.name.map(|n| n.trim().to_string());
    let details = serde_json::to_value(&payload).unwrap_or_default();

    let org = state.repo.update_organization(id, payload).await?;
    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org.id),
            Some(auth.id),
            "organization",
            "updated",
            Some(org.id),
            details,
        ),
    )
    .await;

    Ok(Json(ApiResponse::ok("Organization updated", org)))
}

/// delete_organization
///
/// [Global Admin Route] Removes the organization with every user, team, content item,
/// assignment and progress record it owns.
#[utoipa::path(
    delete,
    path = "/api/globalAdmin/organizations/{id}",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_organization(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    auth.require_global_admin()?;
    let org = state.repo.get_organization(id).await?;
    state.repo.delete_organization(id).await?;

    // Org-scoped entries were removed with the organization.
    record_activity(
        &state.repo,
        ActivityLog::new(
            None,
            Some(auth.id),
            "organization",
            "deleted",
            Some(id),
            json!({ "name": org.name, "slug": org.slug }),
        ),
    )
    .await;
    tracing::warn!(org_id = %id, "organization deleted");

    Ok(Json(ApiResponse::message_only("Organization deleted")))
}

/// create_org_admin
///
/// [Global Admin Route] Creates an `admin` user inside the organization.
#[utoipa::path(
    post,
    path = "/api/globalAdmin/organizations/{id}/admins",
    tag = "organizations",
    params(("id" = Uuid, Path, description = "Organization id")),
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created", body = ApiResponse<User>),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_org_admin(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateAdminRequest>,
) -> CreatedResult<User> {
    auth.require_global_admin()?;
    payload.validate()?;
    let org = state.repo.get_organization(id).await?;

    let new_user = build_new_user(
        org.id,
        &payload.name,
        &payload.email,
        &payload.password,
        Role::Admin,
        Vec::new(),
    )?;
    let record = state.repo.create_user(new_user).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org.id),
            Some(auth.id),
            "user",
            "created",
            Some(record.id),
            json!({ "email": record.email, "role": Role::Admin }),
        ),
    )
    .await;

    created("Admin created", User::from_record(record, Vec::new()))
}

/// platform_dashboard
///
/// [Global Admin Route] Platform-wide totals.
#[utoipa::path(
    get,
    path = "/api/globalAdmin/dashboard",
    tag = "organizations",
    responses((status = 200, description = "Platform totals", body = ApiResponse<PlatformDashboard>))
)]
pub async fn platform_dashboard(
    auth: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<PlatformDashboard> {
    auth.require_global_admin()?;
    let counts = state.repo.platform_counts().await?;
    Ok(Json(ApiResponse::ok(
        "Dashboard retrieved",
        analytics::platform_dashboard(counts),
    )))
}

/// list_all_activity
///
/// [Global Admin Route] Activity of every organization, newest first.
#[utoipa::path(
    get,
    path = "/api/globalAdmin/activity",
    tag = "organizations",
    params(PageQuery, ActivityFilter),
    responses((status = 200, description = "Activity entries", body = ApiResponse<Vec<ActivityLog>>))
)]
pub async fn list_all_activity(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<ActivityLog>> {
    auth.require_global_admin()?;
    let (entries, total) = state
        .repo
        .list_activity(None, &q, filter.entity_type)
        .await?;
    Ok(Json(ApiResponse::paginated(
        "Activity retrieved",
        entries,
        Pagination::new(&q, total),
    )))
}
