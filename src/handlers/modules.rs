use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, non_blank, read_file_field, record_activity};
use crate::{
    AppState,
    auth::AuthUser,
    error::ApiError,
    models::{
        ActivityLog, CreateModuleRequest, ModuleFilter, PresignedUrlRequest, PresignedUrlResponse,
        TrainingModule, UpdateModuleRequest,
    },
    response::{ApiResponse, PageQuery, Pagination},
    storage::extension_of,
};

/// Largest module resource accepted through the API (100 MB). Bigger files go
/// through a presigned URL.
pub const MAX_RESOURCE_BYTES: usize = 100 * 1024 * 1024;

fn resource_key(org: Uuid, filename: &str) -> String {
    format!("modules/{org}/{}.{}", Uuid::new_v4(), extension_of(filename))
}

/// create_module
#[utoipa::path(
    post,
    path = "/api/admin/modules",
    tag = "modules",
    request_body = CreateModuleRequest,
    responses(
        (status = 201, description = "Module created", body = ApiResponse<TrainingModule>),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_module(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateModuleRequest>,
) -> CreatedResult<TrainingModule> {
    let org = auth.require_admin()?;
    payload.validate()?;

    let now = Utc::now();
    let module = state
        .repo
        .create_module(TrainingModule {
            id: Uuid::new_v4(),
            organization_id: org,
            title: payload.title.trim().to_string(),
            description: non_blank(payload.description),
            content: payload.content,
            resource_key: None,
            duration_minutes: payload.duration_minutes.unwrap_or(0),
            status: payload.status.unwrap_or_default(),
            created_by: auth.id,
            created_at: now,
            updated_at: now,
        })
        .await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "module",
            "created",
            Some(module.id),
            json!({ "title": module.title, "status": module.status }),
        ),
    )
    .await;

    created("Module created", module)
}

/// list_modules
///
/// [Admin Route] Paginated listing; `search` matches title and description,
/// `status` narrows to one publishing state.
#[utoipa::path(
    get,
    path = "/api/admin/modules",
    tag = "modules",
    params(PageQuery, ModuleFilter),
    responses((status = 200, description = "Modules", body = ApiResponse<Vec<TrainingModule>>))
)]
pub async fn list_modules(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
    Query(filter): Query<ModuleFilter>,
) -> ApiResult<Vec<TrainingModule>> {
    let org = auth.require_admin()?;
    let (modules, total) = state.repo.list_modules(org, &q, filter.status).await?;
    Ok(Json(ApiResponse::paginated(
        "Modules retrieved",
        modules,
        Pagination::new(&q, total),
    )))
}

/// get_module
#[utoipa::path(
    get,
    path = "/api/admin/modules/{id}",
    tag = "modules",
    params(("id" = Uuid, Path, description = "Module id")),
    responses(
        (status = 200, description = "Module", body = ApiResponse<TrainingModule>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_module(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TrainingModule> {
    let org = auth.require_admin()?;
    let module = state.repo.get_module(org, id).await?;
    Ok(Json(ApiResponse::ok("Module retrieved", module)))
}

/// update_module
#[utoipa::path(
    put,
    path = "/api/admin/modules/{id}",
    tag = "modules",
    params(("id" = Uuid, Path, description = "Module id")),
    request_body = UpdateModuleRequest,
    responses((status = 200, description = "Module updated", body = ApiResponse<TrainingModule>))
)]
pub async fn update_module(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateModuleRequest>,
) -> ApiResult<TrainingModule> {
    let org = auth.require_admin()?;
    payload.validate()?;
    payload.title = payload.title.map(|t| t.trim().to_string());
    let resource_key = payload.resource_key.take();
    if let Some(key) = &resource_key
        && !key.starts_with(&format!("modules/{org}/"))
    {
        return Err(ApiError::BadRequest(
            "resource_key does not belong to this organization".to_string(),
        ));
    }

    let details = serde_json::to_value(&payload).unwrap_or_default();
    let mut module = state.repo.update_module(org, id, payload).await?;
    if let Some(key) = &resource_key {
        module = state.repo.set_module_resource(org, id, key).await?;
    }

    record_activity(
        &state.repo,
        ActivityLog::new(Some(org), Some(auth.id), "module", "updated", Some(id), details),
    )
    .await;

    Ok(Json(ApiResponse::ok("Module updated", module)))
}

/// delete_module
///
/// [Admin Route] Removes the module together with its assignments and their progress
/// records. Learning path lessons pointing at it are dropped and the remaining
/// lessons renumbered.
#[utoipa::path(
    delete,
    path = "/api/admin/modules/{id}",
    tag = "modules",
    params(("id" = Uuid, Path, description = "Module id")),
    responses(
        (status = 200, description = "Module deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_module(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    let module = state.repo.get_module(org, id).await?;
    state.repo.delete_module(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "module",
            "deleted",
            Some(id),
            json!({ "title": module.title }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("Module deleted")))
}

/// upload_module_resource
///
/// [Admin Route] Uploads the module's attached file (multipart field `file`) to
/// object storage and stores the resulting key on the module.
#[utoipa::path(
    post,
    path = "/api/admin/modules/{id}/resource",
    tag = "modules",
    params(("id" = Uuid, Path, description = "Module id")),
    request_body(content_type = "multipart/form-data", description = "Resource file in field `file`"),
    responses(
        (status = 200, description = "Resource stored", body = ApiResponse<TrainingModule>),
        (status = 400, description = "Missing or oversized file", body = crate::error::ErrorResponse)
    )
)]
pub async fn upload_module_resource(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<TrainingModule> {
    let org = auth.require_admin()?;
    state.repo.get_module(org, id).await?;

    let file = read_file_field(multipart).await?;
    if file.bytes.len() > MAX_RESOURCE_BYTES {
        return Err(ApiError::BadRequest("Resource file is too large".to_string()));
    }

    let key = resource_key(org, &file.filename);
    let size = file.bytes.len();
    state
        .storage
        .put_object(&key, &file.content_type, file.bytes)
        .await?;
    let module = state.repo.set_module_resource(org, id, &key).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "module",
            "resource_uploaded",
            Some(id),
            json!({ "resource_key": key, "filename": file.filename, "bytes": size }),
        ),
    )
    .await;
    tracing::info!(module_id = %id, %key, bytes = size, "module resource uploaded");

    Ok(Json(ApiResponse::ok("Resource uploaded", module)))
}

/// get_presigned_url
///
/// [Admin Route] Generates a time-limited S3 upload URL so large files can go
/// straight to storage. Once the upload is done, the returned `resource_key` is
/// attached with `PUT /api/admin/modules/{id}`.
#[utoipa::path(
    post,
    path = "/api/admin/uploads/presigned",
    tag = "modules",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "Upload URL generated", body = ApiResponse<PresignedUrlResponse>),
        (status = 500, description = "Storage unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_presigned_url(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> ApiResult<PresignedUrlResponse> {
    let org = auth.require_admin()?;
    if payload.file_type.trim().is_empty() {
        return Err(ApiError::BadRequest("file_type is required".to_string()));
    }

    let key = resource_key(org, &payload.filename);
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &payload.file_type)
        .await?;

    Ok(Json(ApiResponse::ok(
        "Upload URL generated",
        PresignedUrlResponse {
            upload_url,
            resource_key: key,
        },
    )))
}
