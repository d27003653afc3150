use std::collections::{HashMap, HashSet};

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, CreatedResult, created, read_csv_upload, record_activity};
use crate::{
    AppState,
    auth::{AuthUser, hash_password, validate_password_strength},
    csv::{self, CsvWriter, Header},
    error::ApiError,
    models::{
        ActivityLog, CreateUserRequest, ImportError, ImportReport, NewUser, Role, Team,
        UpdateUserRequest, User, UserChanges, UserRecord,
    },
    repository::RepositoryState,
    response::{ApiResponse, CsvFile, PageQuery, Pagination},
};

const IMPORT_COLUMNS: [&str; 3] = ["name", "email", "password"];

/// Data rows accepted by one user import.
pub const MAX_IMPORT_ROWS: usize = 1000;

/// build_new_user
///
/// Checks password strength and hashes it. Shared by admin creation and user
/// creation; CSV import hashes its rows in bulk through [`assemble_user`].
pub fn build_new_user(
    organization_id: Uuid,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
    team_ids: Vec<Uuid>,
) -> Result<NewUser, ApiError> {
    validate_password_strength(password).map_err(ApiError::BadRequest)?;
    Ok(assemble_user(
        organization_id,
        name,
        email,
        hash_password(password)?,
        role,
        team_ids,
    ))
}

fn assemble_user(
    organization_id: Uuid,
    name: &str,
    email: &str,
    password_hash: String,
    role: Role,
    team_ids: Vec<Uuid>,
) -> NewUser {
    let now = Utc::now();
    NewUser {
        record: UserRecord {
            id: Uuid::new_v4(),
            organization_id: Some(organization_id),
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
            password_hash,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
        team_ids,
    }
}

/// Organization admins manage `admin` and `user` accounts only.
fn check_assignable_role(role: Role) -> Result<Role, ApiError> {
    match role {
        Role::GlobalAdmin => Err(ApiError::BadRequest(
            "Role must be 'admin' or 'user'".to_string(),
        )),
        role => Ok(role),
    }
}

/// Every id must name an active team of `org`.
async fn check_team_ids(
    repo: &RepositoryState,
    org: Uuid,
    team_ids: &[Uuid],
) -> Result<Vec<Uuid>, ApiError> {
    if team_ids.is_empty() {
        return Ok(Vec::new());
    }
    let teams = repo.all_teams(org).await?;
    let mut unique = Vec::with_capacity(team_ids.len());
    for id in team_ids {
        let team = teams
            .iter()
            .find(|t| t.id == *id)
            .ok_or_else(|| ApiError::BadRequest(format!("Team {id} does not exist")))?;
        if !team.is_active {
            return Err(ApiError::BadRequest(format!(
                "Team '{}' is inactive",
                team.name
            )));
        }
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    Ok(unique)
}

/// Attaches team ids to each record, preserving order.
pub async fn with_team_ids(
    repo: &RepositoryState,
    records: Vec<UserRecord>,
) -> Result<Vec<User>, ApiError> {
    let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
    let mut memberships: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (user_id, team_id) in repo.user_team_ids(&ids).await? {
        memberships.entry(user_id).or_default().push(team_id);
    }
    Ok(records
        .into_iter()
        .map(|r| {
            let teams = memberships.remove(&r.id).unwrap_or_default();
            User::from_record(r, teams)
        })
        .collect())
}

async fn load_user(repo: &RepositoryState, org: Uuid, id: Uuid) -> Result<User, ApiError> {
    let record = repo.get_org_user(org, id).await?;
    let mut users = with_team_ids(repo, vec![record]).await?;
    users.pop().ok_or_else(|| ApiError::not_found("User"))
}

/// create_user
///
/// [Admin Route] Creates a user in the caller's organization, optionally placing it
/// in teams. Emails are unique across the platform (case-insensitive).
#[utoipa::path(
    post,
    path = "/api/admin/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = ApiResponse<User>),
        (status = 400, description = "Validation failed", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> CreatedResult<User> {
    let org = auth.require_admin()?;
    payload.validate()?;

    let role = check_assignable_role(payload.role.unwrap_or_default())?;
    let team_ids = check_team_ids(
        &state.repo,
        org,
        payload.team_ids.as_deref().unwrap_or_default(),
    )
    .await?;

    let new_user = build_new_user(
        org,
        &payload.name,
        &payload.email,
        &payload.password,
        role,
        team_ids.clone(),
    )?;
    let record = state.repo.create_user(new_user).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "user",
            "created",
            Some(record.id),
            json!({ "email": record.email, "role": record.role }),
        ),
    )
    .await;

    created("User created", User::from_record(record, team_ids))
}

/// list_users
///
/// [Admin Route] Paginated listing, `search` matches name and email.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    tag = "users",
    params(PageQuery),
    responses((status = 200, description = "Users", body = ApiResponse<Vec<User>>))
)]
pub async fn list_users(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Vec<User>> {
    let org = auth.require_admin()?;
    let (records, total) = state.repo.list_users(org, &q).await?;
    let users = with_team_ids(&state.repo, records).await?;
    Ok(Json(ApiResponse::paginated(
        "Users retrieved",
        users,
        Pagination::new(&q, total),
    )))
}

/// get_user
#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = ApiResponse<User>),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    let org = auth.require_admin()?;
    let user = load_user(&state.repo, org, id).await?;
    Ok(Json(ApiResponse::ok("User retrieved", user)))
}

/// update_user
///
/// [Admin Route] Partial update. A new password is strength-checked and re-hashed.
/// Admins cannot deactivate or demote themselves.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses((status = 200, description = "User updated", body = ApiResponse<User>))
)]
pub async fn update_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let org = auth.require_admin()?;
    payload.validate()?;

    if id == auth.id
        && (payload.is_active == Some(false) || payload.role.is_some_and(|r| r != Role::Admin))
    {
        return Err(ApiError::BadRequest(
            "You cannot deactivate or demote your own account".to_string(),
        ));
    }
    let role = payload.role.map(check_assignable_role).transpose()?;
    let password_hash = match payload.password.as_deref() {
        Some(password) => {
            validate_password_strength(password).map_err(ApiError::BadRequest)?;
            Some(hash_password(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        email: payload.email.map(|e| e.trim().to_lowercase()),
        role,
        is_active: payload.is_active,
        password_hash,
    };
    let details = json!({
        "name": changes.name,
        "email": changes.email,
        "role": changes.role,
        "is_active": changes.is_active,
        "password_changed": changes.password_hash.is_some(),
    });
    state.repo.update_user(org, id, changes).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(Some(org), Some(auth.id), "user", "updated", Some(id), details),
    )
    .await;

    let user = load_user(&state.repo, org, id).await?;
    Ok(Json(ApiResponse::ok("User updated", user)))
}

/// delete_user
///
/// [Admin Route] Removes the user with its memberships, progress records and
/// submissions.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    let org = auth.require_admin()?;
    if id == auth.id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }
    let user = state.repo.get_org_user(org, id).await?;
    state.repo.delete_user(org, id).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "user",
            "deleted",
            Some(id),
            json!({ "email": user.email }),
        ),
    )
    .await;

    Ok(Json(ApiResponse::message_only("User deleted")))
}

/// Resolves the `team` column by case-insensitive name.
fn team_by_name<'a>(teams: &'a [Team], name: &str) -> Result<&'a Team, String> {
    let mut matches = teams.iter().filter(|t| t.name.eq_ignore_ascii_case(name));
    match (matches.next(), matches.next()) {
        (None, _) => Err(format!("Team '{name}' does not exist")),
        (Some(_), Some(_)) => Err(format!("Team name '{name}' is ambiguous")),
        (Some(team), None) if !team.is_active => Err(format!("Team '{name}' is inactive")),
        (Some(team), None) => Ok(team),
    }
}

/// import_users
///
/// [Admin Route] Bulk creation from a CSV upload (multipart field `file`).
///
/// Header: `name,email,password,role,team` (`role` and `team` optional). Rows are
/// validated one by one; rows whose email already exists, in the organization or
/// earlier in the file, are counted as skipped. Files over [`MAX_IMPORT_ROWS`] rows
/// are rejected. Passwords are hashed off the async workers, then all valid rows
/// are inserted in a single transaction.
#[utoipa::path(
    post,
    path = "/api/admin/users/import",
    tag = "users",
    request_body(content_type = "multipart/form-data", description = "CSV file in field `file`"),
    responses(
        (status = 200, description = "Import report", body = ApiResponse<ImportReport>),
        (status = 400, description = "Malformed file", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_users(
    auth: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<ImportReport> {
    let org = auth.require_admin()?;
    let text = read_csv_upload(multipart).await?;

    let records = csv::parse(&text);
    if records.len() > MAX_IMPORT_ROWS + 1 {
        return Err(ApiError::BadRequest(format!(
            "The file has {} rows; at most {MAX_IMPORT_ROWS} can be imported at once",
            records.len() - 1
        )));
    }
    let mut records = records.into_iter();
    let header = records
        .next()
        .map(|r| Header::new(&r))
        .ok_or_else(|| ApiError::BadRequest("CSV file is empty".to_string()))?;
    let missing = header.missing(&IMPORT_COLUMNS);
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let teams = state.repo.all_teams(org).await?;
    let mut report = ImportReport::default();
    let mut seen_emails = HashSet::new();
    let mut accepted = Vec::new();

    for record in records {
        let row = CreateUserRequest {
            name: header.field(&record, "name").to_string(),
            email: header.field(&record, "email").to_lowercase(),
            password: header.field(&record, "password").to_string(),
            role: None,
            team_ids: None,
        };
        let fail = |message: String| ImportError {
            line: record.line,
            message,
        };

        if let Err(e) = row.validate() {
            report.errors.push(fail(format!("Validation failed: {e}")));
            continue;
        }
        let role = match Role::parse(header.field(&record, "role")) {
            Some(Role::GlobalAdmin) | None => {
                report
                    .errors
                    .push(fail("Role must be 'admin' or 'user'".to_string()));
                continue;
            }
            Some(role) => role,
        };
        let team_name = header.field(&record, "team");
        let team_ids = if team_name.is_empty() {
            Vec::new()
        } else {
            match team_by_name(&teams, team_name) {
                Ok(team) => vec![team.id],
                Err(message) => {
                    report.errors.push(fail(message));
                    continue;
                }
            }
        };

        if !seen_emails.insert(row.email.clone())
            || state.repo.get_user_by_email(&row.email).await?.is_some()
        {
            report.skipped += 1;
            continue;
        }

        if let Err(message) = validate_password_strength(&row.password) {
            report.errors.push(fail(message));
            continue;
        }
        accepted.push((row, role, team_ids));
    }

    let new_users = tokio::task::spawn_blocking(move || {
        accepted
            .into_iter()
            .map(|(row, role, team_ids)| {
                let hash = hash_password(&row.password)?;
                Ok(assemble_user(org, &row.name, &row.email, hash, role, team_ids))
            })
            .collect::<Result<Vec<_>, ApiError>>()
    })
    .await
    .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))??;

    report.created = state.repo.create_users(new_users).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            Some(org),
            Some(auth.id),
            "user",
            "imported",
            None,
            json!({
                "created": report.created,
                "skipped": report.skipped,
                "errors": report.errors.len(),
            }),
        ),
    )
    .await;
    tracing::info!(
        org_id = %org,
        created = report.created,
        skipped = report.skipped,
        errors = report.errors.len(),
        "user import finished"
    );

    Ok(Json(ApiResponse::ok("Import finished", report)))
}

/// export_users
///
/// [Admin Route] Every user of the organization as CSV. Team names are joined
/// with `;`.
#[utoipa::path(
    get,
    path = "/api/admin/users/export",
    tag = "users",
    responses((status = 200, description = "CSV file", content_type = "text/csv", body = String))
)]
pub async fn export_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<CsvFile, ApiError> {
    let org = auth.require_admin()?;
    let users = with_team_ids(&state.repo, state.repo.all_users(org).await?).await?;
    let team_names: HashMap<Uuid, String> = state
        .repo
        .all_teams(org)
        .await?
        .into_iter()
        .map(|t| (t.id, t.name))
        .collect();

    let mut writer = CsvWriter::with_header(&[
        "id",
        "name",
        "email",
        "role",
        "is_active",
        "teams",
        "created_at",
    ]);
    for user in &users {
        let teams = user
            .team_ids
            .iter()
            .filter_map(|id| team_names.get(id).map(String::as_str))
            .collect::<Vec<_>>()
            .join(";");
        writer.row(&[
            user.id.to_string(),
            user.name.clone(),
            user.email.clone(),
            user.role.to_string(),
            user.is_active.to_string(),
            teams,
            user.created_at.to_rfc3339(),
        ]);
    }

    Ok(CsvFile {
        filename: "users.csv".to_string(),
        body: writer.finish(),
    })
}
