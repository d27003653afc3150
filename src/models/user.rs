use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::Role;

/// UserRecord
///
/// Raw `users` row including the password hash. Internal only: it is what the
/// auth layer loads, and is never serialized into a response.
#[derive(Debug, Clone, FromRow, Default)]
pub struct UserRecord {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User
///
/// Public view of a user, enriched with the ids of the teams the user belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub team_ids: Vec<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_record(record: UserRecord, team_ids: Vec<Uuid>) -> Self {
        Self {
            id: record.id,
            organization_id: record.organization_id,
            name: record.name,
            email: record.email,
            role: record.role,
            is_active: record.is_active,
            team_ids,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// UserProfile
///
/// Output schema for `GET /api/user/me` and the login response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub organization_id: Option<Uuid>,
    pub organization_name: Option<String>,
    pub team_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    /// `admin` or `user`; defaults to `user`.
    pub role: Option<Role>,
    pub team_ids: Option<Vec<Uuid>>,
}

/// UpdateUserRequest
///
/// Partial update: only supplied fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// UserChanges
///
/// Repository-level partial update. Unlike `UpdateUserRequest` the password is
/// already hashed.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub password_hash: Option<String>,
}

/// NewUser
///
/// A validated user ready to be inserted together with its team memberships.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub record: UserRecord,
    pub team_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RefreshRequest {
    /// Fallback for clients that cannot send the `refreshToken` cookie.
    pub refresh_token: Option<String>,
}

/// SessionResponse
///
/// Returned by login and refresh. The tokens are also set as HttpOnly cookies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}
