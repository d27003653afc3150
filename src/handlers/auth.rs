use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use super::record_activity;
use crate::{
    AppState,
    auth::{
        REFRESH_COOKIE, TokenKind, clear_cookies, decode_token, issue_token_pair, read_cookie,
        session_cookies, verify_password,
    },
    error::ApiError,
    models::{ActivityLog, LoginRequest, RefreshRequest, SessionResponse, UserProfile, UserRecord},
    repository::{RepoError, RepositoryState},
    response::ApiResponse,
};

/// build_profile
///
/// Resolves the organization name and team names shown on the profile.
pub async fn build_profile(
    repo: &RepositoryState,
    user: &UserRecord,
) -> Result<UserProfile, ApiError> {
    let (organization_name, team_names) = match user.organization_id {
        Some(org) => {
            let organization = repo.get_organization(org).await?;
            let memberships = repo.user_team_ids(&[user.id]).await?;
            let team_names = repo
                .all_teams(org)
                .await?
                .into_iter()
                .filter(|t| memberships.iter().any(|(_, team_id)| *team_id == t.id))
                .map(|t| t.name)
                .collect();
            (Some(organization.name), team_names)
        }
        None => (None, Vec::new()),
    };

    Ok(UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        organization_id: user.organization_id,
        organization_name,
        team_names,
    })
}

/// Rejects deactivated users and members of deactivated organizations.
async fn ensure_can_sign_in(repo: &RepositoryState, user: &UserRecord) -> Result<(), ApiError> {
    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }
    if let Some(org) = user.organization_id
        && !repo.get_organization(org).await?.is_active
    {
        return Err(ApiError::Unauthorized(
            "Organization is deactivated".to_string(),
        ));
    }
    Ok(())
}

/// login
///
/// [Public Route] Exchanges email and password for a session. Both tokens are set
/// as HttpOnly cookies and also returned in the body for non-browser clients.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());
    let user = state
        .repo
        .get_user_by_email(&payload.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&payload.password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "login rejected: wrong password");
        return Err(invalid());
    }
    ensure_can_sign_in(&state.repo, &user).await?;

    let tokens = issue_token_pair(&user, &state.config)?;
    let profile = build_profile(&state.repo, &user).await?;

    record_activity(
        &state.repo,
        ActivityLog::new(
            user.organization_id,
            Some(user.id),
            "auth",
            "login",
            Some(user.id),
            json!({ "email": user.email }),
        ),
    )
    .await;
    tracing::info!(user_id = %user.id, role = %user.role, "user logged in");

    let cookies = session_cookies(&tokens, &state.config);
    let body = SessionResponse {
        user: profile,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    Ok((cookies, Json(ApiResponse::ok("Login successful", body))))
}

/// refresh
///
/// [Public Route] Issues a new token pair from the `refreshToken` cookie, or from
/// `refresh_token` in the JSON body when no cookie is sent.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body(content = RefreshRequest, description = "Optional when the cookie is present"),
    responses(
        (status = 200, description = "Session refreshed", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Invalid refresh token", body = crate::error::ErrorResponse)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = || {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|r| r.refresh_token)
    };
    let token = read_cookie(&headers, REFRESH_COOKIE)
        .or_else(from_body)
        .ok_or_else(|| ApiError::Unauthorized("Refresh token missing".to_string()))?;

    let claims = decode_token(&token, TokenKind::Refresh, &state.config)?;
    let user = match state.repo.get_user(claims.sub).await {
        Ok(user) => user,
        Err(RepoError::NotFound(_)) => {
            return Err(ApiError::Unauthorized("User no longer exists".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    ensure_can_sign_in(&state.repo, &user).await?;

    let tokens = issue_token_pair(&user, &state.config)?;
    let profile = build_profile(&state.repo, &user).await?;
    tracing::debug!(user_id = %user.id, "session refreshed");

    let cookies = session_cookies(&tokens, &state.config);
    let body = SessionResponse {
        user: profile,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };
    Ok((cookies, Json(ApiResponse::ok("Session refreshed", body))))
}

/// logout
///
/// [Public Route] Expires both session cookies. Tokens are stateless, so an already
/// copied access token stays valid until it expires.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Logged out"))
)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        clear_cookies(&state.config),
        Json(ApiResponse::message_only("Logged out")),
    )
}
