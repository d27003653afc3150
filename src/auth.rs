use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
    response::AppendHeaders,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::{Role, UserRecord},
    repository::{RepoError, RepositoryState},
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// TokenKind
///
/// Access tokens authenticate requests; refresh tokens can only be exchanged for a
/// new pair at `/api/auth/refresh`. They are signed with different secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims
///
/// The JWT payload. `org` and `role` are informational; the extractor always reloads
/// the user so a role change or deactivation takes effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    pub org: Option<Uuid>,
    pub role: Role,
    pub kind: TokenKind,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// TokenPair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn sign(user: &UserRecord, kind: TokenKind, config: &AppConfig) -> Result<String, ApiError> {
    let now = Utc::now();
    let (ttl, secret) = match kind {
        TokenKind::Access => (
            Duration::minutes(config.access_token_ttl_minutes),
            &config.jwt_secret,
        ),
        TokenKind::Refresh => (
            Duration::days(config.refresh_token_ttl_days),
            &config.jwt_refresh_secret,
        ),
    };
    let claims = Claims {
        sub: user.id,
        org: user.organization_id,
        role: user.role,
        kind,
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

/// issue_token_pair
///
/// Signs a fresh access/refresh pair for `user` (HS256).
pub fn issue_token_pair(user: &UserRecord, config: &AppConfig) -> Result<TokenPair, ApiError> {
    Ok(TokenPair {
        access_token: sign(user, TokenKind::Access, config)?,
        refresh_token: sign(user, TokenKind::Refresh, config)?,
    })
}

/// decode_token
///
/// Validates signature, expiry and the expected `kind`. Any failure is a 401.
pub fn decode_token(token: &str, kind: TokenKind, config: &AppConfig) -> Result<Claims, ApiError> {
    let secret = match kind {
        TokenKind::Access => &config.jwt_secret,
        TokenKind::Refresh => &config.jwt_refresh_secret,
    };
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => ApiError::Unauthorized("Session expired".to_string()),
        _ => ApiError::Unauthorized("Invalid token".to_string()),
    })?;

    if data.claims.kind != kind {
        return Err(ApiError::Unauthorized("Invalid token".to_string()));
    }
    Ok(data.claims)
}

/// Value of cookie `name` from the `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn cookie(name: &str, value: &str, max_age_secs: i64, config: &AppConfig) -> String {
    let secure = if config.env == Env::Production {
        "; Secure"
    } else {
        ""
    };
    format!("{name}={value}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_secs}{secure}")
}

/// `Set-Cookie` headers carrying both tokens.
pub fn session_cookies(
    tokens: &TokenPair,
    config: &AppConfig,
) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    AppendHeaders([
        (
            header::SET_COOKIE,
            cookie(
                ACCESS_COOKIE,
                &tokens.access_token,
                config.access_token_ttl_minutes * 60,
                config,
            ),
        ),
        (
            header::SET_COOKIE,
            cookie(
                REFRESH_COOKIE,
                &tokens.refresh_token,
                config.refresh_token_ttl_days * 24 * 60 * 60,
                config,
            ),
        ),
    ])
}

/// `Set-Cookie` headers expiring both tokens.
pub fn clear_cookies(config: &AppConfig) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    AppendHeaders([
        (header::SET_COOKIE, cookie(ACCESS_COOKIE, "", 0, config)),
        (header::SET_COOKIE, cookie(REFRESH_COOKIE, "", 0, config)),
    ])
}

/// hash_password
///
/// Argon2id with a random salt, stored as a PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// `false` for a wrong password and for a malformed stored hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// validate_password_strength
///
/// At least 8 characters with an uppercase letter, a lowercase letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".to_string());
    }
    Ok(())
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request. Handlers take it as an argument
/// and call one of the guards below to check the role.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    /// `None` only for global admins.
    pub organization_id: Option<Uuid>,
    pub role: Role,
}

impl AuthUser {
    /// Platform operators only.
    pub fn require_global_admin(&self) -> Result<(), ApiError> {
        match self.role {
            Role::GlobalAdmin => Ok(()),
            _ => Err(ApiError::Forbidden("Global admin access required".to_string())),
        }
    }

    /// Organization admins only. Returns the organization they manage.
    pub fn require_admin(&self) -> Result<Uuid, ApiError> {
        match (self.role, self.organization_id) {
            (Role::Admin, Some(org)) => Ok(org),
            _ => Err(ApiError::Forbidden("Admin access required".to_string())),
        }
    }

    /// Any member of an organization (admins included). Returns the organization.
    pub fn require_user_org(&self) -> Result<Uuid, ApiError> {
        self.organization_id
            .ok_or_else(|| ApiError::Forbidden("Organization membership required".to_string()))
    }
}

impl From<UserRecord> for AuthUser {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            organization_id: user.organization_id,
            role: user.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Dependency Resolution: repository and config from the application state.
/// 2. Local Bypass: `x-user-id` header naming an existing user (`Env::Local` only).
/// 3. Token Extraction: `Authorization: Bearer` header, then the `accessToken` cookie.
/// 4. Token Validation: signature, expiry and kind (`access`).
/// 5. DB Lookup: the user must still exist and be active.
///
/// Rejection: `ApiError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass Check
        if config.env == Env::Local
            && let Some(user_id) = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok())
            && let Ok(user) = repo.get_user(user_id).await
            && user.is_active
        {
            return Ok(user.into());
        }

        // 3. Token Extraction
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string);
        let token = bearer
            .or_else(|| read_cookie(&parts.headers, ACCESS_COOKIE))
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        // 4. Token Validation
        let claims = decode_token(&token, TokenKind::Access, &config)?;

        // 5. Database Lookup
        let user = match repo.get_user(claims.sub).await {
            Ok(user) => user,
            Err(RepoError::NotFound(_)) => {
                return Err(ApiError::Unauthorized("User no longer exists".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !user.is_active {
            return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
        }

        Ok(user.into())
    }
}
