mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TestApp, seed_org, seed_user, seed_user_with_hash};
use lms_portal::{
    AppConfig,
    auth::{self, TokenKind},
    models::{Role, UpdateOrganizationRequest, UserChanges},
};
use serde_json::{Value, json};
use uuid::Uuid;

const PASSWORD: &str = "Sup3rSecret";

fn login_request(email: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": email, "password": password }).to_string(),
        ))
        .unwrap()
}

fn set_cookies(headers: &axum::http::HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

fn cookie_value(cookies: &[String], name: &str) -> String {
    cookies
        .iter()
        .find_map(|c| c.strip_prefix(&format!("{name}=")))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
        .unwrap_or_else(|| panic!("cookie {name} not set: {cookies:?}"))
}

// --- Token and password primitives ---

#[test]
fn test_password_hash_roundtrip() {
    let hash = auth::hash_password(PASSWORD).unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(auth::verify_password(PASSWORD, &hash));
    assert!(!auth::verify_password("wrong-password", &hash));
    assert!(!auth::verify_password(PASSWORD, "not-a-phc-string"));
}

#[test]
fn test_password_strength_rules() {
    assert!(auth::validate_password_strength("Abcdefg1").is_ok());
    assert!(auth::validate_password_strength("Ab1").is_err());
    assert!(auth::validate_password_strength("abcdefg1").is_err());
    assert!(auth::validate_password_strength("ABCDEFG1").is_err());
    assert!(auth::validate_password_strength("Abcdefgh").is_err());
}

#[test]
fn test_token_kinds_are_not_interchangeable() {
    let config = AppConfig::default();
    let user = lms_portal::models::UserRecord {
        id: Uuid::new_v4(),
        organization_id: Some(Uuid::new_v4()),
        role: Role::Admin,
        ..Default::default()
    };
    let pair = auth::issue_token_pair(&user, &config).unwrap();

    let claims = auth::decode_token(&pair.access_token, TokenKind::Access, &config).unwrap();
    assert_eq!(claims.sub, user.id);
    assert_eq!(claims.role, Role::Admin);

    assert!(auth::decode_token(&pair.refresh_token, TokenKind::Access, &config).is_err());
    assert!(auth::decode_token(&pair.access_token, TokenKind::Refresh, &config).is_err());
    assert!(auth::decode_token(&pair.refresh_token, TokenKind::Refresh, &config).is_ok());
}

#[test]
fn test_expired_token_is_rejected() {
    let config = AppConfig {
        access_token_ttl_minutes: -10,
        ..AppConfig::default()
    };
    let user = lms_portal::models::UserRecord {
        id: Uuid::new_v4(),
        ..Default::default()
    };
    let pair = auth::issue_token_pair(&user, &config).unwrap();
    assert!(auth::decode_token(&pair.access_token, TokenKind::Access, &config).is_err());
}

// --- Session endpoints ---

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new();
    let (status, _, body) = app
        .call(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_login_sets_cookies_and_cookie_authenticates() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let hash = auth::hash_password(PASSWORD).unwrap();
    let user =
        seed_user_with_hash(&app.repo, Some(org.id), Role::User, "ada@acme.test", &hash).await;

    let (status, headers, bytes) = app.call(login_request("ADA@acme.test", PASSWORD)).await;
    assert_eq!(status, StatusCode::OK);

    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["isSuccess"], true);
    assert_eq!(body["data"]["user"]["id"], user.id.to_string());
    assert_eq!(body["data"]["user"]["organization_name"], "Acme");

    let cookies = set_cookies(&headers);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
    let access = cookie_value(&cookies, "accessToken");

    let (status, _, bytes) = app
        .call(
            Request::get("/api/user/me")
                .header(header::COOKIE, format!("accessToken={access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let me: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(me["data"]["email"], "ada@acme.test");

    // Bearer header works as well.
    let (status, _, _) = app
        .call(
            Request::get("/api/user/me")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let hash = auth::hash_password(PASSWORD).unwrap();
    seed_user_with_hash(&app.repo, Some(org.id), Role::User, "ada@acme.test", &hash).await;

    let (status, _, bytes) = app.call(login_request("ada@acme.test", "Wrong1234")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["isSuccess"], false);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, _, _) = app.call(login_request("nobody@acme.test", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_deactivated_user_and_organization() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let hash = auth::hash_password(PASSWORD).unwrap();
    let user =
        seed_user_with_hash(&app.repo, Some(org.id), Role::User, "ada@acme.test", &hash).await;
    seed_user_with_hash(&app.repo, Some(org.id), Role::User, "bob@acme.test", &hash).await;

    app.repo
        .update_user(
            org.id,
            user.id,
            UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (status, _, _) = app.call(login_request("ada@acme.test", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.repo
        .update_organization(
            org.id,
            UpdateOrganizationRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let (status, _, bytes) = app.call(login_request("bob@acme.test", PASSWORD)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "Organization is deactivated");
}

#[tokio::test]
async fn test_refresh_issues_new_pair_from_cookie_or_body() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let hash = auth::hash_password(PASSWORD).unwrap();
    seed_user_with_hash(&app.repo, Some(org.id), Role::User, "ada@acme.test", &hash).await;

    let (_, headers, _) = app.call(login_request("ada@acme.test", PASSWORD)).await;
    let cookies = set_cookies(&headers);
    let refresh = cookie_value(&cookies, "refreshToken");
    let access = cookie_value(&cookies, "accessToken");

    let (status, headers, _) = app
        .call(
            Request::post("/api/auth/refresh")
                .header(header::COOKIE, format!("refreshToken={refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(set_cookies(&headers).len(), 2);

    let (status, _, _) = app
        .call(
            Request::post("/api/auth/refresh")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "refresh_token": refresh }).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // An access token is not a refresh token.
    let (status, _, _) = app
        .call(
            Request::post("/api/auth/refresh")
                .header(header::COOKIE, format!("refreshToken={access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .call(Request::post("/api/auth/refresh").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_expires_cookies() {
    let app = TestApp::new();
    let (status, headers, _) = app
        .call(Request::post("/api/auth/logout").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let cookies = set_cookies(&headers);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
}

// --- Route protection ---

#[tokio::test]
async fn test_protected_routes_require_authentication() {
    let app = TestApp::new();
    for uri in ["/api/user/me", "/api/admin/users", "/api/globalAdmin/organizations"] {
        let (status, body) = app.send("GET", uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["isSuccess"], false);
    }

    let (status, _) = app
        .send("GET", "/api/user/me", Some(Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "unknown x-user-id");
}

#[tokio::test]
async fn test_roles_are_enforced_per_route_group() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let global = seed_user(&app.repo, None, Role::GlobalAdmin, "root@lms.test").await;
    let admin = seed_user(&app.repo, Some(org.id), Role::Admin, "admin@acme.test").await;
    let user = seed_user(&app.repo, Some(org.id), Role::User, "ada@acme.test").await;

    let (status, _) = app.get("/api/globalAdmin/organizations", admin.id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/admin/users", user.id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/admin/users", global.id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/user/assignments", global.id).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/globalAdmin/organizations", global.id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/admin/users", admin.id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get("/api/user/assignments", admin.id).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_deactivated_user_loses_access_immediately() {
    let app = TestApp::new();
    let org = seed_org(&app.repo, "Acme").await;
    let user = seed_user(&app.repo, Some(org.id), Role::User, "ada@acme.test").await;
    let config = AppConfig::default();
    let access = auth::issue_token_pair(&user, &config).unwrap().access_token;

    app.repo
        .update_user(
            org.id,
            user.id,
            UserChanges {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let (status, _, _) = app
        .call(
            Request::get("/api/user/me")
                .header(header::AUTHORIZATION, format!("Bearer {access}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
