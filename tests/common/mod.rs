#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Utc;
use lms_portal::{
    AppConfig, AppState, MemoryRepository, MockStorageService, create_router,
    models::{NewUser, Organization, Role, UserRecord},
    repository::RepositoryState,
    storage::StorageState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const BOUNDARY: &str = "lms-test-boundary";

/// TestApp
///
/// A router over a fresh in-memory repository, plus direct handles for seeding
/// and inspecting state.
pub struct TestApp {
    pub router: Router,
    pub repo: RepositoryState,
    pub storage: MockStorageService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(MockStorageService::new())
    }

    pub fn with_storage(storage: MockStorageService) -> Self {
        let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
        let state = AppState {
            repo: repo.clone(),
            storage: Arc::new(storage.clone()) as StorageState,
            config: AppConfig::default(),
        };
        Self {
            router: create_router(state),
            repo,
            storage,
        }
    }

    /// JSON request; `user` is sent through the local `x-user-id` bypass.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, _, bytes) = self.call(request).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.send("GET", uri, Some(user), None).await
    }

    pub async fn post(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(user), Some(body)).await
    }

    pub async fn put(&self, uri: &str, user: Uuid, body: Value) -> (StatusCode, Value) {
        self.send("PUT", uri, Some(user), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: Uuid) -> (StatusCode, Value) {
        self.send("DELETE", uri, Some(user), None).await
    }

    /// Uploads `content` as the multipart field `file`.
    pub async fn upload(
        &self,
        uri: &str,
        user: Uuid,
        filename: &str,
        content_type: &str,
        content: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", user.to_string())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let (status, _, bytes) = self.call(request).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// GET returning the raw body, for CSV downloads.
    pub async fn download(&self, uri: &str, user: Uuid) -> (StatusCode, HeaderMap, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-user-id", user.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, headers, bytes) = self.call(request).await;
        (status, headers, String::from_utf8(bytes).unwrap())
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, bytes.to_vec())
    }
}

// --- Seeding ---

pub async fn seed_org(repo: &RepositoryState, name: &str) -> Organization {
    let now = Utc::now();
    repo.create_organization(Organization {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: lms_portal::models::slugify(name),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
    .await
    .unwrap()
}

/// Inserts a user directly; the stored hash is not a valid PHC string, so these
/// users can only authenticate through `x-user-id`.
pub async fn seed_user(
    repo: &RepositoryState,
    org: Option<Uuid>,
    role: Role,
    email: &str,
) -> UserRecord {
    seed_user_with_hash(repo, org, role, email, "not-a-real-hash").await
}

pub async fn seed_user_with_hash(
    repo: &RepositoryState,
    org: Option<Uuid>,
    role: Role,
    email: &str,
    password_hash: &str,
) -> UserRecord {
    let now = Utc::now();
    repo.create_user(NewUser {
        record: UserRecord {
            id: Uuid::new_v4(),
            organization_id: org,
            name: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
        team_ids: Vec::new(),
    })
    .await
    .unwrap()
}

/// Tenant
///
/// An organization with one admin and two learners.
pub struct Tenant {
    pub org: Organization,
    pub admin: UserRecord,
    pub alice: UserRecord,
    pub bob: UserRecord,
}

pub async fn seed_tenant(repo: &RepositoryState, name: &str) -> Tenant {
    let org = seed_org(repo, name).await;
    let slug = org.slug.clone();
    let admin = seed_user(repo, Some(org.id), Role::Admin, &format!("admin@{slug}.test")).await;
    let alice = seed_user(repo, Some(org.id), Role::User, &format!("alice@{slug}.test")).await;
    let bob = seed_user(repo, Some(org.id), Role::User, &format!("bob@{slug}.test")).await;
    Tenant {
        org,
        admin,
        alice,
        bob,
    }
}

// --- Response helpers ---

pub fn data_id(body: &Value) -> Uuid {
    body["data"]["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("response has no data.id: {body}"))
}

pub fn uuid_at(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("not a uuid: {value}"))
}

/// Creates a published module through the API and returns its id.
pub async fn published_module(app: &TestApp, admin: Uuid, title: &str) -> Uuid {
    let (status, body) = app
        .post(
            "/api/admin/modules",
            admin,
            serde_json::json!({ "title": title, "status": "published", "duration_minutes": 15 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    data_id(&body)
}

/// Assigns content to `users` and returns the assignment id.
pub async fn assign(
    app: &TestApp,
    admin: Uuid,
    content_type: &str,
    content_id: Uuid,
    users: &[Uuid],
) -> Uuid {
    let (status, body) = app
        .post(
            "/api/admin/assignments",
            admin,
            serde_json::json!({
                "content_type": content_type,
                "content_id": content_id,
                "user_ids": users,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    uuid_at(&body["data"]["assignment"]["id"])
}

/// The caller's progress record for `content_id`.
pub async fn my_progress_id(app: &TestApp, user: Uuid, content_id: Uuid) -> Uuid {
    let (status, body) = app.get("/api/user/assignments?limit=100", user).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["content_id"] == content_id.to_string())
        .map(|row| uuid_at(&row["id"]))
        .unwrap_or_else(|| panic!("no progress for {content_id}: {body}"))
}
