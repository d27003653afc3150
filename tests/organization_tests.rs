mod common;

use axum::http::StatusCode;
use common::{TestApp, data_id, seed_tenant, seed_user};
use lms_portal::{models::Role, response::PageQuery};
use serde_json::json;

async fn global_admin(app: &TestApp) -> uuid::Uuid {
    seed_user(&app.repo, None, Role::GlobalAdmin, "root@lms.test")
        .await
        .id
}

#[tokio::test]
async fn test_create_organization_derives_slug() {
    let app = TestApp::new();
    let root = global_admin(&app).await;

    let (status, body) = app
        .post(
            "/api/globalAdmin/organizations",
            root,
            json!({ "name": "Acme  Corp, Ltd." }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["isSuccess"], true);
    assert_eq!(body["data"]["slug"], "acme-corp-ltd");
    assert_eq!(body["data"]["is_active"], true);

    // An explicit slug is normalized too.
    let (status, body) = app
        .post(
            "/api/globalAdmin/organizations",
            root,
            json!({ "name": "Globex", "slug": "Globex HQ" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], "globex-hq");
}

#[tokio::test]
async fn test_duplicate_or_empty_slug_is_rejected() {
    let app = TestApp::new();
    let root = global_admin(&app).await;

    let (status, _) = app
        .post("/api/globalAdmin/organizations", root, json!({ "name": "Acme" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post("/api/globalAdmin/organizations", root, json!({ "name": "ACME" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    let (status, _) = app
        .post(
            "/api/globalAdmin/organizations",
            root,
            json!({ "name": "Valid", "slug": "!!!" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post("/api/globalAdmin/organizations", root, json!({ "name": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_search_and_pagination() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    for name in ["Alpha", "Beta", "Gamma", "Alphabet"] {
        app.post("/api/globalAdmin/organizations", root, json!({ "name": name }))
            .await;
    }

    let (status, body) = app
        .get("/api/globalAdmin/organizations?page=1&limit=3", root)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["total"], 4);
    assert_eq!(body["pagination"]["totalPages"], 2);

    let (_, body) = app
        .get("/api/globalAdmin/organizations?search=alpha", root)
        .await;
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_page_far_past_the_end_is_empty() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    app.post("/api/globalAdmin/organizations", root, json!({ "name": "Solo" }))
        .await;

    let (status, body) = app
        .get("/api/globalAdmin/organizations?page=50000000&limit=100", root)
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["pagination"]["page"], 50000000);

    let (status, _) = app
        .get(&format!("/api/globalAdmin/organizations?page={}&limit=100", u32::MAX), root)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[test]
fn test_page_offset_does_not_overflow() {
    let q = PageQuery {
        page: Some(u32::MAX),
        limit: Some(100),
        search: None,
    };
    assert_eq!(q.offset(), u64::from(u32::MAX - 1) * 100);
    assert_eq!(PageQuery::default().offset(), 0);
}

#[tokio::test]
async fn test_search_treats_wildcards_literally() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    for name in ["Growth 50%", "Growth 500", "Top_Tier", "Topaz Tier"] {
        app.post("/api/globalAdmin/organizations", root, json!({ "name": name }))
            .await;
    }

    let (_, body) = app
        .get("/api/globalAdmin/organizations?search=50%25", root)
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["name"], "Growth 50%");

    let (_, body) = app
        .get("/api/globalAdmin/organizations?search=top_", root)
        .await;
    assert_eq!(body["pagination"]["total"], 1);

    let q = PageQuery {
        search: Some(" 50%_a\\b ".to_string()),
        ..PageQuery::default()
    };
    assert_eq!(q.search_pattern().as_deref(), Some("%50\\%\\_a\\\\b%"));
}

#[tokio::test]
async fn test_update_and_get_organization() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    let tenant = seed_tenant(&app.repo, "Acme").await;
    let uri = format!("/api/globalAdmin/organizations/{}", tenant.org.id);

    let (status, body) = app
        .put(&uri, root, json!({ "name": "Acme Europe", "is_active": false }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "Acme Europe");
    assert_eq!(body["data"]["slug"], "acme");

    let (_, body) = app.get(&uri, root).await;
    assert_eq!(body["data"]["is_active"], false);

    let (status, _) = app
        .get(
            &format!("/api/globalAdmin/organizations/{}", uuid::Uuid::new_v4()),
            root,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_organization_cascades() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    let tenant = seed_tenant(&app.repo, "Acme").await;

    let (status, body) = app
        .delete(
            &format!("/api/globalAdmin/organizations/{}", tenant.org.id),
            root,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("data").is_none());

    assert!(app.repo.get_user(tenant.alice.id).await.is_err());
    let (status, _) = app.get("/api/admin/users", tenant.admin.id).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_org_admin() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    let tenant = seed_tenant(&app.repo, "Acme").await;
    let uri = format!("/api/globalAdmin/organizations/{}/admins", tenant.org.id);

    let (status, body) = app
        .post(
            &uri,
            root,
            json!({ "name": "Second Admin", "email": "Boss@Acme.test", "password": "Adm1nPass" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["email"], "boss@acme.test");

    let new_admin = data_id(&body);
    let (status, _) = app.get("/api/admin/users", new_admin).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(
            &uri,
            root,
            json!({ "name": "Weak", "email": "weak@acme.test", "password": "short" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &uri,
            root,
            json!({ "name": "Dup", "email": "boss@acme.test", "password": "Adm1nPass" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_platform_dashboard_and_activity() {
    let app = TestApp::new();
    let root = global_admin(&app).await;
    app.post("/api/globalAdmin/organizations", root, json!({ "name": "Acme" }))
        .await;
    seed_tenant(&app.repo, "Globex").await;

    let (status, body) = app.get("/api/globalAdmin/dashboard", root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["organizations"], 2);
    assert_eq!(body["data"]["completion_rate"], 0.0);

    let (status, body) = app
        .get("/api/globalAdmin/activity?entity_type=organization", root)
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "organization.created");
}
