mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{TestApp, assign, data_id, my_progress_id, published_module, seed_tenant, seed_user};
use lms_portal::models::Role;
use serde_json::json;
use uuid::Uuid;

async fn team(app: &TestApp, admin: Uuid, name: &str, parent: Option<Uuid>, members: &[Uuid]) -> Uuid {
    let (status, body) = app
        .post(
            "/api/admin/teams",
            admin,
            json!({ "name": name, "parent_team_id": parent }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = data_id(&body);
    if !members.is_empty() {
        app.post(
            &format!("/api/admin/teams/{id}/members"),
            admin,
            json!({ "user_ids": members }),
        )
        .await;
    }
    id
}

#[tokio::test]
async fn test_only_published_content_is_assignable() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, body) = app
        .post("/api/admin/modules", t.admin.id, json!({ "title": "Draft" }))
        .await;
    let draft = data_id(&body);

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": draft, "user_ids": [t.alice.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Only published content can be assigned");

    let (status, _) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "survey", "content_id": Uuid::new_v4(), "user_ids": [t.alice.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assignment_needs_targets_and_a_future_due_date() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Intro").await;

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The assignment has no target users");

    let yesterday = Utc::now() - Duration::days(1);
    let (status, _) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({
                "content_type": "module",
                "content_id": module,
                "user_ids": [t.alice.id],
                "due_date": yesterday,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let other = seed_tenant(&app.repo, "Globex").await;
    let (status, _) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module, "user_ids": [other.alice.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_team_targets_include_active_sub_teams() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let carol = seed_user(&app.repo, Some(t.org.id), Role::User, "carol@acme.test").await;
    let dave = seed_user(&app.repo, Some(t.org.id), Role::User, "dave@acme.test").await;
    let module = published_module(&app, t.admin.id, "Intro").await;

    let eng = team(&app, t.admin.id, "Engineering", None, &[t.alice.id]).await;
    team(&app, t.admin.id, "Backend", Some(eng), &[t.bob.id, t.alice.id]).await;
    let legacy = team(&app, t.admin.id, "Legacy", Some(eng), &[dave.id]).await;
    app.put(
        &format!("/api/admin/teams/{legacy}"),
        t.admin.id,
        json!({ "is_active": false }),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({
                "content_type": "module",
                "content_id": module,
                "user_ids": [carol.id],
                "team_ids": [eng],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["assigned"], 3);
    assert_eq!(body["data"]["assignment"]["content_title"], "Intro");
    assert_eq!(body["data"]["assignment"]["total_users"], 3);

    let (_, body) = app.get("/api/user/assignments", dave.id).await;
    assert_eq!(body["pagination"]["total"], 0);

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module, "team_ids": [legacy] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("inactive"));
}

#[tokio::test]
async fn test_open_records_are_skipped() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Intro").await;
    assign(&app, t.admin.id, "module", module, &[t.alice.id]).await;

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module, "user_ids": [t.alice.id, t.bob.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["assigned"], 1);
    assert_eq!(body["data"]["skipped_user_ids"], json!([t.alice.id]));

    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module, "user_ids": [t.alice.id, t.bob.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    // Once Alice finishes, the module can be assigned to her again.
    let progress = my_progress_id(&app, t.alice.id, module).await;
    app.post(
        &format!("/api/user/progress/{progress}/complete"),
        t.alice.id,
        json!({}),
    )
    .await;
    let (status, body) = app
        .post(
            "/api/admin/assignments",
            t.admin.id,
            json!({ "content_type": "module", "content_id": module, "user_ids": [t.alice.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

#[tokio::test]
async fn test_assignment_detail_update_and_delete() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Intro").await;
    let id = assign(&app, t.admin.id, "module", module, &[t.alice.id, t.bob.id]).await;
    let uri = format!("/api/admin/assignments/{id}");

    let progress = my_progress_id(&app, t.bob.id, module).await;
    app.post(
        &format!("/api/user/progress/{progress}/complete"),
        t.bob.id,
        json!({}),
    )
    .await;

    let (status, body) = app.get(&uri, t.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_users"], 2);
    assert_eq!(body["data"]["completed_users"], 1);
    let rows = body["data"]["progress"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r["user_email"] == t.bob.email && r["status"] == "completed"));

    let due = Utc::now() + Duration::days(7);
    let (status, body) = app.put(&uri, t.admin.id, json!({ "due_date": due })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["data"]["due_date"].is_string());
    let (_, body) = app.get("/api/user/assignments", t.alice.id).await;
    assert!(body["data"][0]["due_date"].is_string());
    assert_eq!(body["data"][0]["overdue"], false);

    let (status, _) = app.put(&uri, t.admin.id, json!({ "due_date": null })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get("/api/admin/assignments?content_type=module", t.admin.id).await;
    assert_eq!(body["pagination"]["total"], 1);
    let (_, body) = app.get("/api/admin/assignments?content_type=survey", t.admin.id).await;
    assert_eq!(body["pagination"]["total"], 0);

    let (status, _) = app.delete(&uri, t.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, t.admin.id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get("/api/user/assignments", t.alice.id).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_export_progress_csv() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Intro, part 1").await;
    let id = assign(&app, t.admin.id, "module", module, &[t.alice.id, t.bob.id]).await;

    let (status, _, body) = app
        .download("/api/admin/assignments/progress/export", t.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("user_email,content_type,content_title,status,progress_percent,score,due_date,completed_at,overdue")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.contains("module,\"Intro, part 1\",not_started,0")));

    let (status, headers, _) = app
        .download(
            &format!("/api/admin/assignments/progress/export?assignment_id={id}"),
            t.admin.id,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers["content-disposition"]
            .to_str()
            .unwrap()
            .contains(&format!("progress-{id}.csv"))
    );

    let (status, _, _) = app
        .download(
            &format!("/api/admin/assignments/progress/export?assignment_id={}", Uuid::new_v4()),
            t.admin.id,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
