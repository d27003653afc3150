mod common;

use axum::http::{StatusCode, header};
use common::{TestApp, data_id, seed_tenant, uuid_at};
use lms_portal::handlers::users::MAX_IMPORT_ROWS;
use serde_json::json;

#[tokio::test]
async fn test_create_user_with_teams() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, team) = app
        .post("/api/admin/teams", t.admin.id, json!({ "name": "Sales" }))
        .await;
    let team_id = data_id(&team);

    let (status, body) = app
        .post(
            "/api/admin/users",
            t.admin.id,
            json!({
                "name": "Carol",
                "email": "Carol@Acme.test",
                "password": "Passw0rdX",
                "team_ids": [team_id, team_id],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["email"], "carol@acme.test");
    assert_eq!(body["data"]["role"], "user");
    assert_eq!(body["data"]["team_ids"], json!([team_id]));
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = app
        .post(
            "/api/admin/users",
            t.admin.id,
            json!({ "name": "Dup", "email": "carol@acme.test", "password": "Passw0rdX" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_user_validation() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let cases = [
        json!({ "name": "X", "email": "not-an-email", "password": "Passw0rdX" }),
        json!({ "name": "X", "email": "x@acme.test", "password": "weak" }),
        json!({ "name": "X", "email": "x@acme.test", "password": "Passw0rdX", "role": "global_admin" }),
        json!({ "name": "X", "email": "x@acme.test", "password": "Passw0rdX", "team_ids": [uuid::Uuid::new_v4()] }),
    ];
    for case in cases {
        let (status, body) = app.post("/api/admin/users", t.admin.id, case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case} -> {body}");
        assert_eq!(body["isSuccess"], false);
    }
}

#[tokio::test]
async fn test_users_are_scoped_to_the_organization() {
    let app = TestApp::new();
    let acme = seed_tenant(&app.repo, "Acme").await;
    let globex = seed_tenant(&app.repo, "Globex").await;

    let (status, body) = app.get("/api/admin/users", acme.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);

    let (status, _) = app
        .get(&format!("/api/admin/users/{}", globex.alice.id), acme.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .delete(&format!("/api/admin/users/{}", globex.alice.id), acme.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = app.get("/api/admin/users?search=alice", acme.admin.id).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["id"], acme.alice.id.to_string());
}

#[tokio::test]
async fn test_update_user_and_self_protection() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let uri = format!("/api/admin/users/{}", t.alice.id);

    let (status, body) = app
        .put(&uri, t.admin.id, json!({ "name": "Alice B.", "role": "admin" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["name"], "Alice B.");
    assert_eq!(body["data"]["role"], "admin");

    let own = format!("/api/admin/users/{}", t.admin.id);
    let (status, _) = app.put(&own, t.admin.id, json!({ "is_active": false })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.put(&own, t.admin.id, json!({ "role": "user" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.delete(&own, t.admin.id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .put(&uri, t.admin.id, json!({ "email": t.bob.email }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_deactivated_user_cannot_call_the_api() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let (status, _) = app
        .put(
            &format!("/api/admin/users/{}", t.bob.id),
            t.admin.id,
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/user/me", t.bob.id).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_delete_user() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (status, body) = app
        .delete(&format!("/api/admin/users/{}", t.bob.id), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "User deleted");

    let (_, body) = app.get("/api/admin/users", t.admin.id).await;
    assert_eq!(body["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_import_users_reports_per_row() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    app.post("/api/admin/teams", t.admin.id, json!({ "name": "Support" }))
        .await;

    let csv = format!(
        "name,email,password,role,team\n\
         Dan,dan@acme.test,Passw0rdX,,support\n\
         Eve,eve@acme.test,Passw0rdX,admin,\n\
         Dan Again,DAN@acme.test,Passw0rdX,,\n\
         Old Alice,{},Passw0rdX,,\n\
         Bad,not-an-email,Passw0rdX,,\n\
         Weak,weak@acme.test,short,,\n\
         Root,root@acme.test,Passw0rdX,overlord,\n\
         Ghost,ghost@acme.test,Passw0rdX,,Nowhere\n",
        t.alice.email
    );
    let (status, body) = app
        .upload(
            "/api/admin/users/import",
            t.admin.id,
            "users.csv",
            "text/csv",
            csv.as_bytes(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let report = &body["data"];
    assert_eq!(report["created"], 2);
    assert_eq!(report["skipped"], 2);
    let lines: Vec<u64> = report["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["line"].as_u64().unwrap())
        .collect();
    assert_eq!(lines, vec![6, 7, 8, 9]);

    let (_, users) = app.get("/api/admin/users?search=dan", t.admin.id).await;
    let dan = &users["data"][0];
    assert_eq!(dan["team_ids"].as_array().unwrap().len(), 1);
    let (_, users) = app.get("/api/admin/users?search=eve", t.admin.id).await;
    assert_eq!(users["data"][0]["role"], "admin");
}

#[tokio::test]
async fn test_import_rejects_malformed_files() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let (status, body) = app
        .upload(
            "/api/admin/users/import",
            t.admin.id,
            "users.csv",
            "text/csv",
            b"name,email\nDan,dan@acme.test\n",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("password"));

    let (status, _) = app
        .upload(
            "/api/admin/users/import",
            t.admin.id,
            "users.csv",
            "text/csv",
            &[0xff, 0xfe, 0x00],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_import_caps_row_count() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let mut csv = String::from("name,email,password\n");
    for i in 0..=MAX_IMPORT_ROWS {
        csv.push_str(&format!("User {i},user{i}@acme.test,Passw0rdX\n"));
    }
    let (status, body) = app
        .upload(
            "/api/admin/users/import",
            t.admin.id,
            "users.csv",
            "text/csv",
            csv.as_bytes(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        format!("The file has 1001 rows; at most {MAX_IMPORT_ROWS} can be imported at once")
    );

    let (_, body) = app.get("/api/admin/users", t.admin.id).await;
    assert_eq!(body["pagination"]["total"], 3);
}

#[tokio::test]
async fn test_export_users_csv() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, team) = app
        .post("/api/admin/teams", t.admin.id, json!({ "name": "Ops, EMEA" }))
        .await;
    let team_id = uuid_at(&team["data"]["id"]);
    app.post(
        &format!("/api/admin/teams/{team_id}/members"),
        t.admin.id,
        json!({ "user_ids": [t.alice.id] }),
    )
    .await;

    let (status, headers, body) = app.download("/api/admin/users/export", t.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("users.csv")
    );

    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("id,name,email,role,is_active,teams,created_at")
    );
    assert_eq!(body.lines().count(), 4);
    let alice_line = body
        .lines()
        .find(|l| l.contains(&t.alice.email))
        .unwrap();
    assert!(alice_line.contains("\"Ops, EMEA\""));
}
