mod common;

use axum::http::StatusCode;
use common::{TestApp, assign, data_id, my_progress_id, published_module, seed_tenant};
use lms_portal::{MockStorageService, repository::Repository, response::PageQuery};
use serde_json::{Value, json};
use uuid::Uuid;

fn question(prompt: &str, correct: i32) -> Value {
    json!({ "prompt": prompt, "options": ["A", "B", "C"], "correct_option": correct })
}

// --- Modules ---

#[tokio::test]
async fn test_module_crud_and_status_filter() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let (status, body) = app
        .post(
            "/api/admin/modules",
            t.admin.id,
            json!({ "title": " Safety 101 ", "content": "# Welcome" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["title"], "Safety 101");
    assert_eq!(body["data"]["status"], "draft");
    let draft = data_id(&body);
    published_module(&app, t.admin.id, "Ethics").await;

    let (_, body) = app
        .get("/api/admin/modules?status=published", t.admin.id)
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["title"], "Ethics");

    let uri = format!("/api/admin/modules/{draft}");
    let (status, body) = app
        .put(&uri, t.admin.id, json!({ "status": "published", "duration_minutes": 30 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["duration_minutes"], 30);

    let (status, _) = app
        .put(&uri, t.admin.id, json!({ "duration_minutes": -5 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.delete(&uri, t.admin.id).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, t.admin.id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_module_resource() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Handbook").await;

    let (status, body) = app
        .upload(
            &format!("/api/admin/modules/{module}/resource"),
            t.admin.id,
            "Handbook.PDF",
            "application/pdf",
            b"%PDF-1.7 fake",
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let key = body["data"]["resource_key"].as_str().unwrap();
    assert!(key.starts_with(&format!("modules/{}/", t.org.id)));
    assert!(key.ends_with(".pdf"));
    assert_eq!(app.storage.uploads(), vec![(key.to_string(), 13)]);

    let (status, _) = app
        .upload(
            &format!("/api/admin/modules/{module}/resource"),
            t.admin.id,
            "empty.pdf",
            "application/pdf",
            b"",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_failure_leaves_module_untouched() {
    let app = TestApp::with_storage(MockStorageService::new_failing());
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Handbook").await;

    let (status, body) = app
        .upload(
            &format!("/api/admin/modules/{module}/resource"),
            t.admin.id,
            "a.pdf",
            "application/pdf",
            b"data",
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal server error");

    let (_, body) = app
        .get(&format!("/api/admin/modules/{module}"), t.admin.id)
        .await;
    assert!(body["data"]["resource_key"].is_null());
}

#[tokio::test]
async fn test_presigned_upload_then_attach_key() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Video").await;

    let (status, body) = app
        .post(
            "/api/admin/uploads/presigned",
            t.admin.id,
            json!({ "filename": "../../intro.mp4", "file_type": "video/mp4" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let key = body["data"]["resource_key"].as_str().unwrap().to_string();
    assert!(key.ends_with(".mp4"));
    assert!(!key.contains(".."));
    assert!(body["data"]["upload_url"].as_str().unwrap().contains("signature=fake"));

    let uri = format!("/api/admin/modules/{module}");
    let (status, body) = app.put(&uri, t.admin.id, json!({ "resource_key": key })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["resource_key"], key);

    let (status, _) = app
        .put(&uri, t.admin.id, json!({ "resource_key": "modules/someone-else/x.mp4" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_presigned_storage_failure() {
    let app = TestApp::with_storage(MockStorageService::new_failing());
    let t = seed_tenant(&app.repo, "Acme").await;
    let (status, _) = app
        .post(
            "/api/admin/uploads/presigned",
            t.admin.id,
            json!({ "filename": "a.mp4", "file_type": "video/mp4" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// --- Assessments ---

#[tokio::test]
async fn test_create_assessment_with_defaults() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let (status, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Quiz", "questions": [question("2+2?", 1), question("Sky?", 0)] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let data = &body["data"];
    assert_eq!(data["passing_score"], 70);
    assert_eq!(data["max_attempts"], 1);
    assert_eq!(data["questions"].as_array().unwrap().len(), 2);
    assert_eq!(data["questions"][1]["position"], 1);
    assert_eq!(data["questions"][0]["points"], 1);
}

#[tokio::test]
async fn test_assessment_question_validation() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let cases = [
        json!({ "title": "Q", "questions": [{ "prompt": "x", "options": ["only"], "correct_option": 0 }] }),
        json!({ "title": "Q", "questions": [{ "prompt": "x", "options": ["a", "b"], "correct_option": 2 }] }),
        json!({ "title": "Q", "questions": [{ "prompt": "x", "options": ["a", " "], "correct_option": 0 }] }),
        json!({ "title": "Q", "passing_score": 101 }),
        json!({ "title": "Q", "status": "published" }),
    ];
    for case in cases {
        let (status, body) = app
            .post("/api/admin/assessments", t.admin.id, case.clone())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case} -> {body}");
    }

    let (_, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Q", "questions": [question("ok", 0), { "prompt": "bad", "options": ["a"], "correct_option": 0 }] }),
        )
        .await;
    assert!(body["message"].as_str().unwrap().starts_with("Question 2:"));
}

#[tokio::test]
async fn test_update_assessment_replaces_questions() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Quiz", "questions": [question("one", 0), question("two", 0)] }),
        )
        .await;
    let id = data_id(&body);
    let uri = format!("/api/admin/assessments/{id}");

    let (status, body) = app
        .put(
            &uri,
            t.admin.id,
            json!({ "questions": [question("only", 2)], "status": "published", "max_attempts": 3 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["questions"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["max_attempts"], 3);

    let (status, _) = app.put(&uri, t.admin.id, json!({ "questions": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "published needs questions");
}

#[tokio::test]
async fn test_import_questions_appends_valid_rows() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Quiz", "questions": [question("existing", 0)] }),
        )
        .await;
    let id = data_id(&body);

    let csv = "prompt,options,correct_option,points\n\
               \"Capital of France, please\",Paris|Rome|Madrid,0,5\n\
               Bad index,A|B,7,\n\
               Not a number,A|B,x,\n\
               Largest planet,Mars|Jupiter,1,\n";
    let (status, body) = app
        .upload(
            &format!("/api/admin/assessments/{id}/questions/import"),
            t.admin.id,
            "questions.csv",
            "text/csv",
            csv.as_bytes(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["created"], 2);
    let lines: Vec<u64> = body["data"]["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["line"].as_u64().unwrap())
        .collect();
    assert_eq!(lines, vec![3, 4]);

    let (_, body) = app
        .get(&format!("/api/admin/assessments/{id}"), t.admin.id)
        .await;
    let questions = body["data"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[1]["prompt"], "Capital of France, please");
    assert_eq!(questions[1]["points"], 5);
    assert_eq!(questions[1]["position"], 1);
    assert_eq!(questions[2]["options"], json!(["Mars", "Jupiter"]));
}

#[tokio::test]
async fn test_import_questions_requires_columns() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (_, body) = app
        .post("/api/admin/assessments", t.admin.id, json!({ "title": "Quiz" }))
        .await;
    let id = data_id(&body);

    let (status, body) = app
        .upload(
            &format!("/api/admin/assessments/{id}/questions/import"),
            t.admin.id,
            "q.csv",
            "text/csv",
            b"prompt,options\nx,a|b\n",
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("correct_option"));
}

// --- Surveys ---

fn survey_body(status: &str) -> Value {
    json!({
        "title": "Onboarding feedback",
        "status": status,
        "sections": [
            {
                "title": "Experience",
                "questions": [
                    { "prompt": "How was it?", "kind": "rating" },
                    { "prompt": "Best part?", "kind": "single_choice", "options": ["People", "Tools"] },
                ]
            },
            {
                "title": "Free text",
                "questions": [ { "prompt": "Anything else?", "kind": "text", "required": false } ]
            }
        ]
    })
}

#[tokio::test]
async fn test_create_survey_with_sections() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let (status, body) = app
        .post("/api/admin/surveys", t.admin.id, survey_body("published"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let sections = body["data"]["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[1]["position"], 1);
    assert_eq!(sections[0]["questions"][0]["required"], true);
    assert_eq!(sections[1]["questions"][0]["required"], false);

    let id = data_id(&body);
    let (status, body) = app
        .put(
            &format!("/api/admin/surveys/{id}"),
            t.admin.id,
            json!({ "title": "Renamed" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sections"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_survey_question_validation() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;

    let cases = [
        json!({ "title": "S", "sections": [{ "title": "A", "questions": [{ "prompt": "p", "kind": "single_choice", "options": ["one"] }] }] }),
        json!({ "title": "S", "sections": [{ "title": "A", "questions": [{ "prompt": "p", "kind": "text", "options": ["x", "y"] }] }] }),
        json!({ "title": "S", "sections": [{ "title": "", "questions": [] }] }),
        json!({ "title": "S", "status": "published", "sections": [{ "title": "Empty", "questions": [] }] }),
    ];
    for case in cases {
        let (status, body) = app.post("/api/admin/surveys", t.admin.id, case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case} -> {body}");
    }
}

// --- Learning paths ---

#[tokio::test]
async fn test_learning_path_lessons() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let module = published_module(&app, t.admin.id, "Intro").await;
    let (_, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Check", "questions": [question("q", 0)] }),
        )
        .await;
    let quiz = data_id(&body);

    let (status, body) = app
        .post(
            "/api/admin/learning-paths",
            t.admin.id,
            json!({
                "title": "Onboarding",
                "lessons": [
                    { "content_type": "module", "content_id": module },
                    { "title": "Final check", "content_type": "assessment", "content_id": quiz },
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["enforce_order"], true);
    assert_eq!(body["data"]["lessons"][0]["title"], "Intro");
    assert_eq!(body["data"]["lessons"][1]["title"], "Final check");
    assert_eq!(body["data"]["lessons"][1]["position"], 1);
    let path = data_id(&body);

    // Nested paths and unknown content are rejected.
    let (status, _) = app
        .post(
            "/api/admin/learning-paths",
            t.admin.id,
            json!({ "title": "Meta", "lessons": [{ "content_type": "learning_path", "content_id": path }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .post(
            "/api/admin/learning-paths",
            t.admin.id,
            json!({ "title": "Ghost", "lessons": [{ "content_type": "module", "content_id": Uuid::new_v4() }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Lesson 1:"));

    // Deleting a module drops the lessons pointing at it.
    app.delete(&format!("/api/admin/modules/{module}"), t.admin.id)
        .await;
    let (_, body) = app
        .get(&format!("/api/admin/learning-paths/{path}"), t.admin.id)
        .await;
    let lessons = body["data"]["lessons"].as_array().unwrap();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0]["position"], 0);
}

#[tokio::test]
async fn test_published_learning_path_needs_lessons() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (status, _) = app
        .post(
            "/api/admin/learning-paths",
            t.admin.id,
            json!({ "title": "Empty", "status": "published" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/admin/learning-paths",
            t.admin.id,
            json!({ "title": "Draft", "enforce_order": false }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = data_id(&body);
    let (status, _) = app
        .put(
            &format!("/api/admin/learning-paths/{id}"),
            t.admin.id,
            json!({ "status": "published" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_content_is_scoped_to_the_organization() {
    let app = TestApp::new();
    let acme = seed_tenant(&app.repo, "Acme").await;
    let globex = seed_tenant(&app.repo, "Globex").await;
    let module = published_module(&app, acme.admin.id, "Secret").await;

    let (status, _) = app
        .get(&format!("/api/admin/modules/{module}"), globex.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get("/api/admin/modules", globex.admin.id).await;
    assert_eq!(body["pagination"]["total"], 0);

    let (status, _) = app
        .post(
            "/api/admin/learning-paths",
            globex.admin.id,
            json!({ "title": "Steal", "lessons": [{ "content_type": "module", "content_id": module }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_assessment_removes_assignments_and_progress() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (status, body) = app
        .post(
            "/api/admin/assessments",
            t.admin.id,
            json!({ "title": "Quiz", "status": "published", "questions": [question("Q1", 1)] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let quiz = data_id(&body);
    let assignment = assign(&app, t.admin.id, "assessment", quiz, &[t.alice.id]).await;
    let progress = my_progress_id(&app, t.alice.id, quiz).await;
    let (status, _) = app
        .post(
            &format!("/api/user/progress/{progress}/assessment"),
            t.alice.id,
            json!({ "answers": [0] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .delete(&format!("/api/admin/assessments/{quiz}"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get(&format!("/api/admin/assessments/{quiz}"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .get(&format!("/api/admin/assignments/{assignment}"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .get(&format!("/api/user/progress/{progress}"), t.alice.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get("/api/user/assignments", t.alice.id).await;
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_delete_survey_removes_responses_assignments_and_progress() {
    let app = TestApp::new();
    let t = seed_tenant(&app.repo, "Acme").await;
    let (status, body) = app
        .post(
            "/api/admin/surveys",
            t.admin.id,
            json!({
                "title": "Pulse",
                "status": "published",
                "sections": [ { "title": "Mood", "questions": [ { "prompt": "How are you?", "kind": "rating" } ] } ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let survey = data_id(&body);
    let question_id = body["data"]["sections"][0]["questions"][0]["id"].clone();
    let assignment = assign(&app, t.admin.id, "survey", survey, &[t.alice.id, t.bob.id]).await;
    let progress = my_progress_id(&app, t.alice.id, survey).await;
    let (status, _) = app
        .post(
            &format!("/api/user/progress/{progress}/survey"),
            t.alice.id,
            json!({ "answers": [ { "question_id": question_id, "value": 3 } ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .delete(&format!("/api/admin/surveys/{survey}"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .get(&format!("/api/admin/surveys/{survey}/responses"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, responses) = app
        .repo
        .list_survey_responses(survey, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(responses, 0);
    let (status, _) = app
        .get(&format!("/api/admin/assignments/{assignment}"), t.admin.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .get(&format!("/api/user/progress/{progress}"), t.alice.id)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app.get("/api/user/assignments", t.bob.id).await;
    assert_eq!(body["pagination"]["total"], 0);
}
