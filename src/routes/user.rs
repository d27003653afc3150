use crate::{AppState, handlers::progress};
use axum::{
    Router,
    routing::{get, post},
};

/// Learner Router Module
///
/// The caller's own profile and progress. Records are always loaded by
/// `(caller, id)`, so another user's record id answers 404.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET /me
        .route("/me", get(progress::get_me))
        // GET /assignments?status=
        .route("/assignments", get(progress::my_assignments))
        // GET /progress/{id}
        .route("/progress/{id}", get(progress::get_progress))
        // POST /progress/{id}/start
        .route("/progress/{id}/start", post(progress::start_progress))
        // POST /progress/{id}/complete
        // Modules only; the other content types complete through their own flow.
        .route("/progress/{id}/complete", post(progress::complete_module))
        // GET, POST /progress/{id}/assessment
        .route(
            "/progress/{id}/assessment",
            get(progress::get_assessment).post(progress::submit_assessment),
        )
        // GET, POST /progress/{id}/survey
        .route(
            "/progress/{id}/survey",
            get(progress::get_survey).post(progress::submit_survey),
        )
        // GET /progress/{id}/lessons
        .route("/progress/{id}/lessons", get(progress::list_lessons))
        // POST /progress/{id}/lessons/{lesson_id}/complete
        .route(
            "/progress/{id}/lessons/{lesson_id}/complete",
            post(progress::complete_lesson),
        )
}
