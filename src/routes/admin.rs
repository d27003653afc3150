use crate::{
    AppState,
    handlers::{
        MAX_CSV_BYTES, activity, analytics, assessments, assignments, learning_paths,
        modules::{self, MAX_RESOURCE_BYTES},
        surveys, teams, users,
    },
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Admin Router Module
///
/// Everything an organization admin manages. Each handler resolves the admin's
/// organization through `require_admin` and passes it to the repository, which
/// treats rows of other organizations as missing.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /dashboard
        .route("/dashboard", get(analytics::org_dashboard))
        // GET /activity?entity_type=
        .route("/activity", get(activity::list_activity))
        // --- Users ---
        // GET, POST /users
        .route("/users", get(users::list_users).post(users::create_user))
        // POST /users/import
        // Multipart CSV: name,email,password,role,team.
        .route(
            "/users/import",
            post(users::import_users).layer(DefaultBodyLimit::max(MAX_CSV_BYTES + 64 * 1024)),
        )
        // GET /users/export
        .route("/users/export", get(users::export_users))
        // GET, PUT, DELETE /users/{id}
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // --- Teams ---
        .route("/teams", get(teams::list_teams).post(teams::create_team))
        .route(
            "/teams/{id}",
            get(teams::get_team)
                .put(teams::update_team)
                .delete(teams::delete_team),
        )
        // GET, POST /teams/{id}/members
        .route(
            "/teams/{id}/members",
            get(teams::list_team_members).post(teams::add_team_members),
        )
        // DELETE /teams/{id}/members/{user_id}
        .route(
            "/teams/{id}/members/{user_id}",
            delete(teams::remove_team_member),
        )
        // --- Modules ---
        .route(
            "/modules",
            get(modules::list_modules).post(modules::create_module),
        )
        .route(
            "/modules/{id}",
            get(modules::get_module)
                .put(modules::update_module)
                .delete(modules::delete_module),
        )
        // POST /modules/{id}/resource
        // Multipart upload streamed to object storage.
        .route(
            "/modules/{id}/resource",
            post(modules::upload_module_resource)
                .layer(DefaultBodyLimit::max(MAX_RESOURCE_BYTES + 64 * 1024)),
        )
        // POST /uploads/presigned
        .route("/uploads/presigned", post(modules::get_presigned_url))
        // --- Assessments ---
        .route(
            "/assessments",
            get(assessments::list_assessments).post(assessments::create_assessment),
        )
        .route(
            "/assessments/{id}",
            get(assessments::get_assessment)
                .put(assessments::update_assessment)
                .delete(assessments::delete_assessment),
        )
        // POST /assessments/{id}/questions/import
        // Multipart CSV: prompt,options,correct_option,points.
        .route(
            "/assessments/{id}/questions/import",
            post(assessments::import_questions)
                .layer(DefaultBodyLimit::max(MAX_CSV_BYTES + 64 * 1024)),
        )
        // --- Surveys ---
        .route(
            "/surveys",
            get(surveys::list_surveys).post(surveys::create_survey),
        )
        .route(
            "/surveys/{id}",
            get(surveys::get_survey)
                .put(surveys::update_survey)
                .delete(surveys::delete_survey),
        )
        .route(
            "/surveys/{id}/responses",
            get(surveys::list_survey_responses),
        )
        .route(
            "/surveys/{id}/responses/export",
            get(surveys::export_survey_responses),
        )
        // --- Learning paths ---
        .route(
            "/learning-paths",
            get(learning_paths::list_learning_paths).post(learning_paths::create_learning_path),
        )
        .route(
            "/learning-paths/{id}",
            get(learning_paths::get_learning_path)
                .put(learning_paths::update_learning_path)
                .delete(learning_paths::delete_learning_path),
        )
        // --- Assignments ---
        .route(
            "/assignments",
            get(assignments::list_assignments).post(assignments::create_assignment),
        )
        // GET /assignments/progress/export?assignment_id=
        .route(
            "/assignments/progress/export",
            get(assignments::export_progress),
        )
        .route(
            "/assignments/{id}",
            get(assignments::get_assignment)
                .put(assignments::update_assignment)
                .delete(assignments::delete_assignment),
        )
}
