use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod analytics;
pub mod auth;
pub mod config;
pub mod csv;
pub mod error;
pub mod handlers;
pub mod models;
pub mod progress;
pub mod repository;
pub mod response;
pub mod storage;

// Routing segregated by audience (public, global admin, admin, learner).
pub mod routes;
use auth::AuthUser;
use routes::{admin, global_admin, public, user};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and the schemas they use into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login, handlers::auth::refresh, handlers::auth::logout,
        handlers::organizations::create_organization, handlers::organizations::list_organizations,
        handlers::organizations::get_organization, handlers::organizations::update_organization,
        handlers::organizations::delete_organization, handlers::organizations::create_org_admin,
        handlers::organizations::platform_dashboard, handlers::organizations::list_all_activity,
        handlers::users::create_user, handlers::users::list_users, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user, handlers::users::import_users,
        handlers::users::export_users,
        handlers::teams::create_team, handlers::teams::list_teams, handlers::teams::get_team,
        handlers::teams::update_team, handlers::teams::delete_team,
        handlers::teams::list_team_members, handlers::teams::add_team_members,
        handlers::teams::remove_team_member,
        handlers::modules::create_module, handlers::modules::list_modules,
        handlers::modules::get_module, handlers::modules::update_module,
        handlers::modules::delete_module, handlers::modules::upload_module_resource,
        handlers::modules::get_presigned_url,
        handlers::assessments::create_assessment, handlers::assessments::list_assessments,
        handlers::assessments::get_assessment, handlers::assessments::update_assessment,
        handlers::assessments::delete_assessment, handlers::assessments::import_questions,
        handlers::surveys::create_survey, handlers::surveys::list_surveys,
        handlers::surveys::get_survey, handlers::surveys::update_survey,
        handlers::surveys::delete_survey, handlers::surveys::list_survey_responses,
        handlers::surveys::export_survey_responses,
        handlers::learning_paths::create_learning_path, handlers::learning_paths::list_learning_paths,
        handlers::learning_paths::get_learning_path, handlers::learning_paths::update_learning_path,
        handlers::learning_paths::delete_learning_path,
        handlers::assignments::create_assignment, handlers::assignments::list_assignments,
        handlers::assignments::get_assignment, handlers::assignments::update_assignment,
        handlers::assignments::delete_assignment, handlers::assignments::export_progress,
        handlers::progress::get_me, handlers::progress::my_assignments,
        handlers::progress::get_progress, handlers::progress::start_progress,
        handlers::progress::complete_module, handlers::progress::get_assessment,
        handlers::progress::submit_assessment, handlers::progress::get_survey,
        handlers::progress::submit_survey, handlers::progress::list_lessons,
        handlers::progress::complete_lesson,
        handlers::activity::list_activity, handlers::analytics::org_dashboard,
    ),
    components(
        schemas(
            error::ErrorResponse, response::Pagination,
            models::Role, models::ContentType, models::ContentStatus, models::ProgressStatus,
            models::QuestionKind, models::Organization, models::CreateOrganizationRequest,
            models::UpdateOrganizationRequest, models::CreateAdminRequest, models::User,
            models::UserProfile, models::CreateUserRequest, models::UpdateUserRequest,
            models::LoginRequest, models::RefreshRequest, models::SessionResponse,
            models::Team, models::TeamDetail, models::CreateTeamRequest, models::UpdateTeamRequest,
            models::TeamMembersRequest, models::TrainingModule, models::CreateModuleRequest,
            models::UpdateModuleRequest, models::PresignedUrlRequest, models::PresignedUrlResponse,
            models::Assessment, models::AssessmentQuestion, models::QuestionInput,
            models::CreateAssessmentRequest, models::UpdateAssessmentRequest,
            models::AssessmentForLearner, models::PublicQuestion, models::SubmitAssessmentRequest,
            models::AssessmentResult, models::AssessmentAttempt,
            models::Survey, models::SurveySection, models::SurveyQuestion, models::SectionInput,
            models::SurveyQuestionInput, models::CreateSurveyRequest, models::UpdateSurveyRequest,
            models::SurveyAnswer, models::SubmitSurveyRequest, models::SurveyResponseView,
            models::LearningPath, models::Lesson, models::LessonInput, models::LessonState,
            models::CreateLearningPathRequest, models::UpdateLearningPathRequest,
            models::Assignment, models::CreateAssignmentRequest, models::UpdateAssignmentRequest,
            models::AssignmentResult, models::AssignmentDetail, models::UserContentProgress,
            models::ProgressWithUser, models::MyAssignment, models::ActivityLog,
            models::ImportReport, models::ImportError, models::OrgCounts,
            models::ProgressBreakdown, models::OrgDashboard, models::PlatformCounts,
            models::PlatformDashboard,
        )
    ),
    tags(
        (name = "auth", description = "Session lifecycle"),
        (name = "organizations", description = "Tenant management (global admin)"),
        (name = "users", description = "Organization users"),
        (name = "teams", description = "Teams and sub-teams"),
        (name = "modules", description = "Training modules and uploads"),
        (name = "assessments", description = "Scored quizzes"),
        (name = "surveys", description = "Questionnaires and responses"),
        (name = "learning_paths", description = "Ordered curricula"),
        (name = "assignments", description = "Content assignment and progress reports"),
        (name = "learner", description = "The caller's own progress"),
        (name = "activity", description = "Audit trail"),
        (name = "analytics", description = "Dashboards"),
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single, cloneable container of shared services. Handlers pull the parts they
/// need through the `FromRef` implementations below.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory for tests and demos.
    pub repo: RepositoryState,
    /// Object storage for module resources and presigned uploads.
    pub storage: StorageState,
    /// The loaded, immutable configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless an `AuthUser` can be resolved (token or local
/// bypass, existing and active user). The handlers extract `AuthUser` again and
/// apply their role guard.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the public, global admin, admin and learner routers, applies the
/// authentication layer to the protected ones and wraps everything in the tracing,
/// request-id and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected Routers
    // Every route of these routers runs `auth_middleware` first; unknown paths still 404.
    let authenticated = |routes: Router<AppState>| {
        routes.route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
    };
    let protected = Router::new()
        .nest(
            "/api/globalAdmin",
            authenticated(global_admin::global_admin_routes()),
        )
        .nest("/api/admin", authenticated(admin::admin_routes()))
        .nest("/api/user", authenticated(user::user_routes()));

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    // 4. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set by the
/// request-id layer, so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
