use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    ActivityLog, Assessment, AssessmentAttempt, AssessmentChanges, AssessmentQuestion, Assignment,
    ContentStatus, ContentType, LearningPath, LearningPathChanges, NewUser, OrgCounts,
    Organization, PlatformCounts, ProgressStatus, ProgressWithUser, Survey, SurveyChanges,
    SurveyResponse, SurveyResponseView, Team, TrainingModule, UpdateModuleRequest,
    UpdateOrganizationRequest, UpdateTeamRequest, UserChanges, UserContentProgress, UserRecord,
};
use crate::response::PageQuery;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// RepoError
///
/// Persistence failures. `NotFound` carries the entity name used in the 404 message.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// A page of rows plus the number of rows matching before paging.
pub type Page<T> = (Vec<T>, i64);

/// Repository Trait
///
/// Persistence contract for the whole platform. Every tenant-scoped call takes the
/// caller's `org` id and treats rows of other organizations as missing, so handlers
/// never need their own cross-tenant checks.
///
/// Multi-row writes (cascading deletes, question/section/lesson replacement,
/// assignment fan-out) are all-or-nothing.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Organizations ---
    async fn create_organization(&self, org: Organization) -> RepoResult<Organization>;
    async fn get_organization(&self, id: Uuid) -> RepoResult<Organization>;
    async fn list_organizations(&self, q: &PageQuery) -> RepoResult<Page<Organization>>;
    async fn update_organization(
        &self,
        id: Uuid,
        changes: UpdateOrganizationRequest,
    ) -> RepoResult<Organization>;
    /// Removes the organization and every record scoped to it.
    async fn delete_organization(&self, id: Uuid) -> RepoResult<()>;

    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord>;
    /// Inserts every user or none of them.
    async fn create_users(&self, users: Vec<NewUser>) -> RepoResult<usize>;
    async fn get_user(&self, id: Uuid) -> RepoResult<UserRecord>;
    /// Case-insensitive lookup.
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>>;
    async fn get_org_user(&self, org: Uuid, id: Uuid) -> RepoResult<UserRecord>;
    async fn list_users(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<UserRecord>>;
    async fn all_users(&self, org: Uuid) -> RepoResult<Vec<UserRecord>>;
    async fn update_user(&self, org: Uuid, id: Uuid, changes: UserChanges)
    -> RepoResult<UserRecord>;
    /// Removes the user with its memberships, progress and submissions.
    async fn delete_user(&self, org: Uuid, id: Uuid) -> RepoResult<()>;
    /// Team ids of each user in `user_ids`.
    async fn user_team_ids(&self, user_ids: &[Uuid]) -> RepoResult<Vec<(Uuid, Uuid)>>;

    // --- Teams ---
    async fn create_team(&self, team: Team) -> RepoResult<Team>;
    async fn get_team(&self, org: Uuid, id: Uuid) -> RepoResult<Team>;
    async fn list_teams(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Team>>;
    async fn all_teams(&self, org: Uuid) -> RepoResult<Vec<Team>>;
    async fn sub_teams(&self, org: Uuid, parent_id: Uuid) -> RepoResult<Vec<Team>>;
    async fn update_team(&self, org: Uuid, id: Uuid, changes: UpdateTeamRequest)
    -> RepoResult<Team>;
    /// Removes the team, its sub-teams and all their memberships.
    async fn delete_team(&self, org: Uuid, id: Uuid) -> RepoResult<()>;
    /// Adds memberships, ignoring existing ones. Returns how many were new.
    async fn add_team_members(&self, team_id: Uuid, user_ids: &[Uuid]) -> RepoResult<usize>;
    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> RepoResult<()>;
    async fn team_members(&self, team_id: Uuid) -> RepoResult<Vec<UserRecord>>;
    /// Distinct active members of the given teams.
    async fn team_member_ids(&self, team_ids: &[Uuid]) -> RepoResult<Vec<Uuid>>;

    // --- Modules ---
    async fn create_module(&self, module: TrainingModule) -> RepoResult<TrainingModule>;
    async fn get_module(&self, org: Uuid, id: Uuid) -> RepoResult<TrainingModule>;
    async fn list_modules(
        &self,
        org: Uuid,
        q: &PageQuery,
        status: Option<ContentStatus>,
    ) -> RepoResult<Page<TrainingModule>>;
    async fn update_module(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UpdateModuleRequest,
    ) -> RepoResult<TrainingModule>;
    async fn set_module_resource(
        &self,
        org: Uuid,
        id: Uuid,
        resource_key: &str,
    ) -> RepoResult<TrainingModule>;
    /// Removes the module, its assignments and progress, and lessons pointing at it.
    async fn delete_module(&self, org: Uuid, id: Uuid) -> RepoResult<()>;

    // --- Assessments ---
    async fn create_assessment(&self, assessment: Assessment) -> RepoResult<Assessment>;
    async fn get_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<Assessment>;
    async fn list_assessments(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Assessment>>;
    async fn update_assessment(
        &self,
        org: Uuid,
        id: Uuid,
        changes: AssessmentChanges,
    ) -> RepoResult<Assessment>;
    async fn append_questions(
        &self,
        org: Uuid,
        id: Uuid,
        questions: Vec<AssessmentQuestion>,
    ) -> RepoResult<Assessment>;
    async fn delete_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<()>;
    /// Stores the attempt and the updated progress record together.
    async fn record_attempt(
        &self,
        attempt: AssessmentAttempt,
        progress: &UserContentProgress,
    ) -> RepoResult<()>;

    // --- Surveys ---
    async fn create_survey(&self, survey: Survey) -> RepoResult<Survey>;
    async fn get_survey(&self, org: Uuid, id: Uuid) -> RepoResult<Survey>;
    async fn list_surveys(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Survey>>;
    async fn update_survey(&self, org: Uuid, id: Uuid, changes: SurveyChanges)
    -> RepoResult<Survey>;
    async fn delete_survey(&self, org: Uuid, id: Uuid) -> RepoResult<()>;
    /// Stores the response and the updated progress record together. `Conflict` when
    /// the progress record already has a response.
    async fn submit_survey_response(
        &self,
        response: SurveyResponse,
        progress: &UserContentProgress,
    ) -> RepoResult<()>;
    async fn list_survey_responses(
        &self,
        survey_id: Uuid,
        q: &PageQuery,
    ) -> RepoResult<Page<SurveyResponseView>>;
    async fn all_survey_responses(&self, survey_id: Uuid) -> RepoResult<Vec<SurveyResponseView>>;

    // --- Learning paths ---
    async fn create_learning_path(&self, path: LearningPath) -> RepoResult<LearningPath>;
    async fn get_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<LearningPath>;
    async fn list_learning_paths(&self, org: Uuid, q: &PageQuery)
    -> RepoResult<Page<LearningPath>>;
    async fn update_learning_path(
        &self,
        org: Uuid,
        id: Uuid,
        changes: LearningPathChanges,
    ) -> RepoResult<LearningPath>;
    async fn delete_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<()>;

    // --- Assignments ---
    /// Inserts the assignment and its progress records together.
    async fn create_assignment(
        &self,
        assignment: Assignment,
        progress: Vec<UserContentProgress>,
    ) -> RepoResult<Assignment>;
    async fn get_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<Assignment>;
    async fn list_assignments(
        &self,
        org: Uuid,
        q: &PageQuery,
        content_type: Option<ContentType>,
    ) -> RepoResult<Page<Assignment>>;
    async fn assignment_progress(&self, assignment_id: Uuid) -> RepoResult<Vec<ProgressWithUser>>;
    /// Sets the due date on the assignment and on all of its progress records.
    async fn update_assignment_due_date(
        &self,
        org: Uuid,
        id: Uuid,
        due_date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> RepoResult<Assignment>;
    async fn delete_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<()>;
    /// Users holding a `not_started` / `in_progress` record for the content.
    async fn open_progress_user_ids(
        &self,
        org: Uuid,
        content_type: ContentType,
        content_id: Uuid,
    ) -> RepoResult<Vec<Uuid>>;
    async fn export_progress(
        &self,
        org: Uuid,
        assignment_id: Option<Uuid>,
    ) -> RepoResult<Vec<ProgressWithUser>>;

    // --- Progress ---
    /// The record must belong to `user_id`.
    async fn get_progress(&self, user_id: Uuid, id: Uuid) -> RepoResult<UserContentProgress>;
    async fn list_user_progress(
        &self,
        user_id: Uuid,
        q: &PageQuery,
        status: Option<ProgressStatus>,
    ) -> RepoResult<Page<UserContentProgress>>;
    async fn update_progress(&self, progress: &UserContentProgress) -> RepoResult<()>;
    async fn org_progress(&self, org: Uuid) -> RepoResult<Vec<UserContentProgress>>;

    // --- Activity ---
    async fn log_activity(&self, entry: ActivityLog) -> RepoResult<()>;
    /// `org = None` lists every organization (global admin view).
    async fn list_activity(
        &self,
        org: Option<Uuid>,
        q: &PageQuery,
        entity_type: Option<String>,
    ) -> RepoResult<Page<ActivityLog>>;

    // --- Analytics ---
    async fn org_counts(&self, org: Uuid) -> RepoResult<OrgCounts>;
    async fn platform_counts(&self) -> RepoResult<PlatformCounts>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
