use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Page, RepoError, RepoResult, Repository};
use crate::models::{
    ActivityLog, Assessment, AssessmentAttempt, AssessmentChanges, AssessmentQuestion, Assignment,
    ContentStatus, ContentType, LearningPath, LearningPathChanges, NewUser, OrgCounts,
    Organization, PlatformCounts, ProgressStatus, ProgressWithUser, Survey, SurveyChanges,
    SurveyResponse, SurveyResponseView, Team, TrainingModule, UpdateModuleRequest,
    UpdateOrganizationRequest, UpdateTeamRequest, UserChanges, UserContentProgress, UserRecord,
};
use crate::response::PageQuery;

#[derive(Default)]
struct Store {
    organizations: Vec<Organization>,
    users: Vec<UserRecord>,
    teams: Vec<Team>,
    memberships: Vec<(Uuid, Uuid)>,
    modules: Vec<TrainingModule>,
    assessments: Vec<Assessment>,
    attempts: Vec<AssessmentAttempt>,
    surveys: Vec<Survey>,
    responses: Vec<SurveyResponse>,
    paths: Vec<LearningPath>,
    assignments: Vec<Assignment>,
    progress: Vec<UserContentProgress>,
    activity: Vec<ActivityLog>,
}

impl Store {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|u| Some(u.id) != except && u.email.eq_ignore_ascii_case(email))
    }

    fn team_name_taken(&self, team: &Team) -> bool {
        self.teams.iter().any(|t| {
            t.id != team.id
                && t.organization_id == team.organization_id
                && t.parent_team_id == team.parent_team_id
                && t.name.eq_ignore_ascii_case(&team.name)
        })
    }

    fn with_member_count(&self, team: &Team) -> Team {
        let mut team = team.clone();
        team.member_count = self.memberships.iter().filter(|(t, _)| *t == team.id).count() as i64;
        team
    }

    fn with_counts(&self, assignment: &Assignment) -> Assignment {
        let mut a = assignment.clone();
        let rows = self.progress.iter().filter(|p| p.assignment_id == a.id);
        let (total, completed) = rows.fold((0, 0), |(t, c), p| {
            (t + 1, c + i64::from(p.status == ProgressStatus::Completed))
        });
        a.total_users = total;
        a.completed_users = completed;
        a
    }

    fn with_user(&self, progress: &UserContentProgress) -> ProgressWithUser {
        let user = self.users.iter().find(|u| u.id == progress.user_id);
        ProgressWithUser {
            progress: progress.clone(),
            user_name: user.map(|u| u.name.clone()).unwrap_or_default(),
            user_email: user.map(|u| u.email.clone()).unwrap_or_default(),
        }
    }

    /// Drops progress rows matching `pred` with their attempts and responses.
    fn remove_progress(&mut self, pred: impl Fn(&UserContentProgress) -> bool) {
        let removed: HashSet<Uuid> = self
            .progress
            .iter()
            .filter(|p| pred(p))
            .map(|p| p.id)
            .collect();
        self.progress.retain(|p| !removed.contains(&p.id));
        self.attempts.retain(|a| !removed.contains(&a.progress_id));
        self.responses.retain(|r| !removed.contains(&r.progress_id));
    }

    fn remove_assignments(&mut self, pred: impl Fn(&Assignment) -> bool) {
        let removed: HashSet<Uuid> = self
            .assignments
            .iter()
            .filter(|a| pred(a))
            .map(|a| a.id)
            .collect();
        self.assignments.retain(|a| !removed.contains(&a.id));
        self.remove_progress(|p| removed.contains(&p.assignment_id));
    }

    /// Removes assignments of the content and lessons pointing at it.
    fn remove_content_refs(&mut self, content_type: ContentType, content_id: Uuid) {
        self.remove_assignments(|a| a.content_type == content_type && a.content_id == content_id);
        for path in &mut self.paths {
            path.lessons
                .retain(|l| !(l.content_type == content_type && l.content_id == content_id));
            for (idx, lesson) in path.lessons.iter_mut().enumerate() {
                lesson.position = idx as i32;
            }
        }
    }

    fn remove_teams(&mut self, ids: &HashSet<Uuid>) {
        self.teams.retain(|t| !ids.contains(&t.id));
        self.memberships.retain(|(t, _)| !ids.contains(t));
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
}

fn paginate<T>(items: Vec<T>, q: &PageQuery) -> Page<T> {
    let total = items.len() as i64;
    let page = items
        .into_iter()
        .skip(usize::try_from(q.offset()).unwrap_or(usize::MAX))
        .take(q.limit() as usize)
        .collect();
    (page, total)
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// MemoryRepository
///
/// `Repository` backed by in-process vectors behind a single `RwLock`. Each trait
/// call takes the lock once, so multi-row writes are atomic the same way a database
/// transaction is. Used by the integration tests and when `DATABASE_URL=memory`.
#[derive(Default)]
pub struct MemoryRepository {
    store: RwLock<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_organization(&self, org: Organization) -> RepoResult<Organization> {
        let mut store = self.store.write().await;
        if store.organizations.iter().any(|o| o.slug == org.slug) {
            return Err(RepoError::Conflict(format!(
                "Organization slug '{}' is already in use",
                org.slug
            )));
        }
        store.organizations.push(org.clone());
        Ok(org)
    }

    async fn get_organization(&self, id: Uuid) -> RepoResult<Organization> {
        let store = self.store.read().await;
        store
            .organizations
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or(RepoError::NotFound("Organization"))
    }

    async fn list_organizations(&self, q: &PageQuery) -> RepoResult<Page<Organization>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .organizations
            .iter()
            .filter(|o| q.matches(&[&o.name, &o.slug]))
            .cloned()
            .collect();
        newest_first(&mut items, |o| o.created_at);
        Ok(paginate(items, q))
    }

    async fn update_organization(
        &self,
        id: Uuid,
        changes: UpdateOrganizationRequest,
    ) -> RepoResult<Organization> {
        let mut store = self.store.write().await;
        if let Some(slug) = &changes.slug
            && store.organizations.iter().any(|o| o.id != id && &o.slug == slug)
        {
            return Err(RepoError::Conflict(format!(
                "Organization slug '{slug}' is already in use"
            )));
        }
        let org = store
            .organizations
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepoError::NotFound("Organization"))?;
        set(&mut org.name, changes.name);
        set(&mut org.slug, changes.slug);
        set(&mut org.is_active, changes.is_active);
        org.updated_at = Utc::now();
        Ok(org.clone())
    }

    async fn delete_organization(&self, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store.organizations.iter().any(|o| o.id == id) {
            return Err(RepoError::NotFound("Organization"));
        }
        let users: HashSet<Uuid> = store
            .users
            .iter()
            .filter(|u| u.organization_id == Some(id))
            .map(|u| u.id)
            .collect();
        let teams: HashSet<Uuid> = store
            .teams
            .iter()
            .filter(|t| t.organization_id == id)
            .map(|t| t.id)
            .collect();

        store.remove_assignments(|a| a.organization_id == id);
        store.remove_progress(|p| p.organization_id == id || users.contains(&p.user_id));
        store.remove_teams(&teams);
        store.memberships.retain(|(_, u)| !users.contains(u));
        store.users.retain(|u| !users.contains(&u.id));
        store.modules.retain(|m| m.organization_id != id);
        let assessments: HashSet<Uuid> = store
            .assessments
            .iter()
            .filter(|a| a.organization_id == id)
            .map(|a| a.id)
            .collect();
        store.attempts.retain(|a| !assessments.contains(&a.assessment_id));
        store.assessments.retain(|a| a.organization_id != id);
        let surveys: HashSet<Uuid> = store
            .surveys
            .iter()
            .filter(|s| s.organization_id == id)
            .map(|s| s.id)
            .collect();
        store.responses.retain(|r| !surveys.contains(&r.survey_id));
        store.surveys.retain(|s| s.organization_id != id);
        store.paths.retain(|p| p.organization_id != id);
        store.activity.retain(|a| a.organization_id != Some(id));
        store.organizations.retain(|o| o.id != id);
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord> {
        let mut store = self.store.write().await;
        if store.email_taken(&user.record.email, None) {
            return Err(RepoError::Conflict(format!(
                "Email '{}' is already registered",
                user.record.email
            )));
        }
        for team_id in &user.team_ids {
            store.memberships.push((*team_id, user.record.id));
        }
        store.users.push(user.record.clone());
        Ok(user.record)
    }

    async fn create_users(&self, users: Vec<NewUser>) -> RepoResult<usize> {
        let mut store = self.store.write().await;
        let mut seen = HashSet::new();
        for user in &users {
            let email = user.record.email.to_lowercase();
            if store.email_taken(&email, None) || !seen.insert(email) {
                return Err(RepoError::Conflict(format!(
                    "Email '{}' is already registered",
                    user.record.email
                )));
            }
        }
        let count = users.len();
        for user in users {
            for team_id in &user.team_ids {
                store.memberships.push((*team_id, user.record.id));
            }
            store.users.push(user.record);
        }
        Ok(count)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<UserRecord> {
        let store = self.store.read().await;
        store
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(RepoError::NotFound("User"))
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        let store = self.store.read().await;
        Ok(store
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn get_org_user(&self, org: Uuid, id: Uuid) -> RepoResult<UserRecord> {
        let store = self.store.read().await;
        store
            .users
            .iter()
            .find(|u| u.id == id && u.organization_id == Some(org))
            .cloned()
            .ok_or(RepoError::NotFound("User"))
    }

    async fn list_users(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<UserRecord>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .users
            .iter()
            .filter(|u| u.organization_id == Some(org) && q.matches(&[&u.name, &u.email]))
            .cloned()
            .collect();
        newest_first(&mut items, |u| u.created_at);
        Ok(paginate(items, q))
    }

    async fn all_users(&self, org: Uuid) -> RepoResult<Vec<UserRecord>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .users
            .iter()
            .filter(|u| u.organization_id == Some(org))
            .cloned()
            .collect();
        items.sort_by_key(|u| u.created_at);
        Ok(items)
    }

    async fn update_user(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UserChanges,
    ) -> RepoResult<UserRecord> {
        let mut store = self.store.write().await;
        if let Some(email) = &changes.email
            && store.email_taken(email, Some(id))
        {
            return Err(RepoError::Conflict(format!(
                "Email '{email}' is already registered"
            )));
        }
        let user = store
            .users
            .iter_mut()
            .find(|u| u.id == id && u.organization_id == Some(org))
            .ok_or(RepoError::NotFound("User"))?;
        set(&mut user.name, changes.name);
        set(&mut user.email, changes.email);
        set(&mut user.role, changes.role);
        set(&mut user.is_active, changes.is_active);
        set(&mut user.password_hash, changes.password_hash);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        let before = store.users.len();
        store
            .users
            .retain(|u| !(u.id == id && u.organization_id == Some(org)));
        if store.users.len() == before {
            return Err(RepoError::NotFound("User"));
        }
        store.memberships.retain(|(_, u)| *u != id);
        store.remove_progress(|p| p.user_id == id);
        Ok(())
    }

    async fn user_team_ids(&self, user_ids: &[Uuid]) -> RepoResult<Vec<(Uuid, Uuid)>> {
        let store = self.store.read().await;
        Ok(store
            .memberships
            .iter()
            .filter(|(_, u)| user_ids.contains(u))
            .map(|(t, u)| (*u, *t))
            .collect())
    }

    async fn create_team(&self, team: Team) -> RepoResult<Team> {
        let mut store = self.store.write().await;
        if store.team_name_taken(&team) {
            return Err(RepoError::Conflict(format!(
                "A team named '{}' already exists here",
                team.name
            )));
        }
        store.teams.push(team.clone());
        Ok(team)
    }

    async fn get_team(&self, org: Uuid, id: Uuid) -> RepoResult<Team> {
        let store = self.store.read().await;
        store
            .teams
            .iter()
            .find(|t| t.id == id && t.organization_id == org)
            .map(|t| store.with_member_count(t))
            .ok_or(RepoError::NotFound("Team"))
    }

    async fn list_teams(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Team>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .teams
            .iter()
            .filter(|t| {
                t.organization_id == org
                    && q.matches(&[&t.name, t.description.as_deref().unwrap_or("")])
            })
            .map(|t| store.with_member_count(t))
            .collect();
        newest_first(&mut items, |t| t.created_at);
        Ok(paginate(items, q))
    }

    async fn all_teams(&self, org: Uuid) -> RepoResult<Vec<Team>> {
        let store = self.store.read().await;
        Ok(store
            .teams
            .iter()
            .filter(|t| t.organization_id == org)
            .map(|t| store.with_member_count(t))
            .collect())
    }

    async fn sub_teams(&self, org: Uuid, parent_id: Uuid) -> RepoResult<Vec<Team>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .teams
            .iter()
            .filter(|t| t.organization_id == org && t.parent_team_id == Some(parent_id))
            .map(|t| store.with_member_count(t))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn update_team(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UpdateTeamRequest,
    ) -> RepoResult<Team> {
        let mut store = self.store.write().await;
        let mut team = store
            .teams
            .iter()
            .find(|t| t.id == id && t.organization_id == org)
            .cloned()
            .ok_or(RepoError::NotFound("Team"))?;
        set(&mut team.name, changes.name);
        if changes.description.is_some() {
            team.description = changes.description;
        }
        set(&mut team.is_active, changes.is_active);
        team.updated_at = Utc::now();
        if store.team_name_taken(&team) {
            return Err(RepoError::Conflict(format!(
                "A team named '{}' already exists here",
                team.name
            )));
        }
        if let Some(slot) = store.teams.iter_mut().find(|t| t.id == id) {
            *slot = team.clone();
        }
        Ok(store.with_member_count(&team))
    }

    async fn delete_team(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store.teams.iter().any(|t| t.id == id && t.organization_id == org) {
            return Err(RepoError::NotFound("Team"));
        }
        let ids: HashSet<Uuid> = store
            .teams
            .iter()
            .filter(|t| t.id == id || t.parent_team_id == Some(id))
            .map(|t| t.id)
            .collect();
        store.remove_teams(&ids);
        Ok(())
    }

    async fn add_team_members(&self, team_id: Uuid, user_ids: &[Uuid]) -> RepoResult<usize> {
        let mut store = self.store.write().await;
        let mut added = 0;
        for user_id in user_ids {
            if !store.memberships.contains(&(team_id, *user_id)) {
                store.memberships.push((team_id, *user_id));
                added += 1;
            }
        }
        Ok(added)
    }

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        let before = store.memberships.len();
        store.memberships.retain(|m| *m != (team_id, user_id));
        if store.memberships.len() == before {
            return Err(RepoError::NotFound("Team member"));
        }
        Ok(())
    }

    async fn team_members(&self, team_id: Uuid) -> RepoResult<Vec<UserRecord>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .users
            .iter()
            .filter(|u| store.memberships.contains(&(team_id, u.id)))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn team_member_ids(&self, team_ids: &[Uuid]) -> RepoResult<Vec<Uuid>> {
        let store = self.store.read().await;
        let mut seen = HashSet::new();
        Ok(store
            .memberships
            .iter()
            .filter(|(t, _)| team_ids.contains(t))
            .map(|(_, u)| *u)
            .filter(|u| store.users.iter().any(|user| user.id == *u && user.is_active))
            .filter(|u| seen.insert(*u))
            .collect())
    }

    async fn create_module(&self, module: TrainingModule) -> RepoResult<TrainingModule> {
        let mut store = self.store.write().await;
        store.modules.push(module.clone());
        Ok(module)
    }

    async fn get_module(&self, org: Uuid, id: Uuid) -> RepoResult<TrainingModule> {
        let store = self.store.read().await;
        store
            .modules
            .iter()
            .find(|m| m.id == id && m.organization_id == org)
            .cloned()
            .ok_or(RepoError::NotFound("Module"))
    }

    async fn list_modules(
        &self,
        org: Uuid,
        q: &PageQuery,
        status: Option<ContentStatus>,
    ) -> RepoResult<Page<TrainingModule>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .modules
            .iter()
            .filter(|m| m.organization_id == org)
            .filter(|m| status.is_none_or(|s| m.status == s))
            .filter(|m| q.matches(&[&m.title, m.description.as_deref().unwrap_or("")]))
            .cloned()
            .collect();
        newest_first(&mut items, |m| m.created_at);
        Ok(paginate(items, q))
    }

    async fn update_module(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UpdateModuleRequest,
    ) -> RepoResult<TrainingModule> {
        let mut store = self.store.write().await;
        let module = store
            .modules
            .iter_mut()
            .find(|m| m.id == id && m.organization_id == org)
            .ok_or(RepoError::NotFound("Module"))?;
        set(&mut module.title, changes.title);
        if changes.description.is_some() {
            module.description = changes.description;
        }
        if changes.content.is_some() {
            module.content = changes.content;
        }
        set(&mut module.duration_minutes, changes.duration_minutes);
        set(&mut module.status, changes.status);
        module.updated_at = Utc::now();
        Ok(module.clone())
    }

    async fn set_module_resource(
        &self,
        org: Uuid,
        id: Uuid,
        resource_key: &str,
    ) -> RepoResult<TrainingModule> {
        let mut store = self.store.write().await;
        let module = store
            .modules
            .iter_mut()
            .find(|m| m.id == id && m.organization_id == org)
            .ok_or(RepoError::NotFound("Module"))?;
        module.resource_key = Some(resource_key.to_string());
        module.updated_at = Utc::now();
        Ok(module.clone())
    }

    async fn delete_module(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store.modules.iter().any(|m| m.id == id && m.organization_id == org) {
            return Err(RepoError::NotFound("Module"));
        }
        store.remove_content_refs(ContentType::Module, id);
        store.modules.retain(|m| m.id != id);
        Ok(())
    }

    async fn create_assessment(&self, assessment: Assessment) -> RepoResult<Assessment> {
        let mut store = self.store.write().await;
        store.assessments.push(assessment.clone());
        Ok(assessment)
    }

    async fn get_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<Assessment> {
        let store = self.store.read().await;
        store
            .assessments
            .iter()
            .find(|a| a.id == id && a.organization_id == org)
            .cloned()
            .ok_or(RepoError::NotFound("Assessment"))
    }

    async fn list_assessments(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Assessment>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .assessments
            .iter()
            .filter(|a| {
                a.organization_id == org
                    && q.matches(&[&a.title, a.description.as_deref().unwrap_or("")])
            })
            .cloned()
            .collect();
        newest_first(&mut items, |a| a.created_at);
        Ok(paginate(items, q))
    }

    async fn update_assessment(
        &self,
        org: Uuid,
        id: Uuid,
        changes: AssessmentChanges,
    ) -> RepoResult<Assessment> {
        let mut store = self.store.write().await;
        let assessment = store
            .assessments
            .iter_mut()
            .find(|a| a.id == id && a.organization_id == org)
            .ok_or(RepoError::NotFound("Assessment"))?;
        set(&mut assessment.title, changes.title);
        if changes.description.is_some() {
            assessment.description = changes.description;
        }
        set(&mut assessment.passing_score, changes.passing_score);
        if changes.time_limit_minutes.is_some() {
            assessment.time_limit_minutes = changes.time_limit_minutes;
        }
        set(&mut assessment.max_attempts, changes.max_attempts);
        set(&mut assessment.status, changes.status);
        set(&mut assessment.questions, changes.questions);
        assessment.updated_at = Utc::now();
        Ok(assessment.clone())
    }

    async fn append_questions(
        &self,
        org: Uuid,
        id: Uuid,
        questions: Vec<AssessmentQuestion>,
    ) -> RepoResult<Assessment> {
        let mut store = self.store.write().await;
        let assessment = store
            .assessments
            .iter_mut()
            .find(|a| a.id == id && a.organization_id == org)
            .ok_or(RepoError::NotFound("Assessment"))?;
        assessment.questions.extend(questions);
        assessment.updated_at = Utc::now();
        Ok(assessment.clone())
    }

    async fn delete_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store
            .assessments
            .iter()
            .any(|a| a.id == id && a.organization_id == org)
        {
            return Err(RepoError::NotFound("Assessment"));
        }
        store.remove_content_refs(ContentType::Assessment, id);
        store.attempts.retain(|a| a.assessment_id != id);
        store.assessments.retain(|a| a.id != id);
        Ok(())
    }

    async fn record_attempt(
        &self,
        attempt: AssessmentAttempt,
        progress: &UserContentProgress,
    ) -> RepoResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .progress
            .iter_mut()
            .find(|p| p.id == progress.id)
            .ok_or(RepoError::NotFound("Progress record"))?;
        *slot = progress.clone();
        store.attempts.push(attempt);
        Ok(())
    }

    async fn create_survey(&self, survey: Survey) -> RepoResult<Survey> {
        let mut store = self.store.write().await;
        store.surveys.push(survey.clone());
        Ok(survey)
    }

    async fn get_survey(&self, org: Uuid, id: Uuid) -> RepoResult<Survey> {
        let store = self.store.read().await;
        store
            .surveys
            .iter()
            .find(|s| s.id == id && s.organization_id == org)
            .cloned()
            .ok_or(RepoError::NotFound("Survey"))
    }

    async fn list_surveys(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Survey>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .surveys
            .iter()
            .filter(|s| {
                s.organization_id == org
                    && q.matches(&[&s.title, s.description.as_deref().unwrap_or("")])
            })
            .cloned()
            .collect();
        newest_first(&mut items, |s| s.created_at);
        Ok(paginate(items, q))
    }

    async fn update_survey(
        &self,
        org: Uuid,
        id: Uuid,
        changes: SurveyChanges,
    ) -> RepoResult<Survey> {
        let mut store = self.store.write().await;
        let survey = store
            .surveys
            .iter_mut()
            .find(|s| s.id == id && s.organization_id == org)
            .ok_or(RepoError::NotFound("Survey"))?;
        set(&mut survey.title, changes.title);
        if changes.description.is_some() {
            survey.description = changes.description;
        }
        set(&mut survey.status, changes.status);
        set(&mut survey.sections, changes.sections);
        survey.updated_at = Utc::now();
        Ok(survey.clone())
    }

    async fn delete_survey(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store
            .surveys
            .iter()
            .any(|s| s.id == id && s.organization_id == org)
        {
            return Err(RepoError::NotFound("Survey"));
        }
        store.remove_content_refs(ContentType::Survey, id);
        store.responses.retain(|r| r.survey_id != id);
        store.surveys.retain(|s| s.id != id);
        Ok(())
    }

    async fn submit_survey_response(
        &self,
        response: SurveyResponse,
        progress: &UserContentProgress,
    ) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if store
            .responses
            .iter()
            .any(|r| r.progress_id == response.progress_id)
        {
            return Err(RepoError::Conflict(
                "A response has already been submitted".to_string(),
            ));
        }
        let slot = store
            .progress
            .iter_mut()
            .find(|p| p.id == progress.id)
            .ok_or(RepoError::NotFound("Progress record"))?;
        *slot = progress.clone();
        store.responses.push(response);
        Ok(())
    }

    async fn list_survey_responses(
        &self,
        survey_id: Uuid,
        q: &PageQuery,
    ) -> RepoResult<Page<SurveyResponseView>> {
        let items = self.all_survey_responses(survey_id).await?;
        let mut items: Vec<_> = items
            .into_iter()
            .filter(|r| q.matches(&[&r.user_name, &r.user_email]))
            .collect();
        newest_first(&mut items, |r| r.submitted_at);
        Ok(paginate(items, q))
    }

    async fn all_survey_responses(&self, survey_id: Uuid) -> RepoResult<Vec<SurveyResponseView>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .responses
            .iter()
            .filter(|r| r.survey_id == survey_id)
            .map(|r| {
                let user = store.users.iter().find(|u| u.id == r.user_id);
                SurveyResponseView {
                    id: r.id,
                    survey_id: r.survey_id,
                    user_id: r.user_id,
                    user_name: user.map(|u| u.name.clone()).unwrap_or_default(),
                    user_email: user.map(|u| u.email.clone()).unwrap_or_default(),
                    answers: r.answers.clone(),
                    submitted_at: r.submitted_at,
                }
            })
            .collect();
        items.sort_by_key(|r| r.submitted_at);
        Ok(items)
    }

    async fn create_learning_path(&self, path: LearningPath) -> RepoResult<LearningPath> {
        let mut store = self.store.write().await;
        store.paths.push(path.clone());
        Ok(path)
    }

    async fn get_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<LearningPath> {
        let store = self.store.read().await;
        store
            .paths
            .iter()
            .find(|p| p.id == id && p.organization_id == org)
            .cloned()
            .ok_or(RepoError::NotFound("Learning path"))
    }

    async fn list_learning_paths(
        &self,
        org: Uuid,
        q: &PageQuery,
    ) -> RepoResult<Page<LearningPath>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .paths
            .iter()
            .filter(|p| {
                p.organization_id == org
                    && q.matches(&[&p.title, p.description.as_deref().unwrap_or("")])
            })
            .cloned()
            .collect();
        newest_first(&mut items, |p| p.created_at);
        Ok(paginate(items, q))
    }

    async fn update_learning_path(
        &self,
        org: Uuid,
        id: Uuid,
        changes: LearningPathChanges,
    ) -> RepoResult<LearningPath> {
        let mut store = self.store.write().await;
        let path = store
            .paths
            .iter_mut()
            .find(|p| p.id == id && p.organization_id == org)
            .ok_or(RepoError::NotFound("Learning path"))?;
        set(&mut path.title, changes.title);
        if changes.description.is_some() {
            path.description = changes.description;
        }
        set(&mut path.enforce_order, changes.enforce_order);
        set(&mut path.status, changes.status);
        set(&mut path.lessons, changes.lessons);
        path.updated_at = Utc::now();
        Ok(path.clone())
    }

    async fn delete_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store
            .paths
            .iter()
            .any(|p| p.id == id && p.organization_id == org)
        {
            return Err(RepoError::NotFound("Learning path"));
        }
        store.remove_assignments(|a| {
            a.content_type == ContentType::LearningPath && a.content_id == id
        });
        store.paths.retain(|p| p.id != id);
        Ok(())
    }

    async fn create_assignment(
        &self,
        assignment: Assignment,
        progress: Vec<UserContentProgress>,
    ) -> RepoResult<Assignment> {
        let mut store = self.store.write().await;
        store.assignments.push(assignment.clone());
        store.progress.extend(progress);
        Ok(store.with_counts(&assignment))
    }

    async fn get_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<Assignment> {
        let store = self.store.read().await;
        store
            .assignments
            .iter()
            .find(|a| a.id == id && a.organization_id == org)
            .map(|a| store.with_counts(a))
            .ok_or(RepoError::NotFound("Assignment"))
    }

    async fn list_assignments(
        &self,
        org: Uuid,
        q: &PageQuery,
        content_type: Option<ContentType>,
    ) -> RepoResult<Page<Assignment>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .assignments
            .iter()
            .filter(|a| a.organization_id == org)
            .filter(|a| content_type.is_none_or(|ct| a.content_type == ct))
            .filter(|a| q.matches(&[&a.content_title]))
            .map(|a| store.with_counts(a))
            .collect();
        newest_first(&mut items, |a| a.created_at);
        Ok(paginate(items, q))
    }

    async fn assignment_progress(&self, assignment_id: Uuid) -> RepoResult<Vec<ProgressWithUser>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .progress
            .iter()
            .filter(|p| p.assignment_id == assignment_id)
            .map(|p| store.with_user(p))
            .collect();
        items.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        Ok(items)
    }

    async fn update_assignment_due_date(
        &self,
        org: Uuid,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
    ) -> RepoResult<Assignment> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        let assignment = store
            .assignments
            .iter_mut()
            .find(|a| a.id == id && a.organization_id == org)
            .ok_or(RepoError::NotFound("Assignment"))?;
        assignment.due_date = due_date;
        assignment.updated_at = now;
        let assignment = assignment.clone();
        for p in store.progress.iter_mut().filter(|p| p.assignment_id == id) {
            p.due_date = due_date;
            p.updated_at = now;
        }
        Ok(store.with_counts(&assignment))
    }

    async fn delete_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut store = self.store.write().await;
        if !store
            .assignments
            .iter()
            .any(|a| a.id == id && a.organization_id == org)
        {
            return Err(RepoError::NotFound("Assignment"));
        }
        store.remove_assignments(|a| a.id == id);
        Ok(())
    }

    async fn open_progress_user_ids(
        &self,
        org: Uuid,
        content_type: ContentType,
        content_id: Uuid,
    ) -> RepoResult<Vec<Uuid>> {
        let store = self.store.read().await;
        let mut seen = HashSet::new();
        Ok(store
            .progress
            .iter()
            .filter(|p| {
                p.organization_id == org
                    && p.content_type == content_type
                    && p.content_id == content_id
                    && p.status.is_open()
            })
            .map(|p| p.user_id)
            .filter(|u| seen.insert(*u))
            .collect())
    }

    async fn export_progress(
        &self,
        org: Uuid,
        assignment_id: Option<Uuid>,
    ) -> RepoResult<Vec<ProgressWithUser>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .progress
            .iter()
            .filter(|p| p.organization_id == org)
            .filter(|p| assignment_id.is_none_or(|a| p.assignment_id == a))
            .map(|p| store.with_user(p))
            .collect();
        items.sort_by(|a, b| {
            a.user_email
                .cmp(&b.user_email)
                .then(a.progress.created_at.cmp(&b.progress.created_at))
        });
        Ok(items)
    }

    async fn get_progress(&self, user_id: Uuid, id: Uuid) -> RepoResult<UserContentProgress> {
        let store = self.store.read().await;
        store
            .progress
            .iter()
            .find(|p| p.id == id && p.user_id == user_id)
            .cloned()
            .ok_or(RepoError::NotFound("Progress record"))
    }

    async fn list_user_progress(
        &self,
        user_id: Uuid,
        q: &PageQuery,
        status: Option<ProgressStatus>,
    ) -> RepoResult<Page<UserContentProgress>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .progress
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter(|p| status.is_none_or(|s| p.status == s))
            .filter(|p| q.matches(&[&p.content_title]))
            .cloned()
            .collect();
        newest_first(&mut items, |p| p.created_at);
        Ok(paginate(items, q))
    }

    async fn update_progress(&self, progress: &UserContentProgress) -> RepoResult<()> {
        let mut store = self.store.write().await;
        let slot = store
            .progress
            .iter_mut()
            .find(|p| p.id == progress.id)
            .ok_or(RepoError::NotFound("Progress record"))?;
        *slot = progress.clone();
        Ok(())
    }

    async fn org_progress(&self, org: Uuid) -> RepoResult<Vec<UserContentProgress>> {
        let store = self.store.read().await;
        Ok(store
            .progress
            .iter()
            .filter(|p| p.organization_id == org)
            .cloned()
            .collect())
    }

    async fn log_activity(&self, entry: ActivityLog) -> RepoResult<()> {
        let mut store = self.store.write().await;
        store.activity.push(entry);
        Ok(())
    }

    async fn list_activity(
        &self,
        org: Option<Uuid>,
        q: &PageQuery,
        entity_type: Option<String>,
    ) -> RepoResult<Page<ActivityLog>> {
        let store = self.store.read().await;
        let mut items: Vec<_> = store
            .activity
            .iter()
            .filter(|a| org.is_none() || a.organization_id == org)
            .filter(|a| entity_type.as_deref().is_none_or(|et| a.entity_type == et))
            .filter(|a| q.matches(&[&a.action]))
            .cloned()
            .collect();
        newest_first(&mut items, |a| a.created_at);
        Ok(paginate(items, q))
    }

    async fn org_counts(&self, org: Uuid) -> RepoResult<OrgCounts> {
        let store = self.store.read().await;
        let users = store
            .users
            .iter()
            .filter(|u| u.organization_id == Some(org));
        Ok(OrgCounts {
            total_users: users.clone().count() as i64,
            active_users: users.filter(|u| u.is_active).count() as i64,
            teams: store.teams.iter().filter(|t| t.organization_id == org).count() as i64,
            modules: store.modules.iter().filter(|m| m.organization_id == org).count() as i64,
            assessments: store
                .assessments
                .iter()
                .filter(|a| a.organization_id == org)
                .count() as i64,
            surveys: store.surveys.iter().filter(|s| s.organization_id == org).count() as i64,
            learning_paths: store.paths.iter().filter(|p| p.organization_id == org).count()
                as i64,
            assignments: store
                .assignments
                .iter()
                .filter(|a| a.organization_id == org)
                .count() as i64,
        })
    }

    async fn platform_counts(&self) -> RepoResult<PlatformCounts> {
        let store = self.store.read().await;
        Ok(PlatformCounts {
            organizations: store.organizations.len() as i64,
            active_organizations: store.organizations.iter().filter(|o| o.is_active).count()
                as i64,
            users: store.users.len() as i64,
            content_items: (store.modules.len()
                + store.assessments.len()
                + store.surveys.len()
                + store.paths.len()) as i64,
            assignments: store.assignments.len() as i64,
            progress_records: store.progress.len() as i64,
            completed_records: store
                .progress
                .iter()
                .filter(|p| p.status == ProgressStatus::Completed)
                .count() as i64,
        })
    }
}
