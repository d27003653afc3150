use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgRow, types::Json};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Page, RepoError, RepoResult, Repository};
use crate::models::{
    ActivityLog, Assessment, AssessmentAttempt, AssessmentChanges, AssessmentQuestion, Assignment,
    ContentStatus, ContentType, LearningPath, LearningPathChanges, Lesson, NewUser, OrgCounts,
    Organization, PlatformCounts, ProgressStatus, ProgressWithUser, Survey, SurveyChanges,
    SurveyQuestion, SurveyResponse, SurveyResponseView, SurveySection, Team, TrainingModule,
    UpdateModuleRequest, UpdateOrganizationRequest, UpdateTeamRequest, UserChanges,
    UserContentProgress, UserRecord,
};
use crate::response::PageQuery;

const USER_COLUMNS: &str =
    "id, organization_id, name, email, password_hash, role, is_active, created_at, updated_at";

const TEAM_SELECT: &str = r#"
    SELECT t.id, t.organization_id, t.parent_team_id, t.name, t.description, t.is_active,
           (SELECT COUNT(*) FROM team_members tm WHERE tm.team_id = t.id) AS member_count,
           t.created_at, t.updated_at
    FROM teams t
"#;

const ASSIGNMENT_SELECT: &str = r#"
    SELECT a.id, a.organization_id, a.content_type, a.content_id, a.content_title,
           a.assigned_by, a.due_date,
           (SELECT COUNT(*) FROM user_content_progress p WHERE p.assignment_id = a.id) AS total_users,
           (SELECT COUNT(*) FROM user_content_progress p
              WHERE p.assignment_id = a.id AND p.status = 'completed') AS completed_users,
           a.created_at, a.updated_at
    FROM assignments a
"#;

const PROGRESS_WITH_USER_SELECT: &str = r#"
    SELECT p.*, u.name AS user_name, u.email AS user_email
    FROM user_content_progress p
    JOIN users u ON u.id = p.user_id
"#;

/// Maps a unique violation to `Conflict(msg)`, anything else to `Database`.
fn conflict_on_unique(err: sqlx::Error, msg: impl Into<String>) -> RepoError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict(msg.into()),
        _ => RepoError::Database(err),
    }
}

/// `RowNotFound` becomes `NotFound(entity)`.
fn not_found(entity: &'static str) -> impl FnOnce(sqlx::Error) -> RepoError {
    move |err| match err {
        sqlx::Error::RowNotFound => RepoError::NotFound(entity),
        other => RepoError::Database(other),
    }
}

fn ensure_affected(rows: u64, entity: &'static str) -> RepoResult<()> {
    if rows == 0 {
        Err(RepoError::NotFound(entity))
    } else {
        Ok(())
    }
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Queries are built at runtime (`query_as` / `QueryBuilder`) so the crate compiles
/// without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// paged
    ///
    /// Runs `COUNT(*)` and the `LIMIT/OFFSET` select with the same `WHERE` clause.
    /// `filters` must push a clause starting with ` WHERE`.
    async fn paged<T>(
        &self,
        select: &str,
        from: &str,
        filters: impl Fn(&mut QueryBuilder<'static, Postgres>) + Send + Sync,
        order_by: &str,
        q: &PageQuery,
    ) -> RepoResult<Page<T>>
    where
        T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut count: QueryBuilder<'static, Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) {from}"));
        filters(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut rows: QueryBuilder<'static, Postgres> = QueryBuilder::new(select.to_string());
        filters(&mut rows);
        rows.push(" ORDER BY ").push(order_by);
        rows.push(" LIMIT ").push_bind(q.limit() as i64);
        rows.push(" OFFSET ")
            .push_bind(i64::try_from(q.offset()).unwrap_or(i64::MAX));
        let items = rows.build_query_as::<T>().fetch_all(&self.pool).await?;

        Ok((items, total))
    }

    async fn load_questions(&self, assessments: &mut [Assessment]) -> RepoResult<()> {
        let ids: Vec<Uuid> = assessments.iter().map(|a| a.id).collect();
        let questions = sqlx::query_as::<_, AssessmentQuestion>(
            "SELECT * FROM assessment_questions WHERE assessment_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<AssessmentQuestion>> = HashMap::new();
        for q in questions {
            grouped.entry(q.assessment_id).or_default().push(q);
        }
        for a in assessments {
            a.questions = grouped.remove(&a.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn load_sections(&self, surveys: &mut [Survey]) -> RepoResult<()> {
        let ids: Vec<Uuid> = surveys.iter().map(|s| s.id).collect();
        let sections = sqlx::query_as::<_, SurveySection>(
            "SELECT * FROM survey_sections WHERE survey_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let questions = sqlx::query_as::<_, SurveyQuestion>(
            "SELECT * FROM survey_questions WHERE survey_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_section: HashMap<Uuid, Vec<SurveyQuestion>> = HashMap::new();
        for q in questions {
            by_section.entry(q.section_id).or_default().push(q);
        }
        let mut by_survey: HashMap<Uuid, Vec<SurveySection>> = HashMap::new();
        for mut section in sections {
            section.questions = by_section.remove(&section.id).unwrap_or_default();
            by_survey.entry(section.survey_id).or_default().push(section);
        }
        for s in surveys {
            s.sections = by_survey.remove(&s.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn load_lessons(&self, paths: &mut [LearningPath]) -> RepoResult<()> {
        let ids: Vec<Uuid> = paths.iter().map(|p| p.id).collect();
        let lessons = sqlx::query_as::<_, Lesson>(
            "SELECT * FROM learning_path_lessons WHERE learning_path_id = ANY($1) ORDER BY position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Lesson>> = HashMap::new();
        for l in lessons {
            grouped.entry(l.learning_path_id).or_default().push(l);
        }
        for p in paths {
            p.lessons = grouped.remove(&p.id).unwrap_or_default();
        }
        Ok(())
    }
}

async fn insert_questions(
    tx: &mut sqlx::PgConnection,
    questions: &[AssessmentQuestion],
) -> Result<(), sqlx::Error> {
    for q in questions {
        sqlx::query(
            r#"
            INSERT INTO assessment_questions
                (id, assessment_id, position, prompt, options, correct_option, points)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(q.id)
        .bind(q.assessment_id)
        .bind(q.position)
        .bind(&q.prompt)
        .bind(&q.options)
        .bind(q.correct_option)
        .bind(q.points)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

async fn insert_sections(
    tx: &mut sqlx::PgConnection,
    sections: &[SurveySection],
) -> Result<(), sqlx::Error> {
    for section in sections {
        sqlx::query(
            "INSERT INTO survey_sections (id, survey_id, position, title) VALUES ($1, $2, $3, $4)",
        )
        .bind(section.id)
        .bind(section.survey_id)
        .bind(section.position)
        .bind(&section.title)
        .execute(&mut *tx)
        .await?;

        for q in &section.questions {
            sqlx::query(
                r#"
                INSERT INTO survey_questions
                    (id, survey_id, section_id, position, prompt, kind, options, required)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(q.id)
            .bind(q.survey_id)
            .bind(q.section_id)
            .bind(q.position)
            .bind(&q.prompt)
            .bind(q.kind)
            .bind(&q.options)
            .bind(q.required)
            .execute(&mut *tx)
            .await?;
        }
    }
    Ok(())
}

async fn insert_lessons(tx: &mut sqlx::PgConnection, lessons: &[Lesson]) -> Result<(), sqlx::Error> {
    for l in lessons {
        sqlx::query(
            r#"
            INSERT INTO learning_path_lessons
                (id, learning_path_id, position, title, content_type, content_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(l.id)
        .bind(l.learning_path_id)
        .bind(l.position)
        .bind(&l.title)
        .bind(l.content_type)
        .bind(l.content_id)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

async fn insert_user(tx: &mut sqlx::PgConnection, user: &NewUser) -> Result<(), sqlx::Error> {
    let r = &user.record;
    sqlx::query(
        r#"
        INSERT INTO users
            (id, organization_id, name, email, password_hash, role, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(r.id)
    .bind(r.organization_id)
    .bind(&r.name)
    .bind(&r.email)
    .bind(&r.password_hash)
    .bind(r.role)
    .bind(r.is_active)
    .bind(r.created_at)
    .bind(r.updated_at)
    .execute(&mut *tx)
    .await?;

    for team_id in &user.team_ids {
        sqlx::query("INSERT INTO team_members (team_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(team_id)
            .bind(r.id)
            .execute(&mut *tx)
            .await?;
    }
    Ok(())
}

async fn write_progress(
    conn: &mut sqlx::PgConnection,
    p: &UserContentProgress,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE user_content_progress
        SET status = $2, progress_percent = $3, completed_lessons = $4, score = $5,
            attempts = $6, due_date = $7, started_at = $8, completed_at = $9, updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(p.id)
    .bind(p.status)
    .bind(p.progress_percent)
    .bind(&p.completed_lessons)
    .bind(p.score)
    .bind(p.attempts)
    .bind(p.due_date)
    .bind(p.started_at)
    .bind(p.completed_at)
    .bind(p.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes assignments (and through them, progress) of a content item and lessons
/// pointing at it.
async fn delete_content_refs(
    tx: &mut sqlx::PgConnection,
    content_type: ContentType,
    content_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM assignments WHERE content_type = $1 AND content_id = $2")
        .bind(content_type)
        .bind(content_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM learning_path_lessons WHERE content_type = $1 AND content_id = $2")
        .bind(content_type)
        .bind(content_id)
        .execute(&mut *tx)
        .await?;
    Ok(())
}

fn push_search(b: &mut QueryBuilder<'static, Postgres>, pattern: &Option<String>, columns: &[&str]) {
    if let Some(p) = pattern {
        b.push(" AND (");
        for (idx, column) in columns.iter().enumerate() {
            if idx > 0 {
                b.push(" OR ");
            }
            b.push(*column)
                .push(" ILIKE ")
                .push_bind(p.clone())
                .push(r" ESCAPE '\'");
        }
        b.push(")");
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_organization(&self, org: Organization) -> RepoResult<Organization> {
        sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (id, name, slug, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(org.id)
        .bind(&org.name)
        .bind(&org.slug)
        .bind(org.is_active)
        .bind(org.created_at)
        .bind(org.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("Organization slug '{}' is already in use", org.slug))
        })
    }

    async fn get_organization(&self, id: Uuid) -> RepoResult<Organization> {
        sqlx::query_as::<_, Organization>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found("Organization"))
    }

    async fn list_organizations(&self, q: &PageQuery) -> RepoResult<Page<Organization>> {
        let pattern = q.search_pattern();
        self.paged(
            "SELECT * FROM organizations o",
            "FROM organizations o",
            |b| {
                b.push(" WHERE TRUE");
                push_search(b, &pattern, &["o.name", "o.slug"]);
            },
            "o.created_at DESC",
            q,
        )
        .await
    }

    async fn update_organization(
        &self,
        id: Uuid,
        changes: UpdateOrganizationRequest,
    ) -> RepoResult<Organization> {
        let slug = changes.slug.clone().unwrap_or_default();
        sqlx::query_as::<_, Organization>(
            r#"
            UPDATE organizations
            SET name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                is_active = COALESCE($4, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.slug)
        .bind(changes.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepoError::NotFound("Organization"),
            other => conflict_on_unique(other, format!("Organization slug '{slug}' is already in use")),
        })
    }

    /// delete_organization
    ///
    /// Every tenant table references `organizations` with `ON DELETE CASCADE`, so one
    /// statement removes users, teams, content, assignments, progress and activity.
    async fn delete_organization(&self, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Organization")
    }

    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord> {
        let mut tx = self.pool.begin().await?;
        insert_user(&mut tx, &user).await.map_err(|e| {
            conflict_on_unique(e, format!("Email '{}' is already registered", user.record.email))
        })?;
        tx.commit().await?;
        Ok(user.record)
    }

    async fn create_users(&self, users: Vec<NewUser>) -> RepoResult<usize> {
        let mut tx = self.pool.begin().await?;
        for user in &users {
            insert_user(&mut tx, user).await.map_err(|e| {
                conflict_on_unique(e, format!("Email '{}' is already registered", user.record.email))
            })?;
        }
        tx.commit().await?;
        Ok(users.len())
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found("User"))
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        Ok(sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_org_user(&self, org: Uuid, id: Uuid) -> RepoResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND organization_id = $2"
        ))
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("User"))
    }

    async fn list_users(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<UserRecord>> {
        let pattern = q.search_pattern();
        self.paged(
            &format!("SELECT {USER_COLUMNS} FROM users u"),
            "FROM users u",
            |b| {
                b.push(" WHERE u.organization_id = ").push_bind(org);
                push_search(b, &pattern, &["u.name", "u.email"]);
            },
            "u.created_at DESC",
            q,
        )
        .await
    }

    async fn all_users(&self, org: Uuid) -> RepoResult<Vec<UserRecord>> {
        Ok(sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 ORDER BY created_at"
        ))
        .bind(org)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_user(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UserChanges,
    ) -> RepoResult<UserRecord> {
        let email = changes.email.clone().unwrap_or_default();
        sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($3, name),
                email = COALESCE($4, email),
                role = COALESCE($5, role),
                is_active = COALESCE($6, is_active),
                password_hash = COALESCE($7, password_hash),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(org)
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.role)
        .bind(changes.is_active)
        .bind(changes.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepoError::NotFound("User"),
            other => conflict_on_unique(other, format!("Email '{email}' is already registered")),
        })
    }

    async fn delete_user(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "User")
    }

    async fn user_team_ids(&self, user_ids: &[Uuid]) -> RepoResult<Vec<(Uuid, Uuid)>> {
        Ok(sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT user_id, team_id FROM team_members WHERE user_id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_team(&self, team: Team) -> RepoResult<Team> {
        sqlx::query(
            r#"
            INSERT INTO teams
                (id, organization_id, parent_team_id, name, description, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(team.id)
        .bind(team.organization_id)
        .bind(team.parent_team_id)
        .bind(&team.name)
        .bind(&team.description)
        .bind(team.is_active)
        .bind(team.created_at)
        .bind(team.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("A team named '{}' already exists here", team.name))
        })?;
        Ok(team)
    }

    async fn get_team(&self, org: Uuid, id: Uuid) -> RepoResult<Team> {
        sqlx::query_as::<_, Team>(&format!(
            "{TEAM_SELECT} WHERE t.id = $1 AND t.organization_id = $2"
        ))
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Team"))
    }

    async fn list_teams(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Team>> {
        let pattern = q.search_pattern();
        self.paged(
            TEAM_SELECT,
            "FROM teams t",
            |b| {
                b.push(" WHERE t.organization_id = ").push_bind(org);
                push_search(b, &pattern, &["t.name", "t.description"]);
            },
            "t.created_at DESC",
            q,
        )
        .await
    }

    async fn all_teams(&self, org: Uuid) -> RepoResult<Vec<Team>> {
        Ok(sqlx::query_as::<_, Team>(&format!(
            "{TEAM_SELECT} WHERE t.organization_id = $1 ORDER BY t.name"
        ))
        .bind(org)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn sub_teams(&self, org: Uuid, parent_id: Uuid) -> RepoResult<Vec<Team>> {
        Ok(sqlx::query_as::<_, Team>(&format!(
            "{TEAM_SELECT} WHERE t.organization_id = $1 AND t.parent_team_id = $2 ORDER BY t.name"
        ))
        .bind(org)
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_team(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UpdateTeamRequest,
    ) -> RepoResult<Team> {
        let name = changes.name.clone().unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE teams
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                is_active = COALESCE($5, is_active),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("A team named '{name}' already exists here")))?;
        ensure_affected(result.rows_affected(), "Team")?;
        self.get_team(org, id).await
    }

    /// Sub-teams reference their parent with `ON DELETE CASCADE`; memberships follow.
    async fn delete_team(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Team")
    }

    async fn add_team_members(&self, team_id: Uuid, user_ids: &[Uuid]) -> RepoResult<usize> {
        let result = sqlx::query(
            r#"
            INSERT INTO team_members (team_id, user_id)
            SELECT $1, u FROM UNNEST($2::uuid[]) AS u
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(team_id)
        .bind(user_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn remove_team_member(&self, team_id: Uuid, user_id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
            .bind(team_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Team member")
    }

    async fn team_members(&self, team_id: Uuid) -> RepoResult<Vec<UserRecord>> {
        Ok(sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT u.id, u.organization_id, u.name, u.email, u.password_hash, u.role,
                   u.is_active, u.created_at, u.updated_at
            FROM users u
            JOIN team_members tm ON tm.user_id = u.id
            WHERE tm.team_id = $1
            ORDER BY u.name
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn team_member_ids(&self, team_ids: &[Uuid]) -> RepoResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT tm.user_id
            FROM team_members tm
            JOIN users u ON u.id = tm.user_id
            WHERE tm.team_id = ANY($1) AND u.is_active
            "#,
        )
        .bind(team_ids)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_module(&self, m: TrainingModule) -> RepoResult<TrainingModule> {
        Ok(sqlx::query_as::<_, TrainingModule>(
            r#"
            INSERT INTO modules
                (id, organization_id, title, description, content, resource_key,
                 duration_minutes, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(m.id)
        .bind(m.organization_id)
        .bind(&m.title)
        .bind(&m.description)
        .bind(&m.content)
        .bind(&m.resource_key)
        .bind(m.duration_minutes)
        .bind(m.status)
        .bind(m.created_by)
        .bind(m.created_at)
        .bind(m.updated_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_module(&self, org: Uuid, id: Uuid) -> RepoResult<TrainingModule> {
        sqlx::query_as::<_, TrainingModule>(
            "SELECT * FROM modules WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Module"))
    }

    async fn list_modules(
        &self,
        org: Uuid,
        q: &PageQuery,
        status: Option<ContentStatus>,
    ) -> RepoResult<Page<TrainingModule>> {
        let pattern = q.search_pattern();
        self.paged(
            "SELECT * FROM modules m",
            "FROM modules m",
            |b| {
                b.push(" WHERE m.organization_id = ").push_bind(org);
                if let Some(status) = status {
                    b.push(" AND m.status = ").push_bind(status);
                }
                push_search(b, &pattern, &["m.title", "m.description"]);
            },
            "m.created_at DESC",
            q,
        )
        .await
    }

    async fn update_module(
        &self,
        org: Uuid,
        id: Uuid,
        changes: UpdateModuleRequest,
    ) -> RepoResult<TrainingModule> {
        sqlx::query_as::<_, TrainingModule>(
            r#"
            UPDATE modules
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                content = COALESCE($5, content),
                duration_minutes = COALESCE($6, duration_minutes),
                status = COALESCE($7, status),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.content)
        .bind(changes.duration_minutes)
        .bind(changes.status)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Module"))
    }

    async fn set_module_resource(
        &self,
        org: Uuid,
        id: Uuid,
        resource_key: &str,
    ) -> RepoResult<TrainingModule> {
        sqlx::query_as::<_, TrainingModule>(
            r#"
            UPDATE modules SET resource_key = $3, updated_at = now()
            WHERE id = $1 AND organization_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(resource_key)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Module"))
    }

    async fn delete_module(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM modules WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&mut *tx)
            .await?;
        ensure_affected(result.rows_affected(), "Module")?;
        delete_content_refs(&mut tx, ContentType::Module, id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_assessment(&self, a: Assessment) -> RepoResult<Assessment> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO assessments
                (id, organization_id, title, description, passing_score, time_limit_minutes,
                 max_attempts, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(a.id)
        .bind(a.organization_id)
        .bind(&a.title)
        .bind(&a.description)
        .bind(a.passing_score)
        .bind(a.time_limit_minutes)
        .bind(a.max_attempts)
        .bind(a.status)
        .bind(a.created_by)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&mut *tx)
        .await?;
        insert_questions(&mut tx, &a.questions).await?;
        tx.commit().await?;
        Ok(a)
    }

    async fn get_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<Assessment> {
        let assessment = sqlx::query_as::<_, Assessment>(
            "SELECT * FROM assessments WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Assessment"))?;
        let mut items = [assessment];
        self.load_questions(&mut items).await?;
        let [assessment] = items;
        Ok(assessment)
    }

    async fn list_assessments(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Assessment>> {
        let pattern = q.search_pattern();
        let (mut items, total) = self
            .paged(
                "SELECT * FROM assessments a",
                "FROM assessments a",
                |b| {
                    b.push(" WHERE a.organization_id = ").push_bind(org);
                    push_search(b, &pattern, &["a.title", "a.description"]);
                },
                "a.created_at DESC",
                q,
            )
            .await?;
        self.load_questions(&mut items).await?;
        Ok((items, total))
    }

    async fn update_assessment(
        &self,
        org: Uuid,
        id: Uuid,
        changes: AssessmentChanges,
    ) -> RepoResult<Assessment> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE assessments
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                passing_score = COALESCE($5, passing_score),
                time_limit_minutes = COALESCE($6, time_limit_minutes),
                max_attempts = COALESCE($7, max_attempts),
                status = COALESCE($8, status),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.passing_score)
        .bind(changes.time_limit_minutes)
        .bind(changes.max_attempts)
        .bind(changes.status)
        .execute(&mut *tx)
        .await?;
        ensure_affected(result.rows_affected(), "Assessment")?;

        if let Some(questions) = &changes.questions {
            sqlx::query("DELETE FROM assessment_questions WHERE assessment_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_questions(&mut tx, questions).await?;
        }
        tx.commit().await?;
        self.get_assessment(org, id).await
    }

    async fn append_questions(
        &self,
        org: Uuid,
        id: Uuid,
        questions: Vec<AssessmentQuestion>,
    ) -> RepoResult<Assessment> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE assessments SET updated_at = now() WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .execute(&mut *tx)
        .await?;
        ensure_affected(result.rows_affected(), "Assessment")?;
        insert_questions(&mut tx, &questions).await?;
        tx.commit().await?;
        self.get_assessment(org, id).await
    }

    async fn delete_assessment(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM assessments WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&mut *tx)
            .await?;
        ensure_affected(result.rows_affected(), "Assessment")?;
        delete_content_refs(&mut tx, ContentType::Assessment, id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_attempt(
        &self,
        attempt: AssessmentAttempt,
        progress: &UserContentProgress,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO assessment_attempts
                (id, progress_id, assessment_id, user_id, answers, score, passed, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.progress_id)
        .bind(attempt.assessment_id)
        .bind(attempt.user_id)
        .bind(&attempt.answers)
        .bind(attempt.score)
        .bind(attempt.passed)
        .bind(attempt.submitted_at)
        .execute(&mut *tx)
        .await?;
        let updated = write_progress(&mut tx, progress).await?;
        ensure_affected(updated, "Progress record")?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_survey(&self, s: Survey) -> RepoResult<Survey> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO surveys
                (id, organization_id, title, description, status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(s.id)
        .bind(s.organization_id)
        .bind(&s.title)
        .bind(&s.description)
        .bind(s.status)
        .bind(s.created_by)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&mut *tx)
        .await?;
        insert_sections(&mut tx, &s.sections).await?;
        tx.commit().await?;
        Ok(s)
    }

    async fn get_survey(&self, org: Uuid, id: Uuid) -> RepoResult<Survey> {
        let survey = sqlx::query_as::<_, Survey>(
            "SELECT * FROM surveys WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Survey"))?;
        let mut items = [survey];
        self.load_sections(&mut items).await?;
        let [survey] = items;
        Ok(survey)
    }

    async fn list_surveys(&self, org: Uuid, q: &PageQuery) -> RepoResult<Page<Survey>> {
        let pattern = q.search_pattern();
        let (mut items, total) = self
            .paged(
                "SELECT * FROM surveys s",
                "FROM surveys s",
                |b| {
                    b.push(" WHERE s.organization_id = ").push_bind(org);
                    push_search(b, &pattern, &["s.title", "s.description"]);
                },
                "s.created_at DESC",
                q,
            )
            .await?;
        self.load_sections(&mut items).await?;
        Ok((items, total))
    }

    async fn update_survey(
        &self,
        org: Uuid,
        id: Uuid,
        changes: SurveyChanges,
    ) -> RepoResult<Survey> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE surveys
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.status)
        .execute(&mut *tx)
        .await?;
        ensure_affected(result.rows_affected(), "Survey")?;

        if let Some(sections) = &changes.sections {
            // Questions go with their sections (ON DELETE CASCADE).
            sqlx::query("DELETE FROM survey_sections WHERE survey_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_sections(&mut tx, sections).await?;
        }
        tx.commit().await?;
        self.get_survey(org, id).await
    }

    async fn delete_survey(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM surveys WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&mut *tx)
            .await?;
        ensure_affected(result.rows_affected(), "Survey")?;
        delete_content_refs(&mut tx, ContentType::Survey, id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn submit_survey_response(
        &self,
        response: SurveyResponse,
        progress: &UserContentProgress,
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO survey_responses (id, survey_id, progress_id, user_id, answers, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(response.id)
        .bind(response.survey_id)
        .bind(response.progress_id)
        .bind(response.user_id)
        .bind(Json(&response.answers))
        .bind(response.submitted_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "A response has already been submitted"))?;
        let updated = write_progress(&mut tx, progress).await?;
        ensure_affected(updated, "Progress record")?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_survey_responses(
        &self,
        survey_id: Uuid,
        q: &PageQuery,
    ) -> RepoResult<Page<SurveyResponseView>> {
        let pattern = q.search_pattern();
        self.paged(
            r#"
            SELECT r.id, r.survey_id, r.user_id, u.name AS user_name, u.email AS user_email,
                   r.answers, r.submitted_at
            FROM survey_responses r JOIN users u ON u.id = r.user_id
            "#,
            "FROM survey_responses r JOIN users u ON u.id = r.user_id",
            |b| {
                b.push(" WHERE r.survey_id = ").push_bind(survey_id);
                push_search(b, &pattern, &["u.name", "u.email"]);
            },
            "r.submitted_at DESC",
            q,
        )
        .await
    }

    async fn all_survey_responses(&self, survey_id: Uuid) -> RepoResult<Vec<SurveyResponseView>> {
        Ok(sqlx::query_as::<_, SurveyResponseView>(
            r#"
            SELECT r.id, r.survey_id, r.user_id, u.name AS user_name, u.email AS user_email,
                   r.answers, r.submitted_at
            FROM survey_responses r JOIN users u ON u.id = r.user_id
            WHERE r.survey_id = $1
            ORDER BY r.submitted_at
            "#,
        )
        .bind(survey_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_learning_path(&self, p: LearningPath) -> RepoResult<LearningPath> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO learning_paths
                (id, organization_id, title, description, enforce_order, status, created_by,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(p.id)
        .bind(p.organization_id)
        .bind(&p.title)
        .bind(&p.description)
        .bind(p.enforce_order)
        .bind(p.status)
        .bind(p.created_by)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut *tx)
        .await?;
        insert_lessons(&mut tx, &p.lessons).await?;
        tx.commit().await?;
        Ok(p)
    }

    async fn get_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<LearningPath> {
        let path = sqlx::query_as::<_, LearningPath>(
            "SELECT * FROM learning_paths WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Learning path"))?;
        let mut items = [path];
        self.load_lessons(&mut items).await?;
        let [path] = items;
        Ok(path)
    }

    async fn list_learning_paths(
        &self,
        org: Uuid,
        q: &PageQuery,
    ) -> RepoResult<Page<LearningPath>> {
        let pattern = q.search_pattern();
        let (mut items, total) = self
            .paged(
                "SELECT * FROM learning_paths lp",
                "FROM learning_paths lp",
                |b| {
                    b.push(" WHERE lp.organization_id = ").push_bind(org);
                    push_search(b, &pattern, &["lp.title", "lp.description"]);
                },
                "lp.created_at DESC",
                q,
            )
            .await?;
        self.load_lessons(&mut items).await?;
        Ok((items, total))
    }

    async fn update_learning_path(
        &self,
        org: Uuid,
        id: Uuid,
        changes: LearningPathChanges,
    ) -> RepoResult<LearningPath> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE learning_paths
            SET title = COALESCE($3, title),
                description = COALESCE($4, description),
                enforce_order = COALESCE($5, enforce_order),
                status = COALESCE($6, status),
                updated_at = now()
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id)
        .bind(org)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.enforce_order)
        .bind(changes.status)
        .execute(&mut *tx)
        .await?;
        ensure_affected(result.rows_affected(), "Learning path")?;

        if let Some(lessons) = &changes.lessons {
            sqlx::query("DELETE FROM learning_path_lessons WHERE learning_path_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_lessons(&mut tx, lessons).await?;
        }
        tx.commit().await?;
        self.get_learning_path(org, id).await
    }

    async fn delete_learning_path(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("DELETE FROM learning_paths WHERE id = $1 AND organization_id = $2")
                .bind(id)
                .bind(org)
                .execute(&mut *tx)
                .await?;
        ensure_affected(result.rows_affected(), "Learning path")?;
        sqlx::query("DELETE FROM assignments WHERE content_type = 'learning_path' AND content_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_assignment(
        &self,
        a: Assignment,
        progress: Vec<UserContentProgress>,
    ) -> RepoResult<Assignment> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO assignments
                (id, organization_id, content_type, content_id, content_title, assigned_by,
                 due_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(a.id)
        .bind(a.organization_id)
        .bind(a.content_type)
        .bind(a.content_id)
        .bind(&a.content_title)
        .bind(a.assigned_by)
        .bind(a.due_date)
        .bind(a.created_at)
        .bind(a.updated_at)
        .execute(&mut *tx)
        .await?;

        for p in &progress {
            sqlx::query(
                r#"
                INSERT INTO user_content_progress
                    (id, organization_id, user_id, assignment_id, content_type, content_id,
                     content_title, status, progress_percent, completed_lessons, score, attempts,
                     due_date, started_at, completed_at, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
                "#,
            )
            .bind(p.id)
            .bind(p.organization_id)
            .bind(p.user_id)
            .bind(p.assignment_id)
            .bind(p.content_type)
            .bind(p.content_id)
            .bind(&p.content_title)
            .bind(p.status)
            .bind(p.progress_percent)
            .bind(&p.completed_lessons)
            .bind(p.score)
            .bind(p.attempts)
            .bind(p.due_date)
            .bind(p.started_at)
            .bind(p.completed_at)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        self.get_assignment(a.organization_id, a.id).await
    }

    async fn get_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<Assignment> {
        sqlx::query_as::<_, Assignment>(&format!(
            "{ASSIGNMENT_SELECT} WHERE a.id = $1 AND a.organization_id = $2"
        ))
        .bind(id)
        .bind(org)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Assignment"))
    }

    async fn list_assignments(
        &self,
        org: Uuid,
        q: &PageQuery,
        content_type: Option<ContentType>,
    ) -> RepoResult<Page<Assignment>> {
        let pattern = q.search_pattern();
        self.paged(
            ASSIGNMENT_SELECT,
            "FROM assignments a",
            |b| {
                b.push(" WHERE a.organization_id = ").push_bind(org);
                if let Some(ct) = content_type {
                    b.push(" AND a.content_type = ").push_bind(ct);
                }
                push_search(b, &pattern, &["a.content_title"]);
            },
            "a.created_at DESC",
            q,
        )
        .await
    }

    async fn assignment_progress(&self, assignment_id: Uuid) -> RepoResult<Vec<ProgressWithUser>> {
        Ok(sqlx::query_as::<_, ProgressWithUser>(&format!(
            "{PROGRESS_WITH_USER_SELECT} WHERE p.assignment_id = $1 ORDER BY u.name"
        ))
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_assignment_due_date(
        &self,
        org: Uuid,
        id: Uuid,
        due_date: Option<DateTime<Utc>>,
    ) -> RepoResult<Assignment> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE assignments SET due_date = $3, updated_at = now() WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org)
        .bind(due_date)
        .execute(&mut *tx)
        .await?;
        ensure_affected(result.rows_affected(), "Assignment")?;
        sqlx::query(
            "UPDATE user_content_progress SET due_date = $2, updated_at = now() WHERE assignment_id = $1",
        )
        .bind(id)
        .bind(due_date)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        self.get_assignment(org, id).await
    }

    async fn delete_assignment(&self, org: Uuid, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1 AND organization_id = $2")
            .bind(id)
            .bind(org)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "Assignment")
    }

    async fn open_progress_user_ids(
        &self,
        org: Uuid,
        content_type: ContentType,
        content_id: Uuid,
    ) -> RepoResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT DISTINCT user_id FROM user_content_progress
            WHERE organization_id = $1 AND content_type = $2 AND content_id = $3
              AND status IN ('not_started', 'in_progress')
            "#,
        )
        .bind(org)
        .bind(content_type)
        .bind(content_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn export_progress(
        &self,
        org: Uuid,
        assignment_id: Option<Uuid>,
    ) -> RepoResult<Vec<ProgressWithUser>> {
        Ok(sqlx::query_as::<_, ProgressWithUser>(&format!(
            r#"
            {PROGRESS_WITH_USER_SELECT}
            WHERE p.organization_id = $1 AND ($2::uuid IS NULL OR p.assignment_id = $2)
            ORDER BY u.email, p.created_at
            "#
        ))
        .bind(org)
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn get_progress(&self, user_id: Uuid, id: Uuid) -> RepoResult<UserContentProgress> {
        sqlx::query_as::<_, UserContentProgress>(
            "SELECT * FROM user_content_progress WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found("Progress record"))
    }

    async fn list_user_progress(
        &self,
        user_id: Uuid,
        q: &PageQuery,
        status: Option<ProgressStatus>,
    ) -> RepoResult<Page<UserContentProgress>> {
        let pattern = q.search_pattern();
        self.paged(
            "SELECT * FROM user_content_progress p",
            "FROM user_content_progress p",
            |b| {
                b.push(" WHERE p.user_id = ").push_bind(user_id);
                if let Some(status) = status {
                    b.push(" AND p.status = ").push_bind(status);
                }
                push_search(b, &pattern, &["p.content_title"]);
            },
            "p.created_at DESC",
            q,
        )
        .await
    }

    async fn update_progress(&self, progress: &UserContentProgress) -> RepoResult<()> {
        let mut conn = self.pool.acquire().await?;
        let updated = write_progress(&mut conn, progress).await?;
        ensure_affected(updated, "Progress record")
    }

    async fn org_progress(&self, org: Uuid) -> RepoResult<Vec<UserContentProgress>> {
        Ok(sqlx::query_as::<_, UserContentProgress>(
            "SELECT * FROM user_content_progress WHERE organization_id = $1",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn log_activity(&self, entry: ActivityLog) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_logs
                (id, organization_id, actor_id, action, entity_type, entity_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(entry.organization_id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_activity(
        &self,
        org: Option<Uuid>,
        q: &PageQuery,
        entity_type: Option<String>,
    ) -> RepoResult<Page<ActivityLog>> {
        let pattern = q.search_pattern();
        self.paged(
            "SELECT * FROM activity_logs l",
            "FROM activity_logs l",
            |b| {
                b.push(" WHERE TRUE");
                if let Some(org) = org {
                    b.push(" AND l.organization_id = ").push_bind(org);
                }
                if let Some(et) = &entity_type {
                    b.push(" AND l.entity_type = ").push_bind(et.clone());
                }
                push_search(b, &pattern, &["l.action"]);
            },
            "l.created_at DESC",
            q,
        )
        .await
    }

    async fn org_counts(&self, org: Uuid) -> RepoResult<OrgCounts> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE organization_id = $1),
                (SELECT COUNT(*) FROM users WHERE organization_id = $1 AND is_active),
                (SELECT COUNT(*) FROM teams WHERE organization_id = $1),
                (SELECT COUNT(*) FROM modules WHERE organization_id = $1),
                (SELECT COUNT(*) FROM assessments WHERE organization_id = $1),
                (SELECT COUNT(*) FROM surveys WHERE organization_id = $1),
                (SELECT COUNT(*) FROM learning_paths WHERE organization_id = $1),
                (SELECT COUNT(*) FROM assignments WHERE organization_id = $1)
            "#,
        )
        .bind(org)
        .fetch_one(&self.pool)
        .await?;

        Ok(OrgCounts {
            total_users: row.0,
            active_users: row.1,
            teams: row.2,
            modules: row.3,
            assessments: row.4,
            surveys: row.5,
            learning_paths: row.6,
            assignments: row.7,
        })
    }

    async fn platform_counts(&self) -> RepoResult<PlatformCounts> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM organizations),
                (SELECT COUNT(*) FROM organizations WHERE is_active),
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM modules) + (SELECT COUNT(*) FROM assessments)
                    + (SELECT COUNT(*) FROM surveys) + (SELECT COUNT(*) FROM learning_paths),
                (SELECT COUNT(*) FROM assignments),
                (SELECT COUNT(*) FROM user_content_progress),
                (SELECT COUNT(*) FROM user_content_progress WHERE status = 'completed')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PlatformCounts {
            organizations: row.0,
            active_organizations: row.1,
            users: row.2,
            content_items: row.3,
            assignments: row.4,
            progress_records: row.5,
            completed_records: row.6,
        })
    }
}
