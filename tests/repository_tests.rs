//! Postgres-backed repository checks. They need a reachable database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::Utc;
use lms_portal::{
    models::{NewUser, Organization, Role, Team, UserRecord, slugify},
    repository::{PostgresRepository, RepoError, Repository},
    response::PageQuery,
};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

async fn create_org(repo: &PostgresRepository) -> Organization {
    let now = Utc::now();
    let name = format!("Org {}", Uuid::new_v4());
    repo.create_organization(Organization {
        id: Uuid::new_v4(),
        slug: slugify(&name),
        name,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
    .await
    .expect("Failed to create organization")
}

fn new_user(org: Uuid, email: &str) -> NewUser {
    let now = Utc::now();
    NewUser {
        record: UserRecord {
            id: Uuid::new_v4(),
            organization_id: Some(org),
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "not-a-real-hash".to_string(),
            role: Role::User,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
        team_ids: Vec::new(),
    }
}

#[tokio::test]
#[ignore = "requires Postgres (DATABASE_URL)"]
#[serial]
async fn test_users_and_teams_roundtrip() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = create_org(&repo).await;

    let email = format!("{}@pg.test", Uuid::new_v4());
    let user = repo.create_user(new_user(org.id, &email)).await.unwrap();
    let found = repo
        .get_user_by_email(&email.to_uppercase())
        .await
        .unwrap()
        .expect("lookup is case-insensitive");
    assert_eq!(found.id, user.id);

    let duplicate = repo.create_user(new_user(org.id, &email)).await;
    assert!(matches!(duplicate, Err(RepoError::Conflict(_))));

    let now = Utc::now();
    let team = repo
        .create_team(Team {
            id: Uuid::new_v4(),
            organization_id: org.id,
            parent_team_id: None,
            name: "Platform".to_string(),
            description: None,
            is_active: true,
            member_count: 0,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    assert_eq!(repo.add_team_members(team.id, &[user.id]).await.unwrap(), 1);
    assert_eq!(repo.add_team_members(team.id, &[user.id]).await.unwrap(), 0);
    assert_eq!(repo.get_team(org.id, team.id).await.unwrap().member_count, 1);

    let (users, total) = repo
        .list_users(org.id, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(users[0].id, user.id);

    // Deleting the organization removes everything it owns.
    repo.delete_organization(org.id).await.unwrap();
    assert!(matches!(
        repo.get_user(user.id).await,
        Err(RepoError::NotFound(_))
    ));
}
