use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_enum, decode_time, decode_uuid, encode_time};
use crate::models::{Account, PlanTier};

pub struct AccountRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    user_id: String,
    plan: String,
    max_projects: i64,
    created_at: String,
}

impl TryFrom<AccountRow> for Account {
    type Error = sqlx::Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: decode_uuid(&row.id)?,
            user_id: row.user_id,
            plan: decode_enum(&row.plan)?,
            max_projects: row.max_projects,
            created_at: decode_time(&row.created_at)?,
        })
    }
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the user's account, creating a free-tier one on first access.
    pub async fn ensure(
        &self,
        user_id: &str,
        free_max_projects: i64,
    ) -> Result<Account, sqlx::Error> {
        let candidate = Account::new(user_id, free_max_projects);

        let inserted = sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, plan, max_projects, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(candidate.id.to_string())
        .bind(&candidate.user_id)
        .bind(candidate.plan.to_string())
        .bind(candidate.max_projects)
        .bind(encode_time(&candidate.created_at))
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            tracing::info!("Created account {} for user {}", candidate.id, user_id);
        }

        self.get_by_user(user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Account::try_from).transpose()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> = sqlx::query_as("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Account::try_from).transpose()
    }

    /// Moves the account to `plan` with the given project quota.
    pub async fn set_plan(
        &self,
        id: Uuid,
        plan: PlanTier,
        max_projects: i64,
    ) -> Result<Account, sqlx::Error> {
        let result = sqlx::query("UPDATE accounts SET plan = ?, max_projects = ? WHERE id = ?")
            .bind(plan.to_string())
            .bind(max_projects)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.get_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }
}
