use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{decode_time, decode_uuid, encode_time};
use crate::models::{NewSignup, WaitlistSignup};
use crate::store::{StoreError, WaitlistStore};

#[derive(Clone)]
pub struct WaitlistRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SignupRow {
    id: String,
    email: String,
    source: String,
    user_agent: Option<String>,
    created_at: String,
}

impl TryFrom<SignupRow> for WaitlistSignup {
    type Error = sqlx::Error;

    fn try_from(row: SignupRow) -> Result<Self, Self::Error> {
        Ok(WaitlistSignup {
            id: decode_uuid(&row.id)?,
            email: row.email,
            source: row.source,
            user_agent: row.user_agent,
            created_at: decode_time(&row.created_at)?,
        })
    }
}

impl WaitlistRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, signup: &WaitlistSignup) -> Result<WaitlistSignup, sqlx::Error> {
        sqlx::query(
            "INSERT INTO waitlist_signups (id, email, source, user_agent, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(signup.id.to_string())
        .bind(&signup.email)
        .bind(&signup.source)
        .bind(&signup.user_agent)
        .bind(encode_time(&signup.created_at))
        .execute(&self.pool)
        .await?;

        Ok(signup.clone())
    }

    pub async fn list(&self) -> Result<Vec<WaitlistSignup>, sqlx::Error> {
        let rows: Vec<SignupRow> =
            sqlx::query_as("SELECT * FROM waitlist_signups ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(WaitlistSignup::try_from).collect()
    }
}

#[async_trait]
impl WaitlistStore for WaitlistRepository {
    async fn insert_signup(&self, signup: NewSignup) -> Result<WaitlistSignup, StoreError> {
        Ok(self.insert(&signup.into_signup()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;

    fn signup(email: &str) -> NewSignup {
        NewSignup {
            email: email.to_string(),
            source: "landing".to_string(),
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let db = setup_db().await;
        let repo = WaitlistRepository::new(db.pool.clone());

        repo.insert_signup(signup("ada@example.com")).await.unwrap();
        let err = repo
            .insert_signup(signup("ada@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].user_agent.as_deref(), Some("test-agent"));
    }
}
