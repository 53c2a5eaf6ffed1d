mod account_repo;
mod endpoint_repo;
mod module_repo;
mod project_repo;
mod task_repo;
mod waitlist_repo;

pub use account_repo::AccountRepository;
pub use endpoint_repo::EndpointRepository;
pub use module_repo::ModuleRepository;
pub use project_repo::ProjectRepository;
pub use task_repo::TaskRepository;
pub use waitlist_repo::WaitlistRepository;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!("Database ready at {}", path.display());

    Ok(pool)
}

/// Row-level access to one scoped table.
#[async_trait]
pub trait ScopedRepository<E>: Send + Sync {
    /// All rows in `scope`, in query order.
    async fn list(&self, scope: Uuid) -> Result<Vec<E>, sqlx::Error>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<E>, sqlx::Error>;

    async fn insert(&self, row: &E) -> Result<E, sqlx::Error>;

    async fn update(&self, row: &E) -> Result<E, sqlx::Error>;

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error>;
}

// Timestamps are stored fixed-width so that text order is time order.
pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_time(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn decode_uuid(value: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

pub(crate) fn decode_enum<T: FromStr<Err = String>>(value: &str) -> Result<T, sqlx::Error> {
    value.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
}

pub(crate) fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn decode_list(value: &str) -> Result<Vec<String>, sqlx::Error> {
    serde_json::from_str(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub struct TestDb {
        pub pool: SqlitePool,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    pub async fn setup_db() -> TestDb {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestDb {
            pool,
            _temp_dir: temp_dir,
        }
    }
}
