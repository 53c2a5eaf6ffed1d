//! Remote entity store contract.
//!
//! Every synced table exposes the same five operations: a scoped query,
//! insert, partial update, delete and a change-notification stream keyed by
//! table and scope. Three backends implement the contract:
//!
//! - [`MemoryStore`]: in-process tables, used by tests and offline demos
//! - [`SqliteStore`]: the server's SQLite database plus a [`ChangeHub`]
//! - [`HttpStore`]: the server's REST API and WebSocket change feed

mod hub;
mod http;
mod memory;
mod sqlite;

pub use hub::ChangeHub;
pub use http::HttpStore;
pub use memory::{MemoryBacked, MemoryStore};
pub use sqlite::{SqliteBacked, SqliteStore};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewSignup, WaitlistSignup};
use crate::validation::ValidationError;

/// Tables that carry change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Projects,
    Modules,
    Endpoints,
    Tasks,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::Modules => "modules",
            Table::Endpoints => "endpoints",
            Table::Tasks => "tasks",
        }
    }

    /// Row noun for messages.
    pub fn singular(&self) -> &'static str {
        match self {
            Table::Projects => "project",
            Table::Modules => "module",
            Table::Endpoints => "endpoint",
            Table::Tasks => "task",
        }
    }

    /// What the scope id of this table refers to.
    pub fn scope_name(&self) -> &'static str {
        match self {
            Table::Projects => "account",
            _ => "project",
        }
    }

    /// Parse from string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "projects" => Some(Table::Projects),
            "modules" => Some(Table::Modules),
            "endpoints" => Some(Table::Endpoints),
            "tasks" => Some(Table::Tasks),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row type mirrored by a sync cache.
///
/// `create` and `check_patch` hold the write-time rules for the table. The
/// caches run them before issuing a write and the stores run them again
/// before committing, so both sides agree on what is valid.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Caller-supplied fields for an insert.
    type New: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static;
    /// Partial field set for an update.
    type Patch: Clone + fmt::Debug + Default + Send + Sync + Serialize + DeserializeOwned + 'static;

    const TABLE: Table;

    fn id(&self) -> Uuid;

    /// The scope column: owning account for projects, owning project otherwise.
    fn scope_id(&self) -> Uuid;

    /// Query order within a scope.
    fn cmp_order(&self, other: &Self) -> Ordering;

    /// Builds the full row, deriving whatever the caller left out.
    /// `siblings` are the rows already in `scope`.
    fn create(scope: Uuid, new: Self::New, siblings: &[Self]) -> Result<Self, ValidationError>;

    fn check_patch(&self, _patch: &Self::Patch, _siblings: &[Self]) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Applies `patch` in place and bumps `updated_at`.
    fn apply_patch(&mut self, patch: &Self::Patch);
}

/// Rows of one scope as of a store revision.
///
/// The revision is read before the rows, so every change with a revision
/// at or below it is already reflected in `rows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<E> {
    pub revision: u64,
    pub rows: Vec<E>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The subscriber missed events and must re-fetch.
    Resync,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub scope: Uuid,
    pub kind: ChangeKind,
    pub id: Uuid,
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<serde_json::Value>,
}

impl ChangeEvent {
    pub fn resync(table: Table, scope: Uuid) -> Self {
        Self {
            table,
            scope,
            kind: ChangeKind::Resync,
            id: Uuid::nil(),
            revision: 0,
            row: None,
        }
    }

    /// An unstamped event carrying `row` as its payload.
    pub(crate) fn for_row<E: Entity>(kind: ChangeKind, row: &E) -> Self {
        Self {
            table: E::TABLE,
            scope: row.scope_id(),
            kind,
            id: row.id(),
            revision: 0,
            row: serde_json::to_value(row).ok(),
        }
    }
}

/// Change notifications for one scope. Dropping the stream unsubscribes.
pub type ChangeStream = BoxStream<'static, ChangeEvent>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("project quota exceeded ({0} max)")]
    QuotaExceeded(i64),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Scoped CRUD plus change notifications for one table.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    async fn query(&self, scope: Uuid) -> Result<Snapshot<E>, StoreError>;

    async fn insert(&self, scope: Uuid, new: E::New) -> Result<E, StoreError>;

    async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn subscribe(&self, scope: Uuid) -> Result<ChangeStream, StoreError>;
}

/// The single write behind the waitlist form.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Fails with [`StoreError::UniqueViolation`] when the email already exists.
    async fn insert_signup(&self, signup: NewSignup) -> Result<WaitlistSignup, StoreError>;
}

/// Sorts rows into query order.
pub(crate) fn sort_rows<E: Entity>(rows: &mut [E]) {
    rows.sort_by(|a, b| a.cmp_order(b));
}
