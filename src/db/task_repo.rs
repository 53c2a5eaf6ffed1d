use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_enum, decode_time, decode_uuid, encode_time, ScopedRepository};
use crate::models::Task;

pub struct TaskRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    project_id: String,
    code: String,
    title: String,
    module: String,
    status: String,
    agent: Option<String>,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: decode_uuid(&row.id)?,
            project_id: decode_uuid(&row.project_id)?,
            code: row.code,
            title: row.title,
            module: row.module,
            status: decode_enum(&row.status)?,
            agent: row.agent,
            position: row.position,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScopedRepository<Task> for TaskRepository {
    async fn list(&self, project_id: Uuid) -> Result<Vec<Task>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE project_id = ? ORDER BY position, created_at, id",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn insert(&self, task: &Task) -> Result<Task, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, code, title, module, status, agent, position, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(&task.code)
        .bind(&task.title)
        .bind(&task.module)
        .bind(task.status.as_str())
        .bind(&task.agent)
        .bind(task.position)
        .bind(encode_time(&task.created_at))
        .bind(encode_time(&task.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_by_id(task.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update(&self, task: &Task) -> Result<Task, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = ?, module = ?, status = ?, agent = ?, position = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.title)
        .bind(&task.module)
        .bind(task.status.as_str())
        .bind(&task.agent)
        .bind(task.position)
        .bind(encode_time(&task.updated_at))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.get_by_id(task.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
