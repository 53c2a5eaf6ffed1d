use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    decode_enum, decode_list, decode_time, decode_uuid, encode_list, encode_time,
    ScopedRepository,
};
use crate::models::Project;

pub struct ProjectRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    account_id: String,
    name: String,
    code: String,
    backend: String,
    database: String,
    status: String,
    prompt: Option<String>,
    entities: String,
    auth_method: Option<String>,
    multi_tenant: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = sqlx::Error;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: decode_uuid(&row.id)?,
            account_id: decode_uuid(&row.account_id)?,
            name: row.name,
            code: row.code,
            backend: row.backend,
            database: row.database,
            status: decode_enum(&row.status)?,
            prompt: row.prompt,
            entities: decode_list(&row.entities)?,
            auth_method: row.auth_method,
            multi_tenant: row.multi_tenant,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count_for_account(&self, account_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ScopedRepository<Project> for ProjectRepository {
    async fn list(&self, account_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT * FROM projects WHERE account_id = ? ORDER BY created_at, id",
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Project::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Project::try_from).transpose()
    }

    async fn insert(&self, project: &Project) -> Result<Project, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, account_id, name, code, backend, database, status, prompt, entities, auth_method, multi_tenant, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project.id.to_string())
        .bind(project.account_id.to_string())
        .bind(&project.name)
        .bind(&project.code)
        .bind(&project.backend)
        .bind(&project.database)
        .bind(project.status.as_str())
        .bind(&project.prompt)
        .bind(encode_list(&project.entities))
        .bind(&project.auth_method)
        .bind(project.multi_tenant)
        .bind(encode_time(&project.created_at))
        .bind(encode_time(&project.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_by_id(project.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update(&self, project: &Project) -> Result<Project, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET name = ?, code = ?, backend = ?, database = ?, status = ?, prompt = ?,
                entities = ?, auth_method = ?, multi_tenant = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&project.name)
        .bind(&project.code)
        .bind(&project.backend)
        .bind(&project.database)
        .bind(project.status.as_str())
        .bind(&project.prompt)
        .bind(encode_list(&project.entities))
        .bind(&project.auth_method)
        .bind(project.multi_tenant)
        .bind(encode_time(&project.updated_at))
        .bind(project.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.get_by_id(project.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        // CASCADE will handle modules, endpoints and tasks
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
