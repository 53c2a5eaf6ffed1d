use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decode_enum, decode_time, decode_uuid, encode_time, ScopedRepository};
use crate::models::Endpoint;

pub struct EndpointRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: String,
    project_id: String,
    module: String,
    method: String,
    path: String,
    description: String,
    auth_required: bool,
    created_at: String,
    updated_at: String,
}

impl TryFrom<EndpointRow> for Endpoint {
    type Error = sqlx::Error;

    fn try_from(row: EndpointRow) -> Result<Self, Self::Error> {
        Ok(Endpoint {
            id: decode_uuid(&row.id)?,
            project_id: decode_uuid(&row.project_id)?,
            module: row.module,
            method: decode_enum(&row.method)?,
            path: row.path,
            description: row.description,
            auth_required: row.auth_required,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl EndpointRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScopedRepository<Endpoint> for EndpointRepository {
    async fn list(&self, project_id: Uuid) -> Result<Vec<Endpoint>, sqlx::Error> {
        let rows: Vec<EndpointRow> =
            sqlx::query_as("SELECT * FROM endpoints WHERE project_id = ? ORDER BY created_at, id")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Endpoint::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Endpoint>, sqlx::Error> {
        let row: Option<EndpointRow> = sqlx::query_as("SELECT * FROM endpoints WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Endpoint::try_from).transpose()
    }

    async fn insert(&self, endpoint: &Endpoint) -> Result<Endpoint, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO endpoints (id, project_id, module, method, path, description, auth_required, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(endpoint.id.to_string())
        .bind(endpoint.project_id.to_string())
        .bind(&endpoint.module)
        .bind(endpoint.method.to_string())
        .bind(&endpoint.path)
        .bind(&endpoint.description)
        .bind(endpoint.auth_required)
        .bind(encode_time(&endpoint.created_at))
        .bind(encode_time(&endpoint.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_by_id(endpoint.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update(&self, endpoint: &Endpoint) -> Result<Endpoint, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE endpoints
            SET module = ?, method = ?, path = ?, description = ?, auth_required = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&endpoint.module)
        .bind(endpoint.method.to_string())
        .bind(&endpoint.path)
        .bind(&endpoint.description)
        .bind(endpoint.auth_required)
        .bind(encode_time(&endpoint.updated_at))
        .bind(endpoint.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.get_by_id(endpoint.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM endpoints WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
