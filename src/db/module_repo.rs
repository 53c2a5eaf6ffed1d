use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    decode_enum, decode_list, decode_time, decode_uuid, encode_list, encode_time,
    ScopedRepository,
};
use crate::models::Module;

pub struct ModuleRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: String,
    project_id: String,
    name: String,
    status: String,
    dependencies: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ModuleRow> for Module {
    type Error = sqlx::Error;

    fn try_from(row: ModuleRow) -> Result<Self, Self::Error> {
        Ok(Module {
            id: decode_uuid(&row.id)?,
            project_id: decode_uuid(&row.project_id)?,
            name: row.name,
            status: decode_enum(&row.status)?,
            dependencies: decode_list(&row.dependencies)?,
            created_at: decode_time(&row.created_at)?,
            updated_at: decode_time(&row.updated_at)?,
        })
    }
}

impl ModuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_name(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<Option<Module>, sqlx::Error> {
        let row: Option<ModuleRow> =
            sqlx::query_as("SELECT * FROM modules WHERE project_id = ? AND name = ?")
                .bind(project_id.to_string())
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Module::try_from).transpose()
    }
}

#[async_trait]
impl ScopedRepository<Module> for ModuleRepository {
    async fn list(&self, project_id: Uuid) -> Result<Vec<Module>, sqlx::Error> {
        let rows: Vec<ModuleRow> =
            sqlx::query_as("SELECT * FROM modules WHERE project_id = ? ORDER BY created_at, id")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Module::try_from).collect()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Module>, sqlx::Error> {
        let row: Option<ModuleRow> = sqlx::query_as("SELECT * FROM modules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Module::try_from).transpose()
    }

    async fn insert(&self, module: &Module) -> Result<Module, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO modules (id, project_id, name, status, dependencies, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(module.id.to_string())
        .bind(module.project_id.to_string())
        .bind(&module.name)
        .bind(module.status.as_str())
        .bind(encode_list(&module.dependencies))
        .bind(encode_time(&module.created_at))
        .bind(encode_time(&module.updated_at))
        .execute(&self.pool)
        .await?;

        self.get_by_id(module.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update(&self, module: &Module) -> Result<Module, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE modules SET name = ?, status = ?, dependencies = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&module.name)
        .bind(module.status.as_str())
        .bind(encode_list(&module.dependencies))
        .bind(encode_time(&module.updated_at))
        .bind(module.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        self.get_by_id(module.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM modules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;
    use crate::db::{AccountRepository, ProjectRepository};
    use crate::models::{NewModule, NewProject, Project, WorkStatus};
    use crate::store::Entity;

    async fn seeded_project(pool: &SqlitePool) -> Project {
        let account = AccountRepository::new(pool.clone())
            .ensure("user1", 3)
            .await
            .unwrap();
        let project = Project::create(account.id, NewProject::new("Shop"), &[]).unwrap();
        ProjectRepository::new(pool.clone())
            .insert(&project)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_module_round_trip_with_dependencies() {
        let db = setup_db().await;
        let project = seeded_project(&db.pool).await;
        let repo = ModuleRepository::new(db.pool.clone());

        let users = Module::create(project.id, NewModule::new("Users"), &[]).unwrap();
        repo.insert(&users).await.unwrap();
        let orders = Module::create(
            project.id,
            NewModule::new("Orders").with_dependencies(vec!["Users".into()]),
            &[users.clone()],
        )
        .unwrap();
        repo.insert(&orders).await.unwrap();

        let found = repo.get_by_name(project.id, "Orders").await.unwrap().unwrap();
        assert_eq!(found.dependencies, vec!["Users"]);
        assert_eq!(found.status, WorkStatus::Todo);
        assert_eq!(repo.list(project.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_name_violates_unique_constraint() {
        let db = setup_db().await;
        let project = seeded_project(&db.pool).await;
        let repo = ModuleRepository::new(db.pool.clone());

        let users = Module::create(project.id, NewModule::new("Users"), &[]).unwrap();
        repo.insert(&users).await.unwrap();
        let again = Module::create(project.id, NewModule::new("Users"), &[]).unwrap();

        match repo.insert(&again).await {
            Err(sqlx::Error::Database(e)) => assert!(e.is_unique_violation()),
            other => panic!("expected unique violation, got {:?}", other.map(|m| m.name)),
        }
    }

    #[tokio::test]
    async fn test_deleting_project_cascades_to_modules() {
        let db = setup_db().await;
        let project = seeded_project(&db.pool).await;
        let repo = ModuleRepository::new(db.pool.clone());

        let users = Module::create(project.id, NewModule::new("Users"), &[]).unwrap();
        repo.insert(&users).await.unwrap();

        ProjectRepository::new(db.pool.clone())
            .delete(project.id)
            .await
            .unwrap();
        assert!(repo.get_by_id(users.id).await.unwrap().is_none());
    }
}
