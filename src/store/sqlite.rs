//! SQLite-backed store: the repositories plus a [`ChangeHub`].

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeHub, ChangeKind, ChangeStream, Entity, EntityStore, Snapshot, StoreError,
    Table, WaitlistStore,
};
use crate::db::{
    self, AccountRepository, EndpointRepository, ModuleRepository, ProjectRepository,
    ScopedRepository, TaskRepository, WaitlistRepository,
};
use crate::models::{
    now, Account, Endpoint, Module, NewSignup, PlanTier, Project, Task, WaitlistSignup,
};
use crate::validation::ValidationError;

/// Repository lookup and write hooks for tables kept in SQLite.
#[async_trait]
pub trait SqliteBacked: Entity {
    fn repository(pool: &SqlitePool) -> Box<dyn ScopedRepository<Self>>;

    async fn check_insert(
        store: &SqliteStore,
        scope: Uuid,
        _new: &Self::New,
    ) -> Result<(), StoreError> {
        store.require_project(scope).await
    }

    /// Checks `after` against the other tables. `before` is the stored row.
    async fn check_update(
        _store: &SqliteStore,
        _before: &Self,
        _after: &Self,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// Side effects of replacing `before` with `after`, as unstamped events.
    async fn after_update(
        _store: &SqliteStore,
        _before: &Self,
        _after: &Self,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        Ok(Vec::new())
    }

    /// Side effects of removing `row`, as unstamped events.
    async fn after_delete(_store: &SqliteStore, _row: &Self) -> Result<Vec<ChangeEvent>, StoreError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl SqliteBacked for Project {
    fn repository(pool: &SqlitePool) -> Box<dyn ScopedRepository<Self>> {
        Box::new(ProjectRepository::new(pool.clone()))
    }

    async fn check_insert(
        store: &SqliteStore,
        scope: Uuid,
        _new: &Self::New,
    ) -> Result<(), StoreError> {
        let account = AccountRepository::new(store.pool.clone())
            .get_by_id(scope)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("account {}", scope)))?;
        let owned = ProjectRepository::new(store.pool.clone())
            .count_for_account(scope)
            .await?;
        if account.at_quota(owned as usize) {
            return Err(StoreError::QuotaExceeded(account.max_projects));
        }
        Ok(())
    }

    async fn after_delete(_store: &SqliteStore, row: &Self) -> Result<Vec<ChangeEvent>, StoreError> {
        // Children are removed by ON DELETE CASCADE.
        Ok([Table::Modules, Table::Endpoints, Table::Tasks]
            .into_iter()
            .map(|table| ChangeEvent::resync(table, row.id))
            .collect())
    }
}

#[async_trait]
impl SqliteBacked for Module {
    fn repository(pool: &SqlitePool) -> Box<dyn ScopedRepository<Self>> {
        Box::new(ModuleRepository::new(pool.clone()))
    }

    async fn after_update(
        store: &SqliteStore,
        before: &Self,
        after: &Self,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        if before.name == after.name {
            return Ok(Vec::new());
        }
        let project = after.project_id;
        let mut events = Vec::new();

        let modules = ModuleRepository::new(store.pool.clone());
        for mut sibling in modules.list(project).await? {
            if !sibling.depends_on(&before.name) {
                continue;
            }
            sibling.rename_dependency(&before.name, &after.name);
            let sibling = modules.update(&sibling).await?;
            events.push(ChangeEvent::for_row(ChangeKind::Update, &sibling));
        }

        let endpoints = EndpointRepository::new(store.pool.clone());
        for mut endpoint in endpoints.list(project).await? {
            if endpoint.module != before.name {
                continue;
            }
            endpoint.module = after.name.clone();
            endpoint.updated_at = now();
            let endpoint = endpoints.update(&endpoint).await?;
            events.push(ChangeEvent::for_row(ChangeKind::Update, &endpoint));
        }

        let tasks = TaskRepository::new(store.pool.clone());
        for mut task in tasks.list(project).await? {
            if task.module != before.name {
                continue;
            }
            task.module = after.name.clone();
            task.updated_at = now();
            let task = tasks.update(&task).await?;
            events.push(ChangeEvent::for_row(ChangeKind::Update, &task));
        }

        Ok(events)
    }

    async fn after_delete(store: &SqliteStore, row: &Self) -> Result<Vec<ChangeEvent>, StoreError> {
        let repo = ModuleRepository::new(store.pool.clone());
        let mut events = Vec::new();

        for mut sibling in repo.list(row.project_id).await? {
            if !sibling.depends_on(&row.name) {
                continue;
            }
            sibling.dependencies.retain(|d| d != &row.name);
            sibling.updated_at = now();
            let sibling = repo.update(&sibling).await?;
            events.push(ChangeEvent::for_row(ChangeKind::Update, &sibling));
        }

        // Endpoints cannot outlive the module they are filed under.
        let endpoints = EndpointRepository::new(store.pool.clone());
        for endpoint in endpoints.list(row.project_id).await? {
            if endpoint.module != row.name {
                continue;
            }
            endpoints.delete(endpoint.id).await?;
            events.push(ChangeEvent::for_row(ChangeKind::Delete, &endpoint));
        }

        Ok(events)
    }
}

#[async_trait]
impl SqliteBacked for Endpoint {
    fn repository(pool: &SqlitePool) -> Box<dyn ScopedRepository<Self>> {
        Box::new(EndpointRepository::new(pool.clone()))
    }

    async fn check_insert(
        store: &SqliteStore,
        scope: Uuid,
        new: &Self::New,
    ) -> Result<(), StoreError> {
        store.require_project(scope).await?;
        store.require_module(scope, &new.module).await
    }

    async fn check_update(
        store: &SqliteStore,
        before: &Self,
        after: &Self,
    ) -> Result<(), StoreError> {
        if before.module == after.module {
            return Ok(());
        }
        store.require_module(after.project_id, &after.module).await
    }
}

#[async_trait]
impl SqliteBacked for Task {
    fn repository(pool: &SqlitePool) -> Box<dyn ScopedRepository<Self>> {
        Box::new(TaskRepository::new(pool.clone()))
    }
}

/// Store used by the server and by the CLI when no server is configured.
///
/// Writes are serialized so that revision order matches commit order.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    hub: Arc<ChangeHub>,
    write_lock: Arc<Mutex<()>>,
    free_max_projects: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, free_max_projects: i64) -> Self {
        Self {
            pool,
            hub: Arc::new(ChangeHub::new()),
            write_lock: Arc::new(Mutex::new(())),
            free_max_projects,
        }
    }

    /// Opens (creating and migrating if needed) the database at `path`.
    pub async fn open(path: &Path, free_max_projects: i64) -> Result<Self, StoreError> {
        let pool = db::init_db(path).await?;
        Ok(Self::new(pool, free_max_projects))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn free_max_projects(&self) -> i64 {
        self.free_max_projects
    }

    /// Returns the user's account, creating a free-tier one on first access.
    pub async fn ensure_account(&self, user_id: &str) -> Result<Account, StoreError> {
        Ok(AccountRepository::new(self.pool.clone())
            .ensure(user_id, self.free_max_projects)
            .await?)
    }

    pub async fn set_plan(&self, account_id: Uuid, plan: PlanTier) -> Result<Account, StoreError> {
        Ok(AccountRepository::new(self.pool.clone())
            .set_plan(account_id, plan, plan.quota(self.free_max_projects))
            .await?)
    }

    /// Looks a row up by id regardless of scope.
    pub async fn find<E: SqliteBacked>(&self, id: Uuid) -> Result<Option<E>, StoreError> {
        Ok(E::repository(&self.pool).get_by_id(id).await?)
    }

    async fn require_project(&self, project_id: Uuid) -> Result<(), StoreError> {
        ProjectRepository::new(self.pool.clone())
            .get_by_id(project_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("project {}", project_id)))
    }

    async fn require_module(&self, project_id: Uuid, name: &str) -> Result<(), StoreError> {
        ModuleRepository::new(self.pool.clone())
            .get_by_name(project_id, name.trim())
            .await?
            .map(|_| ())
            .ok_or_else(|| ValidationError::UnknownModule(name.to_string()).into())
    }
}

#[async_trait]
impl<E: SqliteBacked> EntityStore<E> for SqliteStore {
    async fn query(&self, scope: Uuid) -> Result<Snapshot<E>, StoreError> {
        let revision = self.hub.revision();
        let rows = E::repository(&self.pool).list(scope).await?;
        Ok(Snapshot { revision, rows })
    }

    async fn insert(&self, scope: Uuid, new: E::New) -> Result<E, StoreError> {
        let _guard = self.write_lock.lock().await;

        E::check_insert(self, scope, &new).await?;
        let repo = E::repository(&self.pool);
        let siblings = repo.list(scope).await?;
        let row = E::create(scope, new, &siblings)?;
        let row = repo.insert(&row).await?;

        tracing::debug!("Inserted {} {} in scope {}", E::TABLE, row.id(), scope);
        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Insert, &row))
            .await;
        Ok(row)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E, StoreError> {
        let _guard = self.write_lock.lock().await;

        let repo = E::repository(&self.pool);
        let current = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::TABLE, id)))?;
        let siblings = repo.list(current.scope_id()).await?;
        current.check_patch(&patch, &siblings)?;

        let mut updated = current.clone();
        updated.apply_patch(&patch);
        E::check_update(self, &current, &updated).await?;
        let updated = repo.update(&updated).await?;
        let side_effects = E::after_update(self, &current, &updated).await?;

        tracing::debug!("Updated {} {}", E::TABLE, id);
        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Update, &updated))
            .await;
        for event in side_effects {
            self.hub.publish(event).await;
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let repo = E::repository(&self.pool);
        let row = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::TABLE, id)))?;
        repo.delete(id).await?;
        let side_effects = E::after_delete(self, &row).await?;

        tracing::debug!("Deleted {} {}", E::TABLE, id);
        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Delete, &row))
            .await;
        for event in side_effects {
            self.hub.publish(event).await;
        }
        Ok(())
    }

    async fn subscribe(&self, scope: Uuid) -> Result<ChangeStream, StoreError> {
        Ok(self.hub.stream(E::TABLE, scope).await)
    }
}

#[async_trait]
impl WaitlistStore for SqliteStore {
    async fn insert_signup(&self, signup: NewSignup) -> Result<WaitlistSignup, StoreError> {
        WaitlistRepository::new(self.pool.clone())
            .insert_signup(signup)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_db, TestDb};
    use crate::models::{
        EndpointPatch, HttpMethod, ModulePatch, NewEndpoint, NewModule, NewProject, NewTask,
        ProjectPatch, ProjectStatus,
    };
    use futures::StreamExt;

    async fn setup() -> (TestDb, SqliteStore, Account) {
        let db = setup_db().await;
        let store = SqliteStore::new(db.pool.clone(), 1);
        let account = store.ensure_account("user1").await.unwrap();
        (db, store, account)
    }

    #[tokio::test]
    async fn test_quota_blocks_second_free_project() {
        let (_db, store, account) = setup().await;

        EntityStore::<Project>::insert(&store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        let err = EntityStore::<Project>::insert(&store, account.id, NewProject::new("Blog"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded(1)));

        store.set_plan(account.id, PlanTier::Pro).await.unwrap();
        EntityStore::<Project>::insert(&store, account.id, NewProject::new("Blog"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_validates_transition_and_publishes() {
        let (_db, store, account) = setup().await;
        let project = EntityStore::<Project>::insert(&store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        let mut changes = EntityStore::<Project>::subscribe(&store, account.id)
            .await
            .unwrap();

        let err = EntityStore::<Project>::update(
            &store,
            project.id,
            ProjectPatch::status(ProjectStatus::Ready),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let updated = EntityStore::<Project>::update(
            &store,
            project.id,
            ProjectPatch::status(ProjectStatus::Generating),
        )
        .await
        .unwrap();
        assert_eq!(updated.status, ProjectStatus::Generating);

        let event = changes.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
        assert_eq!(event.id, project.id);
        assert_eq!(event.revision, store.hub().revision());
    }

    #[tokio::test]
    async fn test_module_delete_prunes_and_endpoint_checks_module() {
        let (_db, store, account) = setup().await;
        let project = EntityStore::<Project>::insert(&store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        let users = EntityStore::<Module>::insert(&store, project.id, NewModule::new("Users"))
            .await
            .unwrap();
        EntityStore::<Module>::insert(
            &store,
            project.id,
            NewModule::new("Orders").with_dependencies(vec!["Users".into()]),
        )
        .await
        .unwrap();

        EntityStore::<Endpoint>::insert(
            &store,
            project.id,
            NewEndpoint::new("Users", HttpMethod::Post, "/users"),
        )
        .await
        .unwrap();

        EntityStore::<Module>::delete(&store, users.id).await.unwrap();
        let modules = EntityStore::<Module>::query(&store, project.id).await.unwrap();
        assert_eq!(modules.rows.len(), 1);
        assert!(modules.rows[0].dependencies.is_empty());

        let err = EntityStore::<Endpoint>::insert(
            &store,
            project.id,
            NewEndpoint::new("Users", HttpMethod::Get, "/users"),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnknownModule(_))
        ));
    }

    #[tokio::test]
    async fn test_endpoint_edit_after_module_rename() {
        let (_db, store, account) = setup().await;
        let project = EntityStore::<Project>::insert(&store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        let users = EntityStore::<Module>::insert(&store, project.id, NewModule::new("Users"))
            .await
            .unwrap();
        let endpoint = EntityStore::<Endpoint>::insert(
            &store,
            project.id,
            NewEndpoint::new("Users", HttpMethod::Get, "/users"),
        )
        .await
        .unwrap();
        EntityStore::<Task>::insert(&store, project.id, NewTask::new("Schema", "Users"))
            .await
            .unwrap();

        let rename = ModulePatch {
            name: Some("Accounts".into()),
            ..Default::default()
        };
        EntityStore::<Module>::update(&store, users.id, rename)
            .await
            .unwrap();
        let tasks = EntityStore::<Task>::query(&store, project.id).await.unwrap();
        assert_eq!(tasks.rows[0].module, "Accounts");

        let describe = EndpointPatch {
            description: Some("List accounts".into()),
            ..Default::default()
        };
        let described = EntityStore::<Endpoint>::update(&store, endpoint.id, describe)
            .await
            .unwrap();
        assert_eq!(described.module, "Accounts");

        let move_to_missing = EndpointPatch {
            module: Some("Billing".into()),
            ..Default::default()
        };
        let err = EntityStore::<Endpoint>::update(&store, endpoint.id, move_to_missing)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnknownModule(_))
        ));

        EntityStore::<Module>::delete(&store, users.id).await.unwrap();
        let endpoints = EntityStore::<Endpoint>::query(&store, project.id).await.unwrap();
        assert!(endpoints.rows.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_not_found() {
        let (_db, store, _account) = setup().await;
        let err = EntityStore::<Task>::delete(&store, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
