//! In-process store with fault injection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    sort_rows, ChangeEvent, ChangeHub, ChangeKind, ChangeStream, Entity, EntityStore, Snapshot,
    StoreError, Table, WaitlistStore,
};
use crate::models::{
    now, Account, Endpoint, Module, NewSignup, PlanTier, Project, Task, WaitlistSignup,
    DEFAULT_FREE_MAX_PROJECTS,
};

#[derive(Default)]
pub struct Tables {
    accounts: Vec<Account>,
    projects: Vec<Project>,
    modules: Vec<Module>,
    endpoints: Vec<Endpoint>,
    tasks: Vec<Task>,
    signups: Vec<WaitlistSignup>,
}

impl Tables {
    fn require_project(&self, project_id: Uuid) -> Result<(), StoreError> {
        if self.projects.iter().any(|p| p.id == project_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("project {}", project_id)))
        }
    }

    fn require_module(&self, project_id: Uuid, name: &str) -> Result<(), StoreError> {
        if self
            .modules
            .iter()
            .any(|m| m.project_id == project_id && m.name == name.trim())
        {
            Ok(())
        } else {
            Err(crate::validation::ValidationError::UnknownModule(name.to_string()).into())
        }
    }
}

/// Table access and write hooks for rows kept in [`Tables`].
pub trait MemoryBacked: Entity {
    fn rows(tables: &Tables) -> &Vec<Self>;

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self>;

    fn check_insert(tables: &Tables, scope: Uuid, _new: &Self::New) -> Result<(), StoreError> {
        tables.require_project(scope)
    }

    /// Checks `after` against the other tables. `before` is the stored row.
    fn check_update(_tables: &Tables, _before: &Self, _after: &Self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Side effects of replacing `before` with `after`, as unstamped events.
    fn after_update(_tables: &mut Tables, _before: &Self, _after: &Self) -> Vec<ChangeEvent> {
        Vec::new()
    }

    /// Side effects of removing `row`, as unstamped events.
    fn after_delete(_tables: &mut Tables, _row: &Self) -> Vec<ChangeEvent> {
        Vec::new()
    }
}

impl MemoryBacked for Project {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.projects
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.projects
    }

    fn check_insert(tables: &Tables, scope: Uuid, _new: &Self::New) -> Result<(), StoreError> {
        let account = tables
            .accounts
            .iter()
            .find(|a| a.id == scope)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", scope)))?;
        let owned = tables
            .projects
            .iter()
            .filter(|p| p.account_id == scope)
            .count();
        if account.at_quota(owned) {
            return Err(StoreError::QuotaExceeded(account.max_projects));
        }
        Ok(())
    }

    fn after_delete(tables: &mut Tables, row: &Self) -> Vec<ChangeEvent> {
        tables.modules.retain(|m| m.project_id != row.id);
        tables.endpoints.retain(|e| e.project_id != row.id);
        tables.tasks.retain(|t| t.project_id != row.id);

        [Table::Modules, Table::Endpoints, Table::Tasks]
            .into_iter()
            .map(|table| ChangeEvent::resync(table, row.id))
            .collect()
    }
}

impl MemoryBacked for Module {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.modules
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.modules
    }

    fn after_update(tables: &mut Tables, before: &Self, after: &Self) -> Vec<ChangeEvent> {
        if before.name == after.name {
            return Vec::new();
        }
        let project = after.project_id;
        let mut events = Vec::new();

        for sibling in tables
            .modules
            .iter_mut()
            .filter(|m| m.project_id == project && m.depends_on(&before.name))
        {
            sibling.rename_dependency(&before.name, &after.name);
            events.push(ChangeEvent::for_row(ChangeKind::Update, &*sibling));
        }
        for endpoint in tables
            .endpoints
            .iter_mut()
            .filter(|e| e.project_id == project && e.module == before.name)
        {
            endpoint.module = after.name.clone();
            endpoint.updated_at = now();
            events.push(ChangeEvent::for_row(ChangeKind::Update, &*endpoint));
        }
        for task in tables
            .tasks
            .iter_mut()
            .filter(|t| t.project_id == project && t.module == before.name)
        {
            task.module = after.name.clone();
            task.updated_at = now();
            events.push(ChangeEvent::for_row(ChangeKind::Update, &*task));
        }
        events
    }

    fn after_delete(tables: &mut Tables, row: &Self) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for sibling in tables
            .modules
            .iter_mut()
            .filter(|m| m.project_id == row.project_id && m.depends_on(&row.name))
        {
            sibling.dependencies.retain(|d| d != &row.name);
            sibling.updated_at = now();
            events.push(ChangeEvent::for_row(ChangeKind::Update, &*sibling));
        }

        let (orphaned, kept): (Vec<Endpoint>, Vec<Endpoint>) = std::mem::take(&mut tables.endpoints)
            .into_iter()
            .partition(|e| e.project_id == row.project_id && e.module == row.name);
        tables.endpoints = kept;
        events.extend(
            orphaned
                .iter()
                .map(|e| ChangeEvent::for_row(ChangeKind::Delete, e)),
        );
        events
    }
}

impl MemoryBacked for Endpoint {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.endpoints
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.endpoints
    }

    fn check_insert(tables: &Tables, scope: Uuid, new: &Self::New) -> Result<(), StoreError> {
        tables.require_project(scope)?;
        tables.require_module(scope, &new.module)
    }

    fn check_update(tables: &Tables, before: &Self, after: &Self) -> Result<(), StoreError> {
        if before.module == after.module {
            return Ok(());
        }
        tables.require_module(after.project_id, &after.module)
    }
}

impl MemoryBacked for Task {
    fn rows(tables: &Tables) -> &Vec<Self> {
        &tables.tasks
    }

    fn rows_mut(tables: &mut Tables) -> &mut Vec<Self> {
        &mut tables.tasks
    }
}

#[derive(Default)]
struct Faults {
    fail_writes: bool,
    failing_queries: usize,
    write_latency: Option<Duration>,
    query_latency: HashMap<Uuid, Duration>,
}

/// Store backed by in-process tables. Used by tests and the offline demo.
///
/// Writes and queries can be slowed down or made to fail to exercise the
/// sync caches' error and race handling.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    hub: ChangeHub,
    faults: Mutex<Faults>,
    writes: AtomicUsize,
    free_max_projects: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_free_max_projects(DEFAULT_FREE_MAX_PROJECTS)
    }

    pub fn with_free_max_projects(free_max_projects: i64) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            hub: ChangeHub::new(),
            faults: Mutex::new(Faults::default()),
            writes: AtomicUsize::new(0),
            free_max_projects,
        }
    }

    /// Returns the user's account, creating a free-tier one if absent.
    pub async fn ensure_account(&self, user_id: &str) -> Account {
        let mut tables = self.tables.lock().await;
        if let Some(account) = tables.accounts.iter().find(|a| a.user_id == user_id) {
            return account.clone();
        }
        let account = Account::new(user_id, self.free_max_projects);
        tables.accounts.push(account.clone());
        account
    }

    pub async fn set_plan(&self, account_id: Uuid, plan: PlanTier) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", account_id)))?;
        account.plan = plan;
        account.max_projects = plan.quota(self.free_max_projects);
        Ok(account.clone())
    }

    /// Number of write calls received, including ones that failed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn set_fail_writes(&self, fail: bool) {
        self.faults.lock().await.fail_writes = fail;
    }

    pub async fn set_write_latency(&self, latency: Option<Duration>) {
        self.faults.lock().await.write_latency = latency;
    }

    /// Makes the next `count` queries fail, whatever their scope.
    pub async fn fail_next_queries(&self, count: usize) {
        self.faults.lock().await.failing_queries = count;
    }

    /// Delays query responses for `scope`. The rows are read before the
    /// delay, so a slow response carries data as of the call.
    pub async fn set_query_latency(&self, scope: Uuid, latency: Duration) {
        self.faults.lock().await.query_latency.insert(scope, latency);
    }

    async fn begin_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let (fail, latency) = {
            let faults = self.faults.lock().await;
            (faults.fail_writes, faults.write_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn scoped<E: Entity>(rows: &[E], scope: Uuid) -> Vec<E> {
    rows.iter().filter(|r| r.scope_id() == scope).cloned().collect()
}

#[async_trait]
impl<E: MemoryBacked> EntityStore<E> for MemoryStore {
    async fn query(&self, scope: Uuid) -> Result<Snapshot<E>, StoreError> {
        let (fail, latency) = {
            let mut faults = self.faults.lock().await;
            let fail = faults.failing_queries > 0;
            if fail {
                faults.failing_queries -= 1;
            }
            (fail, faults.query_latency.get(&scope).copied())
        };

        let snapshot = {
            let tables = self.tables.lock().await;
            let revision = self.hub.revision();
            let mut rows = scoped(E::rows(&tables), scope);
            sort_rows(&mut rows);
            Snapshot { revision, rows }
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if fail {
            return Err(StoreError::Unavailable("injected query failure".to_string()));
        }
        Ok(snapshot)
    }

    async fn insert(&self, scope: Uuid, new: E::New) -> Result<E, StoreError> {
        self.begin_write().await?;

        let mut tables = self.tables.lock().await;
        E::check_insert(&tables, scope, &new)?;
        let siblings = scoped(E::rows(&tables), scope);
        let row = E::create(scope, new, &siblings)?;
        E::rows_mut(&mut tables).push(row.clone());

        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Insert, &row))
            .await;
        Ok(row)
    }

    async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E, StoreError> {
        self.begin_write().await?;

        let mut tables = self.tables.lock().await;
        let current = E::rows(&tables)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::TABLE, id)))?;

        let siblings = scoped(E::rows(&tables), current.scope_id());
        current.check_patch(&patch, &siblings)?;
        let mut updated = current.clone();
        updated.apply_patch(&patch);
        E::check_update(&tables, &current, &updated)?;

        if let Some(slot) = E::rows_mut(&mut tables).iter_mut().find(|r| r.id() == id) {
            *slot = updated.clone();
        }
        let side_effects = E::after_update(&mut tables, &current, &updated);

        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Update, &updated))
            .await;
        for event in side_effects {
            self.hub.publish(event).await;
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.begin_write().await?;

        let mut tables = self.tables.lock().await;
        let rows = E::rows_mut(&mut tables);
        let index = rows
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound(format!("{} {}", E::TABLE, id)))?;
        let removed = rows.remove(index);
        let side_effects = E::after_delete(&mut tables, &removed);

        self.hub
            .publish(ChangeEvent::for_row(ChangeKind::Delete, &removed))
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
impl WaitlistStore for MemoryStore {
    async fn insert_signup(&self, signup: NewSignup) -> Result<WaitlistSignup, StoreError> {
        self.begin_write().await?;

        let mut tables = self.tables.lock().await;
        if tables.signups.iter().any(|s| s.email == signup.email) {
            return Err(StoreError::UniqueViolation(format!(
                "waitlist_signups.email: {}",
                signup.email
            )));
        }
        let signup = signup.into_signup();
        tables.signups.push(signup.clone());
        Ok(signup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EndpointPatch, HttpMethod, ModulePatch, NewEndpoint, NewModule, NewProject, NewTask,
        ProjectPatch,
    };
    use crate::validation::ValidationError;
    use futures::StreamExt;

    async fn store_with_project() -> (MemoryStore, Project) {
        let store = MemoryStore::with_free_max_projects(2);
        let account = store.ensure_account("user1").await;
        let project = EntityStore::<Project>::insert(&store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        (store, project)
    }

    #[tokio::test]
    async fn test_quota_enforced_for_free_tier() {
        let (store, project) = store_with_project().await;
        let account = project.account_id;

        EntityStore::<Project>::insert(&store, account, NewProject::new("Second"))
            .await
            .unwrap();
        let err = EntityStore::<Project>::insert(&store, account, NewProject::new("Third"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded(2)));

        store.set_plan(account, PlanTier::Pro).await.unwrap();
        let third = EntityStore::<Project>::insert(&store, account, NewProject::new("Third"))
            .await
            .unwrap();
        assert_eq!(third.code, "THI-003");
    }

    #[tokio::test]
    async fn test_insert_publishes_event_with_row() {
        let (store, project) = store_with_project().await;
        let mut changes = EntityStore::<Module>::subscribe(&store, project.id)
            .await
            .unwrap();

        let module = EntityStore::<Module>::insert(&store, project.id, NewModule::new("Users"))
            .await
            .unwrap();

        let event = changes.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.id, module.id);
        let payload: Module = serde_json::from_value(event.row.unwrap()).unwrap();
        assert_eq!(payload, module);

        let snapshot = EntityStore::<Module>::query(&store, project.id).await.unwrap();
        assert_eq!(snapshot.revision, event.revision);
    }

    #[tokio::test]
    async fn test_endpoint_requires_existing_module() {
        let (store, project) = store_with_project().await;

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
    async fn test_module_delete_prunes_dependencies() {
        let (store, project) = store_with_project().await;
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

        EntityStore::<Module>::delete(&store, users.id).await.unwrap();

        let snapshot = EntityStore::<Module>::query(&store, project.id).await.unwrap();
        assert_eq!(snapshot.rows.len(), 1);
        assert!(snapshot.rows[0].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_module_rename_and_delete_carry_endpoints() {
        let (store, project) = store_with_project().await;
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

        let modules = EntityStore::<Module>::query(&store, project.id).await.unwrap();
        let orders = modules.rows.iter().find(|m| m.name == "Orders").unwrap();
        assert_eq!(orders.dependencies, vec!["Accounts"]);
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

        let mut changes = EntityStore::<Endpoint>::subscribe(&store, project.id)
            .await
            .unwrap();
        EntityStore::<Module>::delete(&store, users.id).await.unwrap();

        let endpoints = EntityStore::<Endpoint>::query(&store, project.id).await.unwrap();
        assert!(endpoints.rows.is_empty());
        let event = changes.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.id, endpoint.id);
    }

    #[tokio::test]
    async fn test_project_delete_cascades() {
        let (store, project) = store_with_project().await;
        EntityStore::<Task>::insert(&store, project.id, NewTask::new("Schema", "Users"))
            .await
            .unwrap();

        EntityStore::<Project>::delete(&store, project.id).await.unwrap();

        let tasks = EntityStore::<Task>::query(&store, project.id).await.unwrap();
        assert!(tasks.rows.is_empty());
        let err = EntityStore::<Task>::insert(&store, project.id, NewTask::new("Late", "Users"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = EntityStore::<Project>::update(&store, Uuid::new_v4(), ProjectPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_write_failure_is_counted() {
        let (store, project) = store_with_project().await;
        store.set_fail_writes(true).await;

        let err = EntityStore::<Module>::insert(&store, project.id, NewModule::new("Users"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_signup_is_unique_violation() {
        let store = MemoryStore::new();
        let signup = NewSignup {
            email: "ada@example.com".to_string(),
            source: "landing".to_string(),
            user_agent: None,
        };
        store.insert_signup(signup.clone()).await.unwrap();
        let err = store.insert_signup(signup).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }
}
