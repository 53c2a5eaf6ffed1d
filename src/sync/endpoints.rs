use std::sync::Arc;
use uuid::Uuid;

use super::{NoticeSink, SyncCache};
use crate::models::{Endpoint, EndpointPatch, Module, NewEndpoint};
use crate::store::EntityStore;
use crate::validation::ValidationError;

/// Endpoints of the selected project.
///
/// An endpoint names its module; the name is checked against the project's
/// modules before every write that sets it.
pub struct EndpointsSync {
    cache: SyncCache<Endpoint>,
    modules: Arc<dyn EntityStore<Module>>,
}

impl EndpointsSync {
    pub fn new(
        store: Arc<dyn EntityStore<Endpoint>>,
        modules: Arc<dyn EntityStore<Module>>,
        notices: NoticeSink,
    ) -> Self {
        Self {
            cache: SyncCache::new(store, notices),
            modules,
        }
    }

    pub async fn set_project(&self, project_id: Option<Uuid>) -> bool {
        self.cache.set_scope(project_id).await
    }

    pub fn cache(&self) -> &SyncCache<Endpoint> {
        &self.cache
    }

    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.cache.rows().await
    }

    /// Endpoints of one module, in creation order.
    pub async fn for_module(&self, module: &str) -> Vec<Endpoint> {
        self.cache
            .rows()
            .await
            .into_iter()
            .filter(|e| e.module == module)
            .collect()
    }

    pub async fn create(&self, new: NewEndpoint) -> Option<Endpoint> {
        if !self.module_exists(&new.module).await {
            return None;
        }
        self.cache.create(new).await
    }

    pub async fn update(&self, id: Uuid, patch: EndpointPatch) -> Option<Endpoint> {
        if let Some(module) = &patch.module {
            if !self.module_exists(module).await {
                return None;
            }
        }
        self.cache.update(id, patch).await
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.cache.delete(id).await
    }

    /// Reports and returns false when `name` is not a module of the current
    /// project. Without a project the check is left to the cache.
    async fn module_exists(&self, name: &str) -> bool {
        let Some(project_id) = self.cache.scope().await else {
            return true;
        };

        match self.modules.query(project_id).await {
            Ok(snapshot) if snapshot.rows.iter().any(|m| m.name == name.trim()) => true,
            Ok(_) => {
                self.cache
                    .notices()
                    .error(ValidationError::UnknownModule(name.to_string()).to_string());
                false
            }
            Err(e) => {
                self.cache
                    .notices()
                    .error(format!("Failed to load modules: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, NewModule, NewProject, Project};
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, EndpointsSync, Project) {
        let store = Arc::new(MemoryStore::new());
        let account = store.ensure_account("user1").await;
        let project = EntityStore::<Project>::insert(&*store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        EntityStore::<Module>::insert(&*store, project.id, NewModule::new("Users"))
            .await
            .unwrap();

        let sync = EndpointsSync::new(store.clone(), store.clone(), NoticeSink::discard());
        sync.set_project(Some(project.id)).await;
        (store, sync, project)
    }

    #[tokio::test]
    async fn test_create_checks_module_and_path() {
        let (store, sync, _project) = setup().await;
        let writes = store.write_count();

        assert!(sync
            .create(NewEndpoint::new("Orders", HttpMethod::Get, "/orders"))
            .await
            .is_none());
        assert!(sync
            .create(NewEndpoint::new("Users", HttpMethod::Get, "users"))
            .await
            .is_none());
        assert_eq!(store.write_count(), writes);

        let endpoint = sync
            .create(NewEndpoint::new("Users", HttpMethod::Get, "/users/{id}"))
            .await
            .unwrap();
        assert!(endpoint.auth_required);
        assert_eq!(sync.for_module("Users").await, vec![endpoint]);
    }

    #[tokio::test]
    async fn test_update_to_unknown_module_is_refused() {
        let (_store, sync, _project) = setup().await;
        let endpoint = sync
            .create(NewEndpoint::new("Users", HttpMethod::Post, "/users"))
            .await
            .unwrap();

        let patch = EndpointPatch {
            module: Some("Billing".into()),
            ..Default::default()
        };
        assert!(sync.update(endpoint.id, patch).await.is_none());

        let patch = EndpointPatch {
            auth_required: Some(false),
            ..Default::default()
        };
        let updated = sync.update(endpoint.id, patch).await.unwrap();
        assert!(!updated.auth_required);
    }
}
