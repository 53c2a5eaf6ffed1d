use std::sync::Arc;
use uuid::Uuid;

use super::{NoticeSink, SyncCache};
use crate::models::{Module, ModulePatch, NewModule, WorkStatus};
use crate::store::EntityStore;

/// Modules of the selected project.
///
/// Names are unique per project and dependencies must name existing
/// siblings; both are checked before the write goes out.
pub struct ModulesSync {
    cache: SyncCache<Module>,
}

impl ModulesSync {
    pub fn new(store: Arc<dyn EntityStore<Module>>, notices: NoticeSink) -> Self {
        Self {
            cache: SyncCache::new(store, notices),
        }
    }

    pub async fn set_project(&self, project_id: Option<Uuid>) -> bool {
        self.cache.set_scope(project_id).await
    }

    pub fn cache(&self) -> &SyncCache<Module> {
        &self.cache
    }

    pub async fn modules(&self) -> Vec<Module> {
        self.cache.rows().await
    }

    pub async fn create(&self, new: NewModule) -> Option<Module> {
        self.cache.create(new).await
    }

    pub async fn update(&self, id: Uuid, patch: ModulePatch) -> Option<Module> {
        self.cache.update(id, patch).await
    }

    /// Renames the module. The store carries the new name into dependency
    /// lists, endpoints and tasks.
    pub async fn rename(&self, id: Uuid, name: impl Into<String>) -> Option<Module> {
        let patch = ModulePatch {
            name: Some(name.into()),
            ..Default::default()
        };
        self.update(id, patch).await
    }

    pub async fn set_status(&self, id: Uuid, status: WorkStatus) -> Option<Module> {
        let patch = ModulePatch {
            status: Some(status),
            ..Default::default()
        };
        self.cache.update_optimistic(id, patch).await
    }

    pub async fn set_dependencies(&self, id: Uuid, dependencies: Vec<String>) -> Option<Module> {
        let patch = ModulePatch {
            dependencies: Some(dependencies),
            ..Default::default()
        };
        self.update(id, patch).await
    }

    /// Deletes the module. The store drops its name from sibling dependency
    /// lists and removes the endpoints filed under it.
    pub async fn delete(&self, id: Uuid) -> bool {
        self.cache.delete(id).await
    }
}
