use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NoticeSink, SyncCache};
use crate::models::{Account, NewProject, Project, ProjectPatch, ProjectStatus};
use crate::store::EntityStore;
use crate::validation::ValidationError;

/// The signed-in account's projects.
pub struct ProjectsSync {
    cache: SyncCache<Project>,
    account: RwLock<Option<Account>>,
}

impl ProjectsSync {
    pub fn new(store: Arc<dyn EntityStore<Project>>, notices: NoticeSink) -> Self {
        Self {
            cache: SyncCache::new(store, notices),
            account: RwLock::new(None),
        }
    }

    /// Scopes the cache to `account`. `None` signs out and clears it.
    pub async fn set_account(&self, account: Option<Account>) -> bool {
        let scope = account.as_ref().map(|a| a.id);
        *self.account.write().await = account;
        self.cache.set_scope(scope).await
    }

    pub async fn account(&self) -> Option<Account> {
        self.account.read().await.clone()
    }

    pub fn cache(&self) -> &SyncCache<Project> {
        &self.cache
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.cache.rows().await
    }

    /// Refused without a write when there is no account or a free-tier
    /// account is already at its quota.
    pub async fn create(&self, new: NewProject) -> Option<Project> {
        let notices = self.cache.notices();

        let Some(account) = self.account().await else {
            notices.error(ValidationError::MissingContext("account").to_string());
            return None;
        };

        let owned = self.cache.rows().await.len();
        if account.at_quota(owned) {
            notices.error(
                ValidationError::QuotaReached {
                    max: account.max_projects,
                    plan: account.plan,
                }
                .to_string(),
            );
            return None;
        }

        let project = self.cache.create(new).await?;
        notices.success(format!("Created project {} ({})", project.name, project.code));
        Some(project)
    }

    pub async fn update(&self, id: Uuid, patch: ProjectPatch) -> Option<Project> {
        self.cache.update(id, patch).await
    }

    /// Moves the project along its lifecycle. Skipping a stage is rejected
    /// before any write.
    pub async fn set_status(&self, id: Uuid, status: ProjectStatus) -> Option<Project> {
        self.update(id, ProjectPatch::status(status)).await
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.cache.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanTier;
    use crate::store::MemoryStore;
    use crate::sync::NoticeLevel;

    async fn setup(free_max: i64) -> (Arc<MemoryStore>, ProjectsSync, Account) {
        let store = Arc::new(MemoryStore::with_free_max_projects(free_max));
        let account = store.ensure_account("user1").await;
        let sync = ProjectsSync::new(store.clone(), NoticeSink::discard());
        sync.set_account(Some(account.clone())).await;
        (store, sync, account)
    }

    #[tokio::test]
    async fn test_create_at_quota_is_refused_without_write() {
        let (store, sync, _account) = setup(1).await;

        let first = sync.create(NewProject::new("Shop")).await.unwrap();
        assert_eq!(first.code, "SHO-001");
        let writes = store.write_count();

        assert!(sync.create(NewProject::new("Blog")).await.is_none());
        assert_eq!(store.write_count(), writes);
        assert_eq!(sync.projects().await.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_lifted_on_paid_plan() {
        let (store, sync, account) = setup(1).await;
        sync.create(NewProject::new("Shop")).await.unwrap();

        let upgraded = store.set_plan(account.id, PlanTier::Pro).await.unwrap();
        sync.set_account(Some(upgraded)).await;

        assert!(sync.create(NewProject::new("Blog")).await.is_some());
        assert_eq!(sync.projects().await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_without_account_reports_error() {
        let store = Arc::new(MemoryStore::new());
        let (notices, mut received) = NoticeSink::channel();
        let sync = ProjectsSync::new(store.clone(), notices);

        assert!(sync.create(NewProject::new("Shop")).await.is_none());
        assert_eq!(store.write_count(), 0);

        let notice = received.try_recv().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "no account selected");
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let (_store, sync, _account) = setup(3).await;
        let project = sync
            .create(NewProject::new("Shop").with_prompt("Manages users and orders"))
            .await
            .unwrap();
        assert_eq!(project.entities, vec!["Users", "Orders"]);

        assert!(sync
            .set_status(project.id, ProjectStatus::Deployed)
            .await
            .is_none());
        let generating = sync
            .set_status(project.id, ProjectStatus::Generating)
            .await
            .unwrap();
        assert_eq!(generating.status, ProjectStatus::Generating);
        assert_eq!(
            sync.projects().await[0].status,
            ProjectStatus::Generating
        );
    }

    #[tokio::test]
    async fn test_sign_out_clears_projects() {
        let (_store, sync, _account) = setup(3).await;
        sync.create(NewProject::new("Shop")).await.unwrap();

        sync.set_account(None).await;
        assert!(sync.projects().await.is_empty());
        assert!(sync.account().await.is_none());
    }
}
