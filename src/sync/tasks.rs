use std::sync::Arc;
use uuid::Uuid;

use super::{NoticeSink, SyncCache};
use crate::models::{next_position, NewTask, Task, TaskPatch, WorkStatus};
use crate::store::EntityStore;

/// The task board of the selected project.
pub struct TasksSync {
    cache: SyncCache<Task>,
}

impl TasksSync {
    pub fn new(store: Arc<dyn EntityStore<Task>>, notices: NoticeSink) -> Self {
        Self {
            cache: SyncCache::new(store, notices),
        }
    }

    pub async fn set_project(&self, project_id: Option<Uuid>) -> bool {
        self.cache.set_scope(project_id).await
    }

    pub fn cache(&self) -> &SyncCache<Task> {
        &self.cache
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.cache.rows().await
    }

    /// Code and position are derived when not given.
    pub async fn create(&self, new: NewTask) -> Option<Task> {
        self.cache.create(new).await
    }

    /// A status change without an explicit position lands at the end of the
    /// target column.
    pub async fn update(&self, id: Uuid, mut patch: TaskPatch) -> Option<Task> {
        if let (Some(status), None) = (patch.status, patch.position) {
            let tasks = self.cache.rows().await;
            let moves = tasks.iter().any(|t| t.id == id && t.status != status);
            if moves {
                patch.position = Some(self.end_of_column(&tasks, id, status)?);
            }
        }
        self.cache.update(id, patch).await
    }

    /// Moves the task to the end of the `status` column. The move shows in
    /// the cache before the write completes.
    pub async fn move_task(&self, id: Uuid, status: WorkStatus) -> Option<Task> {
        let tasks = self.cache.rows().await;
        let Some(task) = tasks.iter().find(|t| t.id == id) else {
            self.cache
                .notices()
                .error(format!("task {} not found", id));
            return None;
        };
        if task.status == status {
            return Some(task.clone());
        }

        let patch = TaskPatch {
            status: Some(status),
            position: Some(self.end_of_column(&tasks, id, status)?),
            ..Default::default()
        };
        self.cache.update_optimistic(id, patch).await
    }

    fn end_of_column(&self, tasks: &[Task], id: Uuid, status: WorkStatus) -> Option<i64> {
        let others: Vec<Task> = tasks.iter().filter(|t| t.id != id).cloned().collect();
        match next_position(&others, status) {
            Ok(position) => Some(position),
            Err(e) => {
                self.cache.notices().error(e.to_string());
                None
            }
        }
    }

    pub async fn assign(&self, id: Uuid, agent: Option<String>) -> Option<Task> {
        let patch = TaskPatch {
            agent: Some(agent),
            ..Default::default()
        };
        self.update(id, patch).await
    }

    pub async fn delete(&self, id: Uuid) -> bool {
        self.cache.delete(id).await
    }

    /// Tasks by board column, left to right, each in position order.
    pub async fn grouped(&self) -> Vec<(WorkStatus, Vec<Task>)> {
        group_by_status(&self.cache.rows().await)
    }
}

pub fn group_by_status(tasks: &[Task]) -> Vec<(WorkStatus, Vec<Task>)> {
    WorkStatus::COLUMNS
        .iter()
        .map(|&status| {
            let column = tasks.iter().filter(|t| t.status == status).cloned().collect();
            (status, column)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProject, Project};
    use crate::store::MemoryStore;
    use crate::sync::cache::test_support::wait_until;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, Arc<TasksSync>) {
        let store = Arc::new(MemoryStore::new());
        let account = store.ensure_account("user1").await;
        let project = EntityStore::<Project>::insert(&*store, account.id, NewProject::new("Shop"))
            .await
            .unwrap();
        let sync = Arc::new(TasksSync::new(store.clone(), NoticeSink::discard()));
        sync.set_project(Some(project.id)).await;
        (store, sync)
    }

    fn column(grouped: &[(WorkStatus, Vec<Task>)], status: WorkStatus) -> Vec<String> {
        grouped
            .iter()
            .find(|(s, _)| *s == status)
            .map(|(_, tasks)| tasks.iter().map(|t| t.code.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_derives_code_and_position() {
        let (_store, sync) = setup().await;

        let first = sync.create(NewTask::new("Schema", "Users")).await.unwrap();
        let second = sync.create(NewTask::new("Routes", "Users")).await.unwrap();
        let done = sync
            .create(NewTask::new("Setup", "Core").with_status(WorkStatus::Done))
            .await
            .unwrap();

        assert_eq!((first.code.as_str(), first.position), ("T-001", 0));
        assert_eq!((second.code.as_str(), second.position), ("T-002", 1));
        assert_eq!((done.code.as_str(), done.position), ("T-003", 0));
    }

    #[tokio::test]
    async fn test_move_shows_before_write_completes() {
        let (store, sync) = setup().await;
        let task = sync.create(NewTask::new("Schema", "Users")).await.unwrap();
        sync.create(NewTask::new("Routes", "Users").with_status(WorkStatus::InProgress))
            .await
            .unwrap();

        store
            .set_write_latency(Some(Duration::from_millis(200)))
            .await;
        let pending = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.move_task(task.id, WorkStatus::InProgress).await })
        };

        wait_until(sync.cache(), |tasks| {
            tasks
                .iter()
                .any(|t| t.id == task.id && t.status == WorkStatus::InProgress)
        })
        .await;
        let grouped = sync.grouped().await;
        assert_eq!(column(&grouped, WorkStatus::InProgress), vec!["T-002", "T-001"]);
        assert!(!pending.is_finished());

        let moved = pending.await.unwrap().unwrap();
        assert_eq!(moved.position, 1);
        assert_eq!(column(&sync.grouped().await, WorkStatus::Todo).len(), 0);
    }

    #[tokio::test]
    async fn test_failed_move_reverts() {
        let (store, sync) = setup().await;
        let task = sync.create(NewTask::new("Schema", "Users")).await.unwrap();

        store.set_fail_writes(true).await;
        assert!(sync.move_task(task.id, WorkStatus::Done).await.is_none());

        let grouped = sync.grouped().await;
        assert_eq!(column(&grouped, WorkStatus::Todo), vec!["T-001"]);
        assert!(column(&grouped, WorkStatus::Done).is_empty());
    }

    #[tokio::test]
    async fn test_status_update_appends_to_target_column() {
        let (_store, sync) = setup().await;
        sync.create(NewTask::new("Routes", "Users").with_status(WorkStatus::InProgress))
            .await
            .unwrap();
        sync.create(NewTask::new("Schema", "Users")).await.unwrap();
        let docs = sync.create(NewTask::new("Docs", "Users")).await.unwrap();
        assert_eq!(docs.position, 1);

        let patch = TaskPatch {
            status: Some(WorkStatus::InProgress),
            title: Some("API docs".into()),
            ..Default::default()
        };
        let updated = sync.update(docs.id, patch).await.unwrap();
        assert_eq!(updated.position, 1);
        assert_eq!(
            column(&sync.grouped().await, WorkStatus::InProgress),
            vec!["T-001", "T-003"]
        );

        let pinned = TaskPatch {
            status: Some(WorkStatus::Done),
            position: Some(7),
            ..Default::default()
        };
        assert_eq!(sync.update(docs.id, pinned).await.unwrap().position, 7);
    }

    #[tokio::test]
    async fn test_assign_and_clear_agent() {
        let (_store, sync) = setup().await;
        let task = sync.create(NewTask::new("Schema", "Users")).await.unwrap();

        let assigned = sync
            .assign(task.id, Some("Schema Architect".into()))
            .await
            .unwrap();
        assert_eq!(assigned.agent.as_deref(), Some("Schema Architect"));

        let cleared = sync.assign(task.id, None).await.unwrap();
        assert!(cleared.agent.is_none());
    }

    #[test]
    fn test_group_by_status_keeps_all_columns() {
        let grouped = group_by_status(&[]);
        let statuses: Vec<WorkStatus> = grouped.iter().map(|(s, _)| *s).collect();
        assert_eq!(statuses, WorkStatus::COLUMNS.to_vec());
    }
}
