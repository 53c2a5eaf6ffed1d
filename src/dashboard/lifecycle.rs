//! Keeps a project's lifecycle status in step with a pipeline run.

use uuid::Uuid;

use super::Pipeline;
use crate::models::{Project, ProjectStatus};
use crate::sync::ProjectsSync;

/// Writes the stages a pipeline run reaches to one project.
///
/// Every write goes through [`ProjectsSync`], so watchers of the account's
/// projects see each stage.
pub struct ProjectLifecycle<'a> {
    projects: &'a ProjectsSync,
    project_id: Uuid,
}

impl<'a> ProjectLifecycle<'a> {
    pub fn new(projects: &'a ProjectsSync, project_id: Uuid) -> Self {
        Self {
            projects,
            project_id,
        }
    }

    async fn current(&self) -> Option<Project> {
        let project = self.projects.cache().get(self.project_id).await;
        if project.is_none() {
            self.projects
                .cache()
                .notices()
                .error(format!("project {} not found", self.project_id));
        }
        project
    }

    /// Puts the project back to draft so a fresh run can walk it forward.
    pub async fn begin(&self) -> Option<Project> {
        let project = self.current().await?;
        if project.status == ProjectStatus::Draft {
            return Some(project);
        }
        tracing::info!("Resetting {} to draft for a new run", project.code);
        self.projects
            .set_status(self.project_id, ProjectStatus::Draft)
            .await
    }

    /// Advances the project one stage at a time until it matches what
    /// `pipeline` has reached. Never moves it backwards.
    pub async fn follow(&self, pipeline: &Pipeline) -> Option<Project> {
        let target = pipeline.project_status();
        let mut project = self.current().await?;

        while project.status.rank() < target.rank() {
            let Some(next) = project.status.successor() else {
                break;
            };
            project = self.projects.set_status(self.project_id, next).await?;
        }
        Some(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewProject;
    use crate::store::{EntityStore, MemoryStore};
    use crate::sync::NoticeSink;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryStore>, ProjectsSync, Project) {
        let store = Arc::new(MemoryStore::new());
        let account = store.ensure_account("user1").await;
        let projects = ProjectsSync::new(store.clone(), NoticeSink::discard());
        projects.set_account(Some(account)).await;
        let project = projects.create(NewProject::new("Shop")).await.unwrap();
        (store, projects, project)
    }

    #[tokio::test]
    async fn test_full_run_deploys_project() {
        let (store, projects, project) = setup().await;
        let lifecycle = ProjectLifecycle::new(&projects, project.id);
        assert_eq!(lifecycle.begin().await.unwrap().status, ProjectStatus::Draft);

        let mut seen = vec![ProjectStatus::Draft];
        let mut pipeline = Pipeline::new();
        while !pipeline.is_finished() {
            pipeline = if pipeline.is_waiting() {
                pipeline.approve().0
            } else {
                pipeline.tick().0
            };
            let status = lifecycle.follow(&pipeline).await.unwrap().status;
            if seen.last() != Some(&status) {
                seen.push(status);
            }
        }

        assert_eq!(
            seen,
            vec![
                ProjectStatus::Draft,
                ProjectStatus::Generating,
                ProjectStatus::Ready,
                ProjectStatus::Deployed
            ]
        );
        let stored = EntityStore::<Project>::query(&*store, project.account_id)
            .await
            .unwrap();
        assert_eq!(stored.rows[0].status, ProjectStatus::Deployed);
    }

    #[tokio::test]
    async fn test_begin_resets_and_follow_never_goes_back() {
        let (_store, projects, project) = setup().await;
        projects
            .set_status(project.id, ProjectStatus::Generating)
            .await
            .unwrap();
        projects
            .set_status(project.id, ProjectStatus::Ready)
            .await
            .unwrap();

        let lifecycle = ProjectLifecycle::new(&projects, project.id);
        let fresh = Pipeline::new();
        assert_eq!(
            lifecycle.follow(&fresh).await.unwrap().status,
            ProjectStatus::Ready
        );
        assert_eq!(lifecycle.begin().await.unwrap().status, ProjectStatus::Draft);
    }
}
