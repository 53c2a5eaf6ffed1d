mod account;
mod config_cmd;
mod demo;
mod endpoint;
mod module;
mod project;
mod task;
mod waitlist_cmd;
mod watch;

pub use account::AccountCommand;
pub use config_cmd::ConfigCommand;
pub use demo::DemoCommand;
pub use endpoint::EndpointCommand;
pub use module::ModuleCommand;
pub use project::ProjectCommand;
pub use task::TaskCommand;
pub use waitlist_cmd::WaitlistCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use backforge::config::Config;
use backforge::models::{Account, Endpoint, Module, Project, Task};
use backforge::store::{EntityStore, HttpStore, SqliteStore};
use backforge::sync::{
    EndpointsSync, ModulesSync, Notice, NoticeLevel, NoticeSink, ProjectsSync, TasksSync,
};

pub type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Where rows are read from and written to.
pub enum Backend {
    /// The local SQLite database.
    Local(Arc<SqliteStore>),
    /// A Backforge server.
    Remote(Arc<HttpStore>),
}

impl Backend {
    fn entity_store<E>(&self) -> Arc<dyn EntityStore<E>>
    where
        E: backforge::store::Entity,
        SqliteStore: EntityStore<E>,
        HttpStore: EntityStore<E>,
    {
        match self {
            Backend::Local(store) => store.clone(),
            Backend::Remote(store) => store.clone(),
        }
    }
}

/// One CLI invocation: the backend, the signed-in account and the notice
/// channel every sync cache reports to.
pub struct Session {
    pub backend: Backend,
    pub account: Account,
    notices: NoticeSink,
    receiver: mpsc::UnboundedReceiver<Notice>,
}

impl Session {
    /// Uses the server when one is configured, else the local database.
    pub async fn connect(config: &Config) -> CommandResult<Self> {
        let (backend, account) = match (&config.server.server_url, &config.server.api_key) {
            (Some(url), Some(key)) => {
                let store = Arc::new(HttpStore::new(url.as_str(), key.as_str()));
                let account = store.me().await?;
                tracing::debug!("Connected to {} as {}", url, account.user_id);
                (Backend::Remote(store), account)
            }
            _ => {
                let store = SqliteStore::open(
                    &config.database_path.value,
                    config.free_max_projects.value,
                )
                .await?;
                let account = store.ensure_account(&config.user.value).await?;
                (Backend::Local(Arc::new(store)), account)
            }
        };

        let (notices, receiver) = NoticeSink::channel();
        Ok(Self {
            backend,
            account,
            notices,
            receiver,
        })
    }

    pub fn notices(&self) -> NoticeSink {
        self.notices.clone()
    }

    /// Prints pending notices to stderr. A `None` result becomes an error
    /// carrying the last error notice.
    pub fn settle<T>(&mut self, result: Option<T>) -> CommandResult<T> {
        let mut last_error: Option<String> = None;
        while let Ok(notice) = self.receiver.try_recv() {
            match notice.level {
                NoticeLevel::Error => {
                    if let Some(previous) = last_error.replace(notice.message) {
                        eprintln!("Error: {}", previous);
                    }
                }
                _ => eprintln!("{}", notice),
            }
        }

        match result {
            Some(value) => {
                if let Some(message) = last_error {
                    eprintln!("Error: {}", message);
                }
                Ok(value)
            }
            None => Err(last_error
                .unwrap_or_else(|| "operation failed".to_string())
                .into()),
        }
    }

    /// The account's projects, loaded.
    pub async fn projects(&mut self) -> CommandResult<ProjectsSync> {
        let sync = ProjectsSync::new(self.backend.entity_store(), self.notices());
        let loaded = sync.set_account(Some(self.account.clone())).await;
        self.settle(loaded.then_some(()))?;
        Ok(sync)
    }

    /// Finds a project by id, code or name.
    pub async fn project(&mut self, identifier: &str) -> CommandResult<Project> {
        let projects = self.projects().await?.projects().await;
        resolve_project(&projects, identifier)
    }

    pub async fn modules(&mut self, project: &Project) -> CommandResult<ModulesSync> {
        let sync = ModulesSync::new(self.backend.entity_store::<Module>(), self.notices());
        let loaded = sync.set_project(Some(project.id)).await;
        self.settle(loaded.then_some(()))?;
        Ok(sync)
    }

    pub async fn endpoints(&mut self, project: &Project) -> CommandResult<EndpointsSync> {
        let sync = EndpointsSync::new(
            self.backend.entity_store::<Endpoint>(),
            self.backend.entity_store::<Module>(),
            self.notices(),
        );
        let loaded = sync.set_project(Some(project.id)).await;
        self.settle(loaded.then_some(()))?;
        Ok(sync)
    }

    pub async fn tasks(&mut self, project: &Project) -> CommandResult<TasksSync> {
        let sync = TasksSync::new(self.backend.entity_store::<Task>(), self.notices());
        let loaded = sync.set_project(Some(project.id)).await;
        self.settle(loaded.then_some(()))?;
        Ok(sync)
    }
}

pub fn find_project<'a>(projects: &'a [Project], identifier: &str) -> Option<&'a Project> {
    if let Ok(id) = Uuid::parse_str(identifier) {
        return projects.iter().find(|p| p.id == id);
    }
    projects
        .iter()
        .find(|p| p.code.eq_ignore_ascii_case(identifier))
        .or_else(|| projects.iter().find(|p| p.name.eq_ignore_ascii_case(identifier)))
}

pub fn resolve_project(projects: &[Project], identifier: &str) -> CommandResult<Project> {
    find_project(projects, identifier)
        .cloned()
        .ok_or_else(|| format!("Project not found: {}", identifier).into())
}

/// Asks for confirmation on stdin. Anything but `y` declines.
pub fn confirm(prompt: &str) -> CommandResult<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
