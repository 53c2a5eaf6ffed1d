use clap::{Args, ValueEnum};

use super::{CommandResult, Session};
use backforge::models::{Endpoint, Module, Project, Task};
use backforge::store::Entity;
use backforge::sync::SyncCache;

#[derive(Clone, Copy, ValueEnum)]
pub enum WatchTable {
    Projects,
    Modules,
    Endpoints,
    Tasks,
}

#[derive(Args)]
pub struct WatchCommand {
    /// Table to follow
    #[arg(value_enum)]
    table: WatchTable,

    /// Project ID, code or name (not needed for projects)
    #[arg(long, short)]
    project: Option<String>,

    /// Stop after this many updates
    #[arg(long)]
    count: Option<usize>,
}

fn render_project(p: &Project) -> String {
    format!("{:<10}  {:<30}  {}", p.code, p.name, p.status)
}

fn render_module(m: &Module) -> String {
    format!("{:<24}  {:<12}  {}", m.name, m.status, m.dependencies.join(", "))
}

fn render_endpoint(e: &Endpoint) -> String {
    format!("{:<7}  {:<32}  {}", e.method, e.path, e.module)
}

fn render_task(t: &Task) -> String {
    format!("{:<7}  {:<12}  {}", t.code, t.status, t.title)
}

/// Prints the cache now and after every change until interrupted.
async fn follow<E: Entity>(
    session: &mut Session,
    cache: &SyncCache<E>,
    render: fn(&E) -> String,
    count: Option<usize>,
) -> CommandResult {
    let mut updates = cache.updates();
    let mut seen = 0;

    loop {
        session.settle(Some(()))?;
        let rows = cache.rows().await;
        println!(
            "[{}] {} {}",
            chrono::Local::now().format("%H:%M:%S"),
            rows.len(),
            E::TABLE
        );
        for row in &rows {
            println!("  {}", render(row));
        }

        if count.is_some_and(|n| seen >= n) {
            return Ok(());
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                seen += 1;
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

impl WatchCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        if let WatchTable::Projects = self.table {
            let sync = session.projects().await?;
            return follow(session, sync.cache(), render_project, self.count).await;
        }

        let identifier = self
            .project
            .as_deref()
            .ok_or("--project is required to watch modules, endpoints or tasks")?;
        let project = session.project(identifier).await?;
        eprintln!("Watching {} (Ctrl+C to stop)", project.code);

        match self.table {
            WatchTable::Projects => Ok(()),
            WatchTable::Modules => {
                let sync = session.modules(&project).await?;
                follow(session, sync.cache(), render_module, self.count).await
            }
            WatchTable::Endpoints => {
                let sync = session.endpoints(&project).await?;
                follow(session, sync.cache(), render_endpoint, self.count).await
            }
            WatchTable::Tasks => {
                let sync = session.tasks(&project).await?;
                follow(session, sync.cache(), render_task, self.count).await
            }
        }
    }
}
