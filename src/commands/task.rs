use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{confirm, print_json, CommandResult, OutputFormat, Session};
use backforge::models::{NewTask, Task, TaskPatch, WorkStatus};
use backforge::sync::group_by_status;

#[derive(Args)]
pub struct TaskCommand {
    /// Project ID, code or name
    #[arg(long, short, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: TaskSubcommand,
}

#[derive(Subcommand)]
pub enum TaskSubcommand {
    /// Add a task to the board
    Add {
        /// Task title
        title: String,

        /// Owning module
        #[arg(long, short)]
        module: String,

        /// Column to add it to
        #[arg(long, default_value = "todo")]
        status: WorkStatus,

        /// Agent to assign
        #[arg(long)]
        agent: Option<String>,
    },

    /// List tasks in board order
    List {
        /// Only tasks in this column
        #[arg(long)]
        status: Option<WorkStatus>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the board, one column per status
    Board,

    /// Move a task to the end of another column
    Move {
        /// Task code or ID
        task: String,
        status: WorkStatus,
    },

    /// Assign a task to an agent, or clear the assignment
    Assign {
        /// Task code or ID
        task: String,

        /// Agent label; omit to unassign
        agent: Option<String>,
    },

    /// Rename a task or move it to another module
    Update {
        /// Task code or ID
        task: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        module: Option<String>,
    },

    /// Delete a task
    Delete {
        /// Task code or ID
        task: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn find<'a>(tasks: &'a [Task], identifier: &str) -> CommandResult<&'a Task> {
    let found = match Uuid::parse_str(identifier) {
        Ok(id) => tasks.iter().find(|t| t.id == id),
        Err(_) => tasks
            .iter()
            .find(|t| t.code.eq_ignore_ascii_case(identifier.trim())),
    };
    found.ok_or_else(|| format!("Task not found: {}", identifier).into())
}

fn print_row(task: &Task) {
    println!(
        "{:<7}  {:<40}  {:<16}  {:<12}  {}",
        task.code,
        task.title,
        task.module,
        task.status,
        task.agent.as_deref().unwrap_or("-")
    );
}

impl TaskCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        let identifier = self
            .project
            .as_deref()
            .ok_or("--project is required for task commands")?;
        let project = session.project(identifier).await?;
        let sync = session.tasks(&project).await?;
        let tasks = sync.tasks().await;

        match &self.command {
            TaskSubcommand::Add {
                title,
                module,
                status,
                agent,
            } => {
                let mut new = NewTask::new(title.as_str(), module.as_str()).with_status(*status);
                if let Some(agent) = agent {
                    new = new.with_agent(agent);
                }
                let created = sync.create(new).await;
                let task = session.settle(created)?;
                println!("Added {} \"{}\" to {}", task.code, task.title, task.status);
                Ok(())
            }

            TaskSubcommand::List { status, format } => {
                let tasks: Vec<Task> = group_by_status(&tasks)
                    .into_iter()
                    .filter(|(column, _)| status.map_or(true, |s| s == *column))
                    .flat_map(|(_, tasks)| tasks)
                    .collect();
                match format {
                    OutputFormat::Json => print_json(&tasks)?,
                    OutputFormat::Text => {
                        if tasks.is_empty() {
                            println!("No tasks.");
                            return Ok(());
                        }
                        println!(
                            "{:<7}  {:<40}  {:<16}  {:<12}  AGENT",
                            "CODE", "TITLE", "MODULE", "STATUS"
                        );
                        println!("{}", "-".repeat(90));
                        for task in &tasks {
                            print_row(task);
                        }
                    }
                }
                Ok(())
            }

            TaskSubcommand::Board => {
                for (status, column) in sync.grouped().await {
                    println!("{} ({})", status, column.len());
                    for task in &column {
                        match &task.agent {
                            Some(agent) => println!("  {}  {}  [{}]", task.code, task.title, agent),
                            None => println!("  {}  {}", task.code, task.title),
                        }
                    }
                    println!();
                }
                Ok(())
            }

            TaskSubcommand::Move { task, status } => {
                let task = find(&tasks, task)?;
                let moved = sync.move_task(task.id, *status).await;
                let task = session.settle(moved)?;
                println!("{} moved to {}", task.code, task.status);
                Ok(())
            }

            TaskSubcommand::Assign { task, agent } => {
                let task = find(&tasks, task)?;
                let assigned = sync.assign(task.id, agent.clone()).await;
                let task = session.settle(assigned)?;
                match &task.agent {
                    Some(agent) => println!("{} assigned to {}", task.code, agent),
                    None => println!("{} unassigned", task.code),
                }
                Ok(())
            }

            TaskSubcommand::Update {
                task,
                title,
                module,
            } => {
                let patch = TaskPatch {
                    title: title.clone(),
                    module: module.clone(),
                    ..Default::default()
                };
                if patch == TaskPatch::default() {
                    return Err("Nothing to update".into());
                }

                let task = find(&tasks, task)?;
                let updated = sync.update(task.id, patch).await;
                let task = session.settle(updated)?;
                print_row(&task);
                Ok(())
            }

            TaskSubcommand::Delete { task, force } => {
                let task = find(&tasks, task)?;
                if !force && !confirm(&format!("Delete task {} \"{}\"?", task.code, task.title))?
                {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = sync.delete(task.id).await;
                session.settle(deleted.then_some(()))?;
                println!("Deleted task: {}", task.code);
                Ok(())
            }
        }
    }
}
