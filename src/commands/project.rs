use clap::{Args, Subcommand};

use super::{confirm, print_json, resolve_project, CommandResult, OutputFormat, Session};
use backforge::models::{NewProject, ProjectPatch, ProjectStatus};

#[derive(Args)]
pub struct ProjectCommand {
    #[command(subcommand)]
    pub command: ProjectSubcommand,
}

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Create a new project
    Create {
        /// Name of the project
        name: String,

        /// Short code (derived from the name when omitted)
        #[arg(long)]
        code: Option<String>,

        /// Backend framework
        #[arg(long, default_value = "node")]
        backend: String,

        /// Database
        #[arg(long, default_value = "postgres")]
        database: String,

        /// Free-form description; entities and auth are read from it
        #[arg(long)]
        prompt: Option<String>,
    },

    /// List the account's projects
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a project's details
    Show {
        /// Project ID, code or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an existing project
    Update {
        /// Project ID, code or name
        identifier: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// Backend framework
        #[arg(long)]
        backend: Option<String>,

        /// Database
        #[arg(long)]
        database: Option<String>,

        /// Replace the prompt
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Move a project along draft, generating, ready, deployed
    Status {
        /// Project ID, code or name
        identifier: String,

        /// New status
        status: ProjectStatus,
    },

    /// Delete a project and everything in it
    Delete {
        /// Project ID, code or name
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

impl ProjectCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        match &self.command {
            ProjectSubcommand::Create {
                name,
                code,
                backend,
                database,
                prompt,
            } => {
                let mut new = NewProject::new(name.as_str()).with_stack(backend, database);
                if let Some(code) = code {
                    new = new.with_code(code);
                }
                if let Some(prompt) = prompt {
                    new = new.with_prompt(prompt);
                }

                let projects = session.projects().await?;
                let created = projects.create(new).await;
                let project = session.settle(created)?;
                println!("{}", project);
                Ok(())
            }

            ProjectSubcommand::List { format } => {
                let projects = session.projects().await?.projects().await;
                match format {
                    OutputFormat::Json => print_json(&projects)?,
                    OutputFormat::Text => {
                        if projects.is_empty() {
                            println!("No projects yet.");
                            return Ok(());
                        }
                        println!("{:<10}  {:<30}  {:<10}  STACK", "CODE", "NAME", "STATUS");
                        println!("{}", "-".repeat(72));
                        for p in &projects {
                            println!(
                                "{:<10}  {:<30}  {:<10}  {} + {}",
                                p.code, p.name, p.status, p.backend, p.database
                            );
                        }
                        println!(
                            "\n{} of {} projects ({} plan)",
                            projects.len(),
                            session.account.max_projects,
                            session.account.plan
                        );
                    }
                }
                Ok(())
            }

            ProjectSubcommand::Show { identifier, format } => {
                let project = session.project(identifier).await?;
                match format {
                    OutputFormat::Json => print_json(&project)?,
                    OutputFormat::Text => println!("{}", project),
                }
                Ok(())
            }

            ProjectSubcommand::Update {
                identifier,
                name,
                backend,
                database,
                prompt,
            } => {
                let patch = ProjectPatch {
                    name: name.clone(),
                    backend: backend.clone(),
                    database: database.clone(),
                    prompt: prompt.clone().map(Some),
                    ..Default::default()
                };
                if patch == ProjectPatch::default() {
                    return Err("Nothing to update".into());
                }

                let projects = session.projects().await?;
                let project = resolve_project(&projects.projects().await, identifier)?;
                let updated = projects.update(project.id, patch).await;
                let project = session.settle(updated)?;
                println!("Updated project:");
                println!("{}", project);
                Ok(())
            }

            ProjectSubcommand::Status { identifier, status } => {
                let projects = session.projects().await?;
                let project = resolve_project(&projects.projects().await, identifier)?;
                let updated = projects.set_status(project.id, *status).await;
                let project = session.settle(updated)?;
                println!("{} is now {}", project.code, project.status);
                Ok(())
            }

            ProjectSubcommand::Delete { identifier, force } => {
                let projects = session.projects().await?;
                let project = resolve_project(&projects.projects().await, identifier)?;

                if !force && !confirm(&format!("Delete project '{}'?", project.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = projects.delete(project.id).await;
                session.settle(deleted.then_some(()))?;
                println!("Deleted project: {}", project.name);
                Ok(())
            }
        }
    }
}
