use clap::{Args, Subcommand};

use super::{confirm, print_json, CommandResult, OutputFormat, Session};
use backforge::models::{Module, NewModule, WorkStatus};

#[derive(Args)]
pub struct ModuleCommand {
    /// Project ID, code or name
    #[arg(long, short, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: ModuleSubcommand,
}

#[derive(Subcommand)]
pub enum ModuleSubcommand {
    /// Add a module to the project
    Add {
        /// Module name, unique within the project
        name: String,

        /// Initial status
        #[arg(long, default_value = "todo")]
        status: WorkStatus,

        /// Module this one depends on (can be repeated)
        #[arg(long = "depends-on", value_name = "MODULE")]
        depends_on: Vec<String>,
    },

    /// List the project's modules
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Rename a module
    Rename {
        name: String,
        new_name: String,
    },

    /// Set a module's status
    Status {
        name: String,
        status: WorkStatus,
    },

    /// Replace a module's dependencies
    Deps {
        name: String,

        /// Modules it depends on; none clears the list
        dependencies: Vec<String>,
    },

    /// Delete a module
    Delete {
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

fn find<'a>(modules: &'a [Module], name: &str) -> CommandResult<&'a Module> {
    modules
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| format!("Module not found: {}", name).into())
}

impl ModuleCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        let identifier = self
            .project
            .as_deref()
            .ok_or("--project is required for module commands")?;
        let project = session.project(identifier).await?;
        let sync = session.modules(&project).await?;
        let modules = sync.modules().await;

        match &self.command {
            ModuleSubcommand::Add {
                name,
                status,
                depends_on,
            } => {
                let mut new = NewModule::new(name.as_str()).with_dependencies(depends_on.clone());
                new.status = *status;
                let created = sync.create(new).await;
                let module = session.settle(created)?;
                println!("Added module {} to {}", module.name, project.code);
                Ok(())
            }

            ModuleSubcommand::List { format } => {
                match format {
                    OutputFormat::Json => print_json(&modules)?,
                    OutputFormat::Text => {
                        if modules.is_empty() {
                            println!("No modules in {}.", project.code);
                            return Ok(());
                        }
                        println!("{:<24}  {:<12}  DEPENDS ON", "NAME", "STATUS");
                        println!("{}", "-".repeat(60));
                        for m in &modules {
                            println!(
                                "{:<24}  {:<12}  {}",
                                m.name,
                                m.status,
                                m.dependencies.join(", ")
                            );
                        }
                    }
                }
                Ok(())
            }

            ModuleSubcommand::Rename { name, new_name } => {
                let module = find(&modules, name)?;
                let renamed = sync.rename(module.id, new_name.as_str()).await;
                let module = session.settle(renamed)?;
                println!("Renamed module to {}", module.name);
                Ok(())
            }

            ModuleSubcommand::Status { name, status } => {
                let module = find(&modules, name)?;
                let updated = sync.set_status(module.id, *status).await;
                let module = session.settle(updated)?;
                println!("{} is now {}", module.name, module.status);
                Ok(())
            }

            ModuleSubcommand::Deps { name, dependencies } => {
                let module = find(&modules, name)?;
                let updated = sync
                    .set_dependencies(module.id, dependencies.clone())
                    .await;
                let module = session.settle(updated)?;
                if module.dependencies.is_empty() {
                    println!("{} has no dependencies", module.name);
                } else {
                    println!("{} depends on {}", module.name, module.dependencies.join(", "));
                }
                Ok(())
            }

            ModuleSubcommand::Delete { name, force } => {
                let module = find(&modules, name)?;
                if !force && !confirm(&format!("Delete module '{}'?", module.name))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = sync.delete(module.id).await;
                session.settle(deleted.then_some(()))?;
                println!("Deleted module: {}", module.name);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backforge::store::Entity;
    use uuid::Uuid;

    #[test]
    fn test_find_ignores_case_and_whitespace() {
        let module = Module::create(Uuid::new_v4(), NewModule::new("Billing"), &[]).unwrap();
        let modules = vec![module];
        assert_eq!(find(&modules, " billing ").unwrap().name, "Billing");
        assert!(find(&modules, "auth").is_err());
    }
}
