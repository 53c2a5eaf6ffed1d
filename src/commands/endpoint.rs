use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{confirm, print_json, CommandResult, OutputFormat, Session};
use backforge::models::{Endpoint, EndpointPatch, HttpMethod, NewEndpoint};

#[derive(Args)]
pub struct EndpointCommand {
    /// Project ID, code or name
    #[arg(long, short, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: EndpointSubcommand,
}

#[derive(Subcommand)]
pub enum EndpointSubcommand {
    /// Add an endpoint to a module
    Add {
        /// HTTP method
        method: HttpMethod,

        /// Route path, starting with '/'
        path: String,

        /// Owning module
        #[arg(long, short)]
        module: String,

        /// What the endpoint does
        #[arg(long, default_value = "")]
        description: String,

        /// Reachable without authentication
        #[arg(long)]
        public: bool,
    },

    /// List the project's endpoints
    List {
        /// Only endpoints of this module
        #[arg(long, short)]
        module: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Update an endpoint
    Update {
        /// Endpoint ID or path
        identifier: String,

        /// Pick among endpoints sharing the path
        #[arg(long = "for-method", value_name = "METHOD")]
        for_method: Option<HttpMethod>,

        /// New method
        #[arg(long)]
        method: Option<HttpMethod>,

        /// New path
        #[arg(long)]
        path: Option<String>,

        /// Move to another module
        #[arg(long)]
        module: Option<String>,

        #[arg(long)]
        description: Option<String>,

        /// Require authentication (true/false)
        #[arg(long)]
        auth_required: Option<bool>,
    },

    /// Delete an endpoint
    Delete {
        /// Endpoint ID or path
        identifier: String,

        /// Pick among endpoints sharing the path
        #[arg(long = "for-method", value_name = "METHOD")]
        for_method: Option<HttpMethod>,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Finds an endpoint by id, or by path plus an optional method when
/// several methods share the path.
fn find<'a>(
    endpoints: &'a [Endpoint],
    identifier: &str,
    method: Option<HttpMethod>,
) -> CommandResult<&'a Endpoint> {
    if let Ok(id) = Uuid::parse_str(identifier) {
        return endpoints
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| format!("Endpoint not found: {}", identifier).into());
    }

    let matches: Vec<&Endpoint> = endpoints
        .iter()
        .filter(|e| e.path == identifier)
        .filter(|e| method.map_or(true, |m| e.method == m))
        .collect();
    match matches.as_slice() {
        [one] => Ok(*one),
        [] => Err(format!("Endpoint not found: {}", identifier).into()),
        _ => Err(format!(
            "Several endpoints use {}; pick one with --for-method",
            identifier
        )
        .into()),
    }
}

impl EndpointCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        let identifier = self
            .project
            .as_deref()
            .ok_or("--project is required for endpoint commands")?;
        let project = session.project(identifier).await?;
        let sync = session.endpoints(&project).await?;

        match &self.command {
            EndpointSubcommand::Add {
                method,
                path,
                module,
                description,
                public,
            } => {
                let mut new = NewEndpoint::new(module.as_str(), *method, path.as_str());
                new.description = description.clone();
                new.auth_required = !public;

                let created = sync.create(new).await;
                let endpoint = session.settle(created)?;
                println!(
                    "Added {} {} to module {}",
                    endpoint.method, endpoint.path, endpoint.module
                );
                Ok(())
            }

            EndpointSubcommand::List { module, format } => {
                let endpoints = match module {
                    Some(module) => sync.for_module(module).await,
                    None => sync.endpoints().await,
                };
                match format {
                    OutputFormat::Json => print_json(&endpoints)?,
                    OutputFormat::Text => {
                        if endpoints.is_empty() {
                            println!("No endpoints.");
                            return Ok(());
                        }
                        println!(
                            "{:<7}  {:<32}  {:<16}  {:<6}  DESCRIPTION",
                            "METHOD", "PATH", "MODULE", "AUTH"
                        );
                        println!("{}", "-".repeat(90));
                        for e in &endpoints {
                            println!(
                                "{:<7}  {:<32}  {:<16}  {:<6}  {}",
                                e.method,
                                e.path,
                                e.module,
                                if e.auth_required { "yes" } else { "no" },
                                e.description
                            );
                        }
                    }
                }
                Ok(())
            }

            EndpointSubcommand::Update {
                identifier,
                for_method,
                method,
                path,
                module,
                description,
                auth_required,
            } => {
                let patch = EndpointPatch {
                    module: module.clone(),
                    method: *method,
                    path: path.clone(),
                    description: description.clone(),
                    auth_required: *auth_required,
                };
                if patch == EndpointPatch::default() {
                    return Err("Nothing to update".into());
                }

                let endpoints = sync.endpoints().await;
                let endpoint = find(&endpoints, identifier, *for_method)?;
                let updated = sync.update(endpoint.id, patch).await;
                let endpoint = session.settle(updated)?;
                println!("Updated {} {}", endpoint.method, endpoint.path);
                Ok(())
            }

            EndpointSubcommand::Delete {
                identifier,
                for_method,
                force,
            } => {
                let endpoints = sync.endpoints().await;
                let endpoint = find(&endpoints, identifier, *for_method)?;
                let label = format!("{} {}", endpoint.method, endpoint.path);
                if !force && !confirm(&format!("Delete endpoint '{}'?", label))? {
                    println!("Deletion cancelled.");
                    return Ok(());
                }

                let deleted = sync.delete(endpoint.id).await;
                session.settle(deleted.then_some(()))?;
                println!("Deleted endpoint: {}", label);
                Ok(())
            }
        }
    }
}
