use clap::{Args, Subcommand};

use super::{print_json, Backend, CommandResult, OutputFormat, Session};
use backforge::models::PlanTier;

#[derive(Args)]
pub struct AccountCommand {
    #[command(subcommand)]
    pub command: AccountSubcommand,
}

#[derive(Subcommand)]
pub enum AccountSubcommand {
    /// Show the signed-in account
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change the plan of the local account
    Plan {
        /// free, pro or enterprise
        plan: PlanTier,
    },
}

impl AccountCommand {
    pub async fn run(&self, session: &mut Session) -> CommandResult {
        match &self.command {
            AccountSubcommand::Show { format } => {
                let owned = session.projects().await?.projects().await.len();
                let account = &session.account;
                match format {
                    OutputFormat::Json => print_json(account)?,
                    OutputFormat::Text => {
                        println!("User:     {}", account.user_id);
                        println!("Account:  {}", account.id);
                        println!("Plan:     {}", account.plan);
                        println!("Projects: {} of {}", owned, account.max_projects);
                        println!("Since:    {}", account.created_at.format("%Y-%m-%d"));
                    }
                }
                Ok(())
            }

            AccountSubcommand::Plan { plan } => {
                let Backend::Local(store) = &session.backend else {
                    return Err("Plans of server accounts are managed on the server".into());
                };
                let account = store.set_plan(session.account.id, *plan).await?;
                println!(
                    "{} is now on the {} plan ({} projects)",
                    account.user_id, account.plan, account.max_projects
                );
                session.account = account;
                Ok(())
            }
        }
    }
}
