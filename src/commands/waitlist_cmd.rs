use clap::{Args, Subcommand};

use super::CommandResult;
use backforge::config::Config;
use backforge::store::{HttpStore, SqliteStore, WaitlistStore};
use backforge::waitlist::{join_waitlist, SignupOutcome, DEFAULT_SOURCE};

#[derive(Args)]
pub struct WaitlistCommand {
    #[command(subcommand)]
    pub command: WaitlistSubcommand,
}

#[derive(Subcommand)]
pub enum WaitlistSubcommand {
    /// Add an email address to the waitlist
    Join {
        email: String,

        /// Where the signup came from
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
    },
}

impl WaitlistCommand {
    /// The waitlist is public, so a server URL without an API key is enough.
    pub async fn run(&self, config: &Config) -> CommandResult {
        let store: Box<dyn WaitlistStore> = match &config.server.server_url {
            Some(url) => Box::new(HttpStore::new(
                url.as_str(),
                config.server.api_key.clone().unwrap_or_default(),
            )),
            None => Box::new(
                SqliteStore::open(
                    &config.database_path.value,
                    config.free_max_projects.value,
                )
                .await?,
            ),
        };

        match &self.command {
            WaitlistSubcommand::Join { email, source } => {
                let user_agent = format!("backforge-cli/{}", env!("CARGO_PKG_VERSION"));
                let outcome = join_waitlist(
                    store.as_ref(),
                    email,
                    Some(source.as_str()),
                    Some(user_agent),
                )
                .await?;
                match &outcome {
                    SignupOutcome::Joined(signup) => {
                        println!("{} ({})", outcome.message(), signup.email)
                    }
                    SignupOutcome::AlreadyJoined => println!("{}", outcome.message()),
                }
                Ok(())
            }
        }
    }
}
