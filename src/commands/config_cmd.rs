use clap::{Args, Subcommand};

use super::{print_json, CommandResult, OutputFormat};
use backforge::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> CommandResult {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => print_json(config)?,
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        if config.server.is_configured() {
                            println!("mode: server");
                        } else {
                            println!("mode: local");
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("user: {}", config.user.value);
                        println!("  source: {}", config.user.source);
                        println!();

                        println!("free_max_projects: {}", config.free_max_projects.value);
                        println!("  source: {}", config.free_max_projects.source);
                        println!();

                        println!(
                            "server_url: {}",
                            config.server.server_url.as_deref().unwrap_or("(not set)")
                        );
                        println!(
                            "api_key: {}",
                            if config.server.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
