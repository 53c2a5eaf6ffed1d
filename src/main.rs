use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use backforge::config::Config;
use commands::{
    AccountCommand, ConfigCommand, DemoCommand, EndpointCommand, ModuleCommand, ProjectCommand,
    Session, TaskCommand, WaitlistCommand, WatchCommand,
};

#[derive(Parser)]
#[command(name = "backforge")]
#[command(version)]
#[command(about = "Plan and track generated backends", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project(ProjectCommand),

    /// Manage a project's modules
    Module(ModuleCommand),

    /// Manage a project's endpoints
    Endpoint(EndpointCommand),

    /// Manage a project's task board
    Task(TaskCommand),

    /// Join the waitlist
    Waitlist(WaitlistCommand),

    /// Follow a table and print it on every change
    Watch(WatchCommand),

    /// Run the agent pipeline simulation
    Demo(DemoCommand),

    /// Show the signed-in account
    Account(AccountCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    match command {
        Commands::Config(cmd) => cmd.run(&config),
        Commands::Waitlist(cmd) => cmd.run(&config).await,
        command => {
            let mut session = Session::connect(&config).await?;
            match command {
                Commands::Project(cmd) => cmd.run(&mut session).await,
                Commands::Module(cmd) => cmd.run(&mut session).await,
                Commands::Endpoint(cmd) => cmd.run(&mut session).await,
                Commands::Task(cmd) => cmd.run(&mut session).await,
                Commands::Watch(cmd) => cmd.run(&mut session).await,
                Commands::Demo(cmd) => cmd.run(&mut session).await,
                Commands::Account(cmd) => cmd.run(&mut session).await,
                Commands::Config(_) | Commands::Waitlist(_) => Ok(()),
            }
        }
    }
}
