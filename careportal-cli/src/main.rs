//! Main entry point for the CarePortal messaging CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use shared::config::client::Config;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt};

mod commands;

use commands::{
    messages::{ComposeArgs, OpenArgs, SendArgs, ThreadsArgs},
    session::SessionCommand,
    watch::WatchArgs,
};

/// CarePortal CLI
#[derive(Parser)]
#[command(name = "careportal", version)]
#[command(about = "Secure messaging with your CarePortal care team", long_about = None)]
struct Cli {
    /// Path to the configuration file (config.yaml or config.json)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Portal API base URL, e.g. `http://localhost:3000/api`. Overrides the configuration file.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in, sign out, or show the stored session
    #[command(subcommand)]
    Session(SessionCommand),

    /// List your message threads
    Threads(ThreadsArgs),

    /// Show the messages of a thread and mark it read
    Open(OpenArgs),

    /// Send a message to a thread
    Send(SendArgs),

    /// Start a new thread with a doctor
    Compose(ComposeArgs),

    /// List doctors you can start a thread with
    Doctors,

    /// Show the total number of unread messages
    Unread,

    /// Follow a thread live; lines typed on stdin are sent as messages
    Watch(WatchArgs),

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell to generate the completion script for
        #[arg(long, short, value_enum)]
        shell: Shell,
    },

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml or json). Defaults to yaml.
        #[arg(long, short)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
        }
        Commands::Config { format } => {
            let format = format.unwrap_or_else(|| "yaml".to_string());
            commands::config::generate_config(&format)?;
        }
        command => {
            let config = Config::load_config(cli.config, cli.server.as_deref())?;
            initialize_tracing(&config);
            run(command, &config).await?;
        }
    }

    Ok(())
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Session(command) => commands::session::run(command, config).await,
        Commands::Threads(args) => commands::messages::threads(args, config).await,
        Commands::Open(args) => commands::messages::open(args, config).await,
        Commands::Send(args) => commands::messages::send(args, config).await,
        Commands::Compose(args) => commands::messages::compose(args, config).await,
        Commands::Doctors => commands::messages::doctors(config).await,
        Commands::Unread => commands::messages::unread(config).await,
        Commands::Watch(args) => commands::watch::watch(args, config).await,
        Commands::Completion { .. } | Commands::Config { .. } => Ok(()),
    }
}

/// Logs go to stderr so command output stays pipeable. `RUST_LOG` wins over
/// the configured level.
fn initialize_tracing(config: &Config) {
    let default_level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::WARN);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    });

    let _ = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
