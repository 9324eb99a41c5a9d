mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tributary",
    version,
    about = "Inspect resumable collect / extract / convert subtask runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate engine configuration and open the state database
    Check {
        /// Path to engine YAML file
        config: PathBuf,
    },
    /// List the runs of one subtask for one connection
    History {
        /// Path to engine YAML file
        config: PathBuf,
        /// Subtask name (e.g., "collectGithubIssues")
        #[arg(long)]
        subtask: String,
        /// Connection id
        #[arg(long)]
        connection: i64,
    },
    /// Print the state the next incremental run would resume from
    State {
        /// Path to engine YAML file
        config: PathBuf,
        /// Subtask name (e.g., "collectGithubIssues")
        #[arg(long)]
        subtask: String,
        /// Connection id
        #[arg(long)]
        connection: i64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Check { config } => commands::check::execute(&config),
        Commands::History {
            config,
            subtask,
            connection,
        } => commands::history::execute(&config, &subtask, connection),
        Commands::State {
            config,
            subtask,
            connection,
        } => commands::state::execute(&config, &subtask, connection),
    }
}
