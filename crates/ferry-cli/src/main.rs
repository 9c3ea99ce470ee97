//! Ferry CLI tool.

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry CI CLI", long_about = None)]
struct Cli {
    /// Server URL
    #[arg(long, env = "FERRY_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a build configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = ferry_core::DEFAULT_CONFIG_PATH)]
        path: String,

        /// Repository parameter as NAME=VALUE, may be repeated
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },
    /// Build a commit of a connected repository and wait for the outcome
    Trigger {
        /// Repository as host/owner/name
        repo: String,
        /// Commit hash
        hash: String,
        /// Branch the commit belongs to
        #[arg(long)]
        branch: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path, params } => {
            commands::validate(&path, &params)?;
        }
        Commands::Trigger { repo, hash, branch } => {
            commands::trigger(&cli.api_url, &repo, &hash, branch.as_deref()).await?;
        }
    }

    Ok(())
}
