//! Bounty platform CLI
//!
//! Operator commands for tracked repositories and their bounties. Mutating
//! commands hold the platform lock for their whole run.

mod commands;
mod style;

use std::path::PathBuf;

use bounty_platform::config::Config;
use bounty_platform::Platform;
use clap::{Parser, Subcommand};
use style::*;

#[derive(Parser)]
#[command(name = "bounty")]
#[command(version)]
#[command(about = "Manage tracked repositories and issue bounties", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "BOUNTY_CONFIG", default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tracked repositories
    #[command(subcommand)]
    #[command(visible_alias = "r")]
    Repo(RepoCommand),

    /// Issue bounties
    #[command(subcommand)]
    #[command(visible_alias = "b")]
    Bounty(BountyCommand),
}

#[derive(Subcommand)]
enum RepoCommand {
    /// List tracked repositories
    #[command(visible_alias = "ls")]
    List,
    /// Track a repository and install its web hook
    Add {
        /// `owner/name` or https://github.com/owner/name
        target: String,
    },
    /// Delete a repository together with its bounties
    #[command(visible_alias = "rm")]
    Delete { id: i64 },
}

#[derive(Subcommand)]
enum BountyCommand {
    /// List bounties
    #[command(visible_alias = "ls")]
    List {
        /// Only bounties of this repository (owner/name)
        #[arg(short, long)]
        repo: Option<String>,
    },
    /// Create a bounty for an issue
    Add {
        owner: String,
        repo: String,
        issue: u32,
    },
    /// Show one bounty
    Show { id: i64 },
    /// Delete a bounty
    #[command(visible_alias = "rm")]
    Delete { id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_from(&cli.config)?;
    let platform = Platform::from_config(&config)?;

    match cli.command {
        Commands::Repo(RepoCommand::List) => commands::repo::list(&platform).await,
        Commands::Repo(RepoCommand::Add { target }) => {
            commands::repo::add(&platform, &target).await
        }
        Commands::Repo(RepoCommand::Delete { id }) => commands::repo::delete(&platform, id).await,
        Commands::Bounty(BountyCommand::List { repo }) => {
            commands::bounty::list(&platform, repo.as_deref()).await
        }
        Commands::Bounty(BountyCommand::Add { owner, repo, issue }) => {
            commands::bounty::add(&platform, &owner, &repo, issue).await
        }
        Commands::Bounty(BountyCommand::Show { id }) => {
            commands::bounty::show(&platform, id).await
        }
        Commands::Bounty(BountyCommand::Delete { id }) => {
            commands::bounty::delete(&platform, id).await
        }
    }
}
