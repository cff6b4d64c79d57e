//! Admin CLI: start the receive-pipeline daemon, inspect and unlock
//! repositories.
//!
//! Same shape as the sibling `mouchak-mail-cli` binary: a `clap`
//! `Subcommand` derive, `tracing_subscriber::fmt` with an `EnvFilter`,
//! one `match` arm per command.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dockpack_core::types::RepoName;
use dockpack_core::workspace::RepoWorkspace;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the SSH front door and the internal build endpoint.
    Serve,
    /// Repository workspace inspection and maintenance.
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
}

#[derive(Subcommand, Debug)]
enum RepoCommands {
    /// List repositories known to the workspace.
    List,
    /// Show whether a repository exists, is locked, and has a build cache.
    Status { repo: String },
    /// Force-remove a repository's lock marker.
    Unlock { repo: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = dockpack_common::AppConfig::load().context("failed to load configuration")?;
            dockpack_sshd::supervisor::run(config).await?;
        }
        Commands::Repo { command } => handle_repo_command(command).await?,
    }

    Ok(())
}

async fn handle_repo_command(command: RepoCommands) -> Result<()> {
    let config = dockpack_common::AppConfig::load().context("failed to load configuration")?;
    let workspace = RepoWorkspace::new(config.workspace_dir.clone());

    match command {
        RepoCommands::List => {
            let mut entries = tokio::fs::read_dir(workspace.root())
                .await
                .context("failed to read workspace directory")?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    println!("{}", entry.file_name().to_string_lossy());
                }
            }
        }
        RepoCommands::Status { repo } => {
            let repo = RepoName::parse(&repo).context("invalid repository name")?;

            let exists = workspace.repo_path(&repo).exists();
            let lock_state = if workspace.is_locked(&repo) { "locked" } else { "unlocked" };
            let cache_state = match tokio::fs::metadata(workspace.cache_tar_path(&repo)).await {
                Ok(meta) => format!("cache present ({} bytes)", meta.len()),
                Err(_) => "no cache".to_string(),
            };

            println!(
                "{repo}: {}, {lock_state}, {cache_state}",
                if exists { "exists" } else { "does not exist" },
            );
        }
        RepoCommands::Unlock { repo } => {
            let repo = RepoName::parse(&repo).context("invalid repository name")?;
            workspace.unlock(&repo).await;
            println!("{repo}: lock marker removed");
        }
    }

    Ok(())
}
