#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "liffey")]
#[command(author, version, about = "A content-addressed npm package installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install dependencies from package.json
    Install {
        /// Skip the project's devDependencies
        #[arg(long)]
        no_dev: bool,
    },

    /// Inspect or empty the tarball cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// List cached tarballs
    List,

    /// Delete all cached tarballs
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cwd = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().into_diagnostic()?,
    };

    match cli.command {
        Commands::Install { no_dev } => commands::install::run(&cwd, !no_dev, cli.json).await,
        Commands::Cache { action } => match action {
            CacheCommands::List => commands::cache::list(cli.json),
            CacheCommands::Prune => commands::cache::prune(cli.json),
        },
    }
}
