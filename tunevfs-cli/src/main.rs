//! TuneVFS CLI - Command-line interface
//!
//! Browses, searches and scans the federated music VFS provided by the
//! `tunevfs` library.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::debug;
use tunevfs::config::ConfigFile;
use tunevfs::logging::init_logging;

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tunevfs", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print result rows as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show a single object
    Resolve {
        /// URI or local path
        uri: String,
    },

    /// List the children of a directory
    #[command(alias = "ls")]
    List {
        /// URI or local path (defaults to the VFS root)
        uri: Option<String>,
    },

    /// Show the chain of parents of an object
    Parents {
        /// URI or local path
        uri: String,
    },

    /// Search for files below a directory
    Search {
        /// URI or local path of the directory to search
        uri: String,

        /// Text to look for in names and descriptions
        query: String,
    },

    /// Download or locate file content
    Fetch {
        /// URI or local path
        uri: String,

        /// Copy the content to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Find playable modules below the given locations
    Scan {
        /// URIs or local paths
        #[arg(required = true)]
        uris: Vec<String>,

        /// Capacity of the module queue (defaults to scanner.queue_size)
        #[arg(long)]
        queue_size: Option<usize>,
    },

    /// Manage the download cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Create the configuration file with default settings
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match ConfigFile::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {}; using defaults", e);
            ConfigFile::default()
        }
    };

    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let _logging = match init_logging(level, config.logging.directory.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging unavailable: {}", e);
            None
        }
    };

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: ConfigFile) -> Result<(), CliError> {
    let json = cli.json;
    debug!(command = ?cli.command, "Running command");
    match cli.command {
        Commands::Resolve { uri } => commands::query::resolve(&config, &uri, json).await,
        Commands::List { uri } => commands::query::list(&config, uri.as_deref(), json).await,
        Commands::Parents { uri } => commands::query::parents(&config, &uri, json).await,
        Commands::Search { uri, query } => {
            commands::query::search(&config, &uri, &query, json).await
        }
        Commands::Fetch { uri, output } => {
            commands::fetch::run(&config, &uri, output.as_deref(), json).await
        }
        Commands::Scan { uris, queue_size } => {
            let queue_size = queue_size.unwrap_or(config.scanner.queue_size);
            commands::scan::run(&config, &uris, queue_size, json).await
        }
        Commands::Cache { action } => commands::cache::run(&config, action),
        Commands::Config { command } => commands::config::run(command),
        Commands::Init => commands::init::run(),
    }
}
