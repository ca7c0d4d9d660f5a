//! assetline CLI - front-end asset pipeline and development server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use assetline_build::Target;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::{ConfigFile, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "assetline")]
#[command(about = "Front-end asset pipeline with live reload")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file, relative to the project root
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Project root
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build pages, styles, scripts, images and vendor scripts (the default)
    Default,

    /// Build pages, styles and scripts only
    Build,

    /// Build everything with minified styles and scripts
    Production,

    /// Build, then serve with live reload and rebuild on change
    Watch {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not open browser
        #[arg(long)]
        no_open: bool,
    },

    /// Run named tasks and their prerequisites
    Run {
        /// Task names, see `assetline tasks`
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// List every task and its prerequisites
    Tasks,

    /// Preview the built output without live reload
    Serve {
        /// Port to listen on (defaults to config or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve (defaults to the configured dist)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Scaffold a starter project layout
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();

    if let Some(Commands::Init { yes }) = cli.command {
        return commands::init::run(&cli.root, yes).await;
    }

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", cli.root.display()))?;
    let config = ConfigFile::load(&root.join(&cli.config))?;

    match cli.command.unwrap_or(Commands::Default) {
        Commands::Default => commands::build::run_target(&config, &root, Target::Default).await?,
        Commands::Build => commands::build::run_target(&config, &root, Target::Build).await?,
        Commands::Production => {
            commands::build::run_target(&config, &root, Target::Production).await?
        }
        Commands::Watch { port, no_open } => {
            commands::watch::run(&config, &root, port, !no_open).await?
        }
        Commands::Run { tasks } => commands::build::run_tasks(&config, &root, &tasks).await?,
        Commands::Tasks => commands::tasks::run(&config, &root)?,
        Commands::Serve { port, dir } => commands::serve::run(&config, &root, port, dir).await?,
        Commands::Init { .. } => {}
    }

    Ok(())
}
