//! evmag CLI: Eulerian video magnification from the command line.
//!
//! Usage:
//!   evmag magnify [INPUT] [OPTIONS]   Amplify a temporal frequency band
//!   evmag info <PATH>                 Show video stream properties
//!   evmag check                       Check that ffmpeg and ffprobe are installed
//!   evmag init [--force]              Write a default configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use evmag_common::config::{AppConfig, LoadedConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "evmag",
    about = "Reveal subtle periodic motion in video by Eulerian magnification",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/evmag/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Amplify motion within a frequency band and write a new video
    Magnify(commands::magnify::MagnifyArgs),

    /// Show video stream properties
    Info {
        /// Path to the video
        path: PathBuf,

        /// Print the properties as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // An explicit --config must load, except for `init` which creates it.
    // Problems with the default location are reported once logging is up.
    let loaded = match &cli.config {
        Some(path) if matches!(cli.command, Commands::Init { .. }) => {
            AppConfig::load_or_default(path)
        }
        Some(path) => LoadedConfig {
            config: AppConfig::load_from(path)?,
            problem: None,
        },
        None => AppConfig::load(),
    };
    let config = loaded.config;

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    if cli.json_logs {
        logging.json = true;
    }
    evmag_common::logging::init_logging(&logging);
    if let Some(problem) = loaded.problem {
        tracing::warn!(error = %problem, "Ignoring config file, using defaults");
    }

    match cli.command {
        Commands::Magnify(args) => commands::magnify::run(args, &config),
        Commands::Info { path, json } => commands::info::run(path, json, &config),
        Commands::Check => commands::check::run(cli.config),
        Commands::Init { force } => commands::init::run(cli.config, force),
    }
}
