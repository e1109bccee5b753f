//! Framestitch CLI: run the frame export server.
//!
//! Usage:
//!   framestitch serve [OPTIONS]   Serve the export API
//!   framestitch check             Check encoder and output directory
//!   framestitch config [--write]  Show or write the configuration file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use framestitch_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "framestitch",
    about = "Collect browser-rendered frames and stitch them into a video",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the export API
    Serve {
        /// Socket address to bind
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory holding session frames and artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Seconds before an unfinished session is evicted
        #[arg(long)]
        grace_secs: Option<u64>,

        /// Frame rate of encoded videos
        #[arg(long)]
        fps: Option<u32>,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Check encoder availability and output directory
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load();

    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if let Commands::Serve {
        bind,
        output_dir,
        grace_secs,
        fps,
        json_logs,
    } = &cli.command
    {
        if let Some(bind) = bind {
            config.server.bind = bind.clone();
        }
        if let Some(dir) = output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(secs) = grace_secs {
            config.session.grace_period_secs = *secs;
        }
        if let Some(fps) = fps {
            config.encoder.fps = *fps;
        }
        if *json_logs {
            config.logging.json = true;
        }
    }

    framestitch_common::logging::init_logging(&config.logging);
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => commands::serve::run(config).await,
        Commands::Check => commands::check::run(&config).await,
        Commands::Config { write } => commands::config::run(&config, write),
    }
}
