use std::{panic, path::PathBuf, process};

use clap::Parser;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    commands::{init::init_handler, run::run_handler, Commands, HandoffCli},
    logging::init_logging,
};

mod commands;
mod logging;

pub const DEFAULT_CONFIG_PATH: &str = "./handoff.json";
pub const DEFAULT_LOG_PATH: &str = "./logs/handoff.log";

fn main() -> anyhow::Result<()> {
    let orig_hook = panic::take_hook();
    // Catch panics in child threads
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(1);
    }));
    run()
}

fn run() -> anyhow::Result<()> {
    let cli = HandoffCli::parse();
    let cwd = std::env::current_dir()?;
    let logs = cli.logs.unwrap_or_else(|| cwd.join(DEFAULT_LOG_PATH));
    let console_level = if cli.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    let _log_guard = init_logging(console_level, &logs, LevelFilter::DEBUG)?;

    match cli.command {
        Commands::Init {
            force,
        } => {
            init_handler(cli.config_file.as_deref(), force)?;
        },
        Commands::Run(args) => {
            run_handler(cli.config_file.as_deref(), &args)?;
        },
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum HandoffCliError {
    #[error("Cannot initialize over an existing config file: {0}")]
    ConfigFileAlreadyExists(PathBuf),
    #[error("No config file found at: {0}")]
    ConfigFileNotFound(PathBuf),
}
