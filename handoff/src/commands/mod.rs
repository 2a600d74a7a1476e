use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand};
use handoff_core::{settings::Settings, WaitMode};

pub mod init;
pub mod run;

#[derive(ClapParser)]
#[command(
    name = "handoff",
    about = "Moves work items from producer threads to consumer threads through bounded, \
             semaphore-gated lanes.",
    version
)]
pub struct HandoffCli {
    #[command(subcommand)]
    pub command:     Commands,
    /// Specify the location of the config file. Defaults to `./handoff.json`.
    #[arg(long, global = true)]
    pub config_file: Option<PathBuf>,
    /// Specify the location of the log file. Defaults to `./logs/handoff.log`.
    #[arg(long, global = true)]
    pub logs:        Option<PathBuf>,
    /// Only print warnings and errors to the console.
    #[arg(long, short('q'), global = true)]
    pub quiet:       bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default settings to the config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Start producers and consumers. Runs until Ctrl+C unless bounded.
    Run(RunArgs),
}

/// Flags override the matching field of the loaded settings.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[arg(long, short('p'))]
    pub producers:        Option<usize>,
    #[arg(long, short('c'))]
    pub consumers:        Option<usize>,
    /// Number of independent channels.
    #[arg(long)]
    pub lanes:            Option<usize>,
    /// Slots per channel.
    #[arg(long)]
    pub capacity:         Option<usize>,
    /// How blocked callers wait: `park` or `poll`.
    #[arg(long)]
    pub wait:             Option<WaitMode>,
    #[arg(long)]
    pub poll_interval_us: Option<u64>,
    /// Drivers sleep a random multiple (0 to 4) of this between operations.
    #[arg(long)]
    pub jitter_ms:        Option<u64>,
    /// Stop each producer after this many items.
    #[arg(long)]
    pub items:            Option<u64>,
    /// Stop after this many seconds.
    #[arg(long)]
    pub duration:         Option<f64>,
}

impl RunArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(producers) = self.producers {
            settings.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            settings.consumers = consumers;
        }
        if let Some(lanes) = self.lanes {
            settings.lanes = lanes;
        }
        if let Some(capacity) = self.capacity {
            settings.capacity = capacity;
        }
        if let Some(wait) = self.wait {
            settings.wait = wait;
        }
        if let Some(poll_interval_us) = self.poll_interval_us {
            settings.poll_interval_us = poll_interval_us;
        }
        if let Some(jitter_ms) = self.jitter_ms {
            settings.jitter_ms = jitter_ms;
        }
        if self.items.is_some() {
            settings.items_per_producer = self.items;
        }
    }
}
