use std::{
    io::{self, Write},
    path::Path,
    process,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
    thread,
    time::Duration,
};

use anyhow::{bail, Result};
use crossbeam_channel::{after, never, select};
use handoff_core::{worker, ChannelSet, Settings};
use tracing::{debug, info};

use crate::{commands::RunArgs, HandoffCliError, DEFAULT_CONFIG_PATH};

/// Explicit config paths must exist. The default path is used only if present.
fn resolve_settings(config_path: Option<&Path>, args: &RunArgs) -> Result<Settings> {
    let mut settings = match config_path {
        Some(path) if !path.exists() => {
            bail!(HandoffCliError::ConfigFileNotFound(path.to_path_buf()))
        },
        Some(path) => Settings::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Settings::load(Path::new(DEFAULT_CONFIG_PATH))?
        },
        None => Settings::default(),
    };
    args.apply(&mut settings);
    settings.validate()?;
    Ok(settings)
}

#[tracing::instrument(skip_all)]
pub fn run_handler(config_path: Option<&Path>, args: &RunArgs) -> Result<()> {
    let settings = resolve_settings(config_path, args)?;
    let run_for = match args.duration {
        Some(seconds) => match Duration::try_from_secs_f64(seconds) {
            Ok(run_for) => Some(run_for),
            Err(err) => bail!("Invalid duration of {} seconds: {}", seconds, err),
        },
        None => None,
    };
    debug!("Running with {:?}", settings);

    let set = Arc::new(ChannelSet::new(
        settings.lanes,
        settings.capacity,
        settings.wait_strategy(),
    )?);
    let cancellation_token = Arc::new(AtomicBool::new(false));

    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded(1);
    let ctrlc_cancelled = Arc::clone(&cancellation_token);
    ctrlc::set_handler(move || {
        let already_cancelled = ctrlc_cancelled.swap(true, Ordering::SeqCst);
        if already_cancelled {
            debug!("Force quit handoff");
            process::exit(0);
        }
        eprintln!("Stopping producers and consumers. Press Ctrl+C again to exit immediately.");
        let _ = interrupt_tx.try_send(());
    })?;

    let timer = run_for.map_or_else(never, after);
    let (finished_tx, finished_rx) = crossbeam_channel::bounded(1);
    let output = Arc::new(Mutex::new(io::stdout()));

    info!(
        "Starting {} producers and {} consumers over {} lanes of {} slots",
        settings.producers, settings.consumers, settings.lanes, settings.capacity
    );
    let summary = thread::scope(|s| {
        let drivers = s.spawn(|| {
            let summary = worker::run(&set, &settings, &output, &cancellation_token);
            let _ = finished_tx.send(());
            summary
        });

        select! {
            recv(interrupt_rx) -> _ => info!("Interrupted, waiting for drivers to stop"),
            recv(timer) -> _ => info!("Run time elapsed, waiting for drivers to stop"),
            recv(finished_rx) -> _ => debug!("Every item has been delivered"),
        }
        cancellation_token.store(true, Ordering::SeqCst);

        drivers.join().expect("should join driver supervisor")
    })?;

    // Consumers leave the cursor after a trailing space.
    let mut stdout = io::stdout();
    writeln!(stdout)?;
    stdout.flush()?;

    info!("Finished: {}", summary);
    Ok(())
}
