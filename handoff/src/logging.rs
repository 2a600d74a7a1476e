use std::{fs, io, path::Path};

use anyhow::{anyhow, Result};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log to stderr at `console_level` (overridable through `RUST_LOG`) and to
/// `file` at `file_level`.
///
/// Stdout is left alone for consumer output. Keep the returned guard alive
/// until exit or buffered file lines are lost.
pub fn init_logging(
    console_level: LevelFilter,
    file: &Path,
    file_level: LevelFilter,
) -> Result<WorkerGuard> {
    let directory = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = file
        .file_name()
        .ok_or_else(|| anyhow!("Log path has no file name: {}", file.display()))?;
    fs::create_dir_all(directory)?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));

    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false).with_filter(console_filter))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer).with_filter(file_level))
        .try_init()?;

    Ok(guard)
}
