use std::path::Path;

use anyhow::{bail, Result};
use handoff_core::Settings;
use tracing::info;

use crate::{HandoffCliError, DEFAULT_CONFIG_PATH};

pub fn init_handler(config_path: Option<&Path>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if config_path.exists() && !force {
        bail!(HandoffCliError::ConfigFileAlreadyExists(config_path.to_path_buf()));
    }

    Settings::default().save(config_path)?;
    info!("Wrote default settings to {}", config_path.display());

    Ok(())
}
