use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

pub type Result<T, E = HandoffError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("The {lock} lock was poisoned by a panicking thread")]
    Poisoned { lock: &'static str },
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Channel capacity must be at least 1")]
    ZeroCapacity,
    #[error("Must have at least one lane")]
    NoLanes,
    #[error("Must have at least one producer")]
    NoProducers,
    #[error("Must have at least one consumer")]
    NoConsumers,
    #[error("`{0}` must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("Failed to write a consumed item: {0}")]
    Output(#[from] io::Error),
}

impl HandoffError {
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid settings: {0}")]
    Invalid(#[from] HandoffError),
    #[error("Failed to access settings file {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Failed to parse settings file {}: {source}", .path.display())]
    Parse {
        path:   PathBuf,
        source: serde_json::Error,
    },
}
