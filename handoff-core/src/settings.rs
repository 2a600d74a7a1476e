use std::{
    fs,
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use strum::{Display as DisplayMacro, EnumString, IntoStaticStr};

use crate::{
    channel_set::DEFAULT_LANES,
    error::{HandoffError, SettingsError},
    semaphore::{WaitStrategy, DEFAULT_POLL_INTERVAL},
};

pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_CAPACITY: usize = 4;
pub const DEFAULT_JITTER_MS: u64 = 5;
pub const DEFAULT_CANCEL_CHECK_MS: u64 = 50;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    DisplayMacro,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WaitMode {
    #[default]
    Park,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub producers:          usize,
    pub consumers:          usize,
    pub lanes:              usize,
    pub capacity:           usize,
    pub wait:               WaitMode,
    pub poll_interval_us:   u64,
    /// Drivers sleep a random multiple (0 to 4) of this between operations.
    pub jitter_ms:          u64,
    /// Upper bound on how long a blocked driver takes to notice cancellation.
    pub cancel_check_ms:    u64,
    /// Stop each producer after this many items. `None` runs until cancelled.
    pub items_per_producer: Option<u64>,
}

impl Default for Settings {
    #[inline]
    fn default() -> Self {
        Settings {
            producers:          DEFAULT_WORKERS,
            consumers:          DEFAULT_WORKERS,
            lanes:              DEFAULT_LANES,
            capacity:           DEFAULT_CAPACITY,
            wait:               WaitMode::Park,
            poll_interval_us:   DEFAULT_POLL_INTERVAL.as_micros() as u64,
            jitter_ms:          DEFAULT_JITTER_MS,
            cancel_check_ms:    DEFAULT_CANCEL_CHECK_MS,
            items_per_producer: None,
        }
    }
}

impl Settings {
    #[inline]
    pub fn validate(&self) -> Result<(), HandoffError> {
        if self.producers == 0 {
            return Err(HandoffError::NoProducers);
        }
        if self.consumers == 0 {
            return Err(HandoffError::NoConsumers);
        }
        if self.lanes == 0 {
            return Err(HandoffError::NoLanes);
        }
        if self.capacity == 0 {
            return Err(HandoffError::ZeroCapacity);
        }
        if self.wait == WaitMode::Poll && self.poll_interval_us == 0 {
            return Err(HandoffError::ZeroInterval("poll_interval_us"));
        }
        if self.cancel_check_ms == 0 {
            return Err(HandoffError::ZeroInterval("cancel_check_ms"));
        }
        Ok(())
    }

    #[inline]
    pub fn wait_strategy(&self) -> WaitStrategy {
        match self.wait {
            WaitMode::Park => WaitStrategy::Park,
            WaitMode::Poll => WaitStrategy::Poll {
                interval: Duration::from_micros(self.poll_interval_us),
            },
        }
    }

    #[inline]
    pub fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    #[inline]
    pub fn cancel_check(&self) -> Duration {
        Duration::from_millis(self.cancel_check_ms)
    }

    /// Total items a bounded run moves, or `None` when producers run until
    /// cancelled.
    #[inline]
    pub fn total_items(&self) -> Option<u64> {
        self.items_per_producer.map(|items| items.saturating_mul(self.producers as u64))
    }

    #[inline]
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    #[inline]
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut buffer = vec![];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.serialize(&mut serializer).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, buffer).map_err(io_error)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, str::FromStr, time::Duration};

    use tempfile::TempDir;

    use super::{Settings, WaitMode};
    use crate::{
        error::{HandoffError, SettingsError},
        semaphore::WaitStrategy,
    };

    #[test]
    fn defaults_match_the_reference_layout() {
        let settings = Settings::default();
        assert_eq!(settings.producers, 3);
        assert_eq!(settings.consumers, 3);
        assert_eq!(settings.lanes, 2);
        assert_eq!(settings.capacity, 4);
        assert_eq!(settings.total_items(), None);
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn zero_values_are_rejected() {
        let invalid = [
            Settings {
                producers: 0,
                ..Settings::default()
            },
            Settings {
                consumers: 0,
                ..Settings::default()
            },
            Settings {
                lanes: 0,
                ..Settings::default()
            },
            Settings {
                capacity: 0,
                ..Settings::default()
            },
            Settings {
                cancel_check_ms: 0,
                ..Settings::default()
            },
        ];
        for settings in invalid {
            assert!(settings.validate().is_err(), "{settings:?} passed validation");
        }

        let zero_poll = Settings {
            wait: WaitMode::Poll,
            poll_interval_us: 0,
            ..Settings::default()
        };
        assert!(matches!(
            zero_poll.validate(),
            Err(HandoffError::ZeroInterval("poll_interval_us"))
        ));
    }

    #[test]
    fn wait_mode_maps_to_strategy() {
        let poll = Settings {
            wait: WaitMode::Poll,
            poll_interval_us: 250,
            ..Settings::default()
        };
        assert_eq!(
            poll.wait_strategy(),
            WaitStrategy::Poll {
                interval: Duration::from_micros(250),
            }
        );
        assert_eq!(Settings::default().wait_strategy(), WaitStrategy::Park);
        assert_eq!(WaitMode::from_str("poll").expect("parse"), WaitMode::Poll);
        assert_eq!(WaitMode::Park.to_string(), "park");
    }

    #[test]
    fn settings_survive_a_save_and_load() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested").join("handoff.json");
        let settings = Settings {
            producers: 5,
            wait: WaitMode::Poll,
            items_per_producer: Some(12),
            ..Settings::default()
        };
        settings.save(&path).expect("save");

        let contents = fs::read_to_string(&path).expect("read back");
        assert!(contents.contains("\n    \"producers\": 5"));
        assert!(contents.contains("\"wait\": \"poll\""));
        assert_eq!(Settings::load(&path).expect("load"), settings);
        assert_eq!(settings.total_items(), Some(60));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("partial.json");
        fs::write(&path, r#"{ "capacity": 8 }"#).expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.capacity, 8);
        assert_eq!(settings.producers, 3);
    }

    #[test]
    fn invalid_files_are_reported() {
        let temp = TempDir::new().expect("temp dir");

        let missing = temp.path().join("missing.json");
        assert!(matches!(Settings::load(&missing), Err(SettingsError::Io { .. })));

        let garbled = temp.path().join("garbled.json");
        fs::write(&garbled, "{ producers: ").expect("write");
        assert!(matches!(Settings::load(&garbled), Err(SettingsError::Parse { .. })));

        let zero = temp.path().join("zero.json");
        fs::write(&zero, r#"{ "lanes": 0 }"#).expect("write");
        assert!(matches!(
            Settings::load(&zero),
            Err(SettingsError::Invalid(HandoffError::NoLanes))
        ));
    }
}
