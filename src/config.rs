//! Harness configuration, loadable from a RON file and overridable from
//! the command line.

use crate::report::Firmware;
use crate::safety::{LengthUnit, LIMIT_ALARM_MM, LIMIT_WARNING_MM};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, path::PathBuf};

/// Everything the live harness needs to know about the deployment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Serial baud rate; the DWM1001 shell runs at 115200.
    pub baud: u32,
    /// Which firmware the deployed modules run.
    pub firmware: Firmware,
    /// Alarm threshold, mm.
    pub alarm_mm: i32,
    /// Warning threshold, mm.
    pub warning_mm: i32,
    /// Display units.
    pub units: LengthUnit,
    /// How often the display loop polls the accumulator, Hz.
    pub poll_hz: f64,
    /// Where record files land; `None` disables recording.
    pub record_dir: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            baud: 115_200,
            firmware: Firmware::AccelEnabled,
            alarm_mm: LIMIT_ALARM_MM,
            warning_mm: LIMIT_WARNING_MM,
            units: LengthUnit::Metric,
            poll_hz: 10.0,
            record_dir: None,
        }
    }
}

/// Returned when a config file cannot be loaded.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    IoError(std::io::Error),
    /// The file is not valid RON for [`HarnessConfig`].
    RonSpannedError(ron::de::SpannedError),
    /// `poll_hz` must be a positive rate.
    BadPollRate(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(error) => write!(f, "io error: {}", error),
            ConfigError::RonSpannedError(error) => write!(f, "ron spanning error: {}", error),
            ConfigError::BadPollRate(hz) => {
                write!(f, "poll_hz must be positive, got {}", hz)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::IoError(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        ConfigError::RonSpannedError(value)
    }
}

impl HarnessConfig {
    /// Loads a config from a RON file. Missing fields take their defaults,
    /// so a deployment only writes down what it changes.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let config: HarnessConfig = ron::de::from_str(&raw)?;
        // The poll interval is 1 / poll_hz; zero, negative and non-finite
        // rates would all produce an unusable interval.
        if !config.poll_hz.is_finite() || config.poll_hz <= 0.0 {
            return Err(ConfigError::BadPollRate(config.poll_hz));
        }
        Ok(config)
    }
}
