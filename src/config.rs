//! Engine configuration, read from the environment (`.env` is loaded by the
//! binary through `dotenvy`).

use crate::evidence::{FrameFormat, wav};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_EXPORT_DIR: &str = "evidence";

const WINDOW_VAR: &str = "EVIDENCE_WINDOW_SECS";
const EXPORT_DIR_VAR: &str = "EVIDENCE_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive whole number of seconds, got {value:?}")]
    InvalidWindow { var: &'static str, value: String },

    #[error("{var} of {secs}s needs {bytes} bytes per buffer, more than a WAV file can hold ({max} bytes)")]
    WindowTooLarge {
        var: &'static str,
        secs: u64,
        bytes: usize,
        max: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    /// How much recent audio each participant buffer retains
    pub window: Duration,
    /// Frames in any other format are not buffered
    pub format: FrameFormat,
    /// Where exported WAV files are written
    pub export_dir: PathBuf,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            format: FrameFormat::VOICE,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

impl EvidenceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup, falling back to
    /// defaults for anything unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(WINDOW_VAR) {
            let secs = value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidWindow {
                    var: WINDOW_VAR,
                    value: value.clone(),
                })?;
            config.window = Duration::from_secs(secs);

            let bytes = config.capacity_bytes();
            if bytes > wav::MAX_DATA_LEN {
                return Err(ConfigError::WindowTooLarge {
                    var: WINDOW_VAR,
                    secs,
                    bytes,
                    max: wav::MAX_DATA_LEN,
                });
            }
        }

        if let Some(dir) = lookup(EXPORT_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.export_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Capacity of each participant buffer in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.format.capacity_for(self.window)
    }
}
