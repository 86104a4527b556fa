//! App settings file: a thin JSON wrapper around the experiment
//! configuration, read once at startup.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use ambex_experiment::ExperimentConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every field defaults, so a missing or partial file still runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub experiment: ExperimentConfig,
}

impl AppSettings {
    /// Reads `path`, falling back to defaults when the file is missing.
    /// A malformed file is reported and ignored, never fatal.
    pub fn load_or_default(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(cause) => {
                    warn!(path = %path.display(), %cause, "malformed settings file, using defaults");
                    Self::default()
                }
            },
            Err(cause) if cause.kind() == ErrorKind::NotFound => Self::default(),
            Err(cause) => {
                warn!(path = %path.display(), %cause, "unreadable settings file, using defaults");
                Self::default()
            }
        }
    }
}
