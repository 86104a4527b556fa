use std::path::PathBuf;

use ambex_core::TargetDiameters;
use serde::{Deserialize, Serialize};

/// Headset-side experiment settings.
///
/// Every field has a default so a partial settings file (or none at all)
/// still yields a runnable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Directory the participant CSV files are written to.
    #[serde(default = "ExperimentConfig::default_data_dir")]
    pub data_dir: PathBuf,
    /// Metronome tempo for the walking contexts, in beats per minute.
    #[serde(default = "ExperimentConfig::default_walking_tempo_bpm")]
    pub walking_tempo_bpm: u32,
    #[serde(default)]
    pub target_diameters: TargetDiameters,
}

impl ExperimentConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    fn default_walking_tempo_bpm() -> u32 {
        90
    }

    /// Seconds of one metronome beat. A zero tempo is treated as 1 BPM so
    /// the countdown range stays finite.
    pub fn step_period_secs(&self) -> f32 {
        60.0 / self.walking_tempo_bpm.max(1) as f32
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            walking_tempo_bpm: Self::default_walking_tempo_bpm(),
            target_diameters: TargetDiameters::default(),
        }
    }
}
