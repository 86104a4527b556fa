//! Participant preferences persisted across sessions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ambex_core::RunConfig;
use ambex_core::bitmap::set_false;
use ambex_net::wire_options;
use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("prefs blob is malformed: {0}")]
    Codec(#[from] bincode::Error),
}

/// What the headset remembers about one participant between sessions.
///
/// Stored as a small binary blob next to the participant's CSV files, in
/// the same fixed-layout encoding the wire uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPrefs {
    pub participant_id: i32,
    pub left_handed: bool,
    pub done_bitmap: i64,
}

impl ParticipantPrefs {
    fn fresh(participant_id: i32) -> Self {
        Self {
            participant_id,
            left_handed: false,
            done_bitmap: 0,
        }
    }

    pub fn path_for(data_dir: &Path, participant_id: i32) -> PathBuf {
        data_dir.join(format!("{participant_id}_prefs"))
    }

    /// Loads the blob for `participant_id`, or starts from defaults when the
    /// participant has no file yet.
    pub fn load_or_default(data_dir: &Path, participant_id: i32) -> Result<Self, PrefsError> {
        let path = Self::path_for(data_dir, participant_id);
        if !path.exists() {
            debug!(participant_id, "no prefs file, starting fresh");
            return Ok(Self::fresh(participant_id));
        }
        let bytes = fs::read(&path)?;
        Ok(wire_options().deserialize(&bytes)?)
    }

    pub fn save(&self, data_dir: &Path) -> Result<(), PrefsError> {
        fs::create_dir_all(data_dir)?;
        let bytes = wire_options().serialize(self)?;
        fs::write(Self::path_for(data_dir, self.participant_id), bytes)?;
        debug!(participant_id = self.participant_id, "prefs saved");
        Ok(())
    }
}

/// Forgets the done marks of the steps that have to be redone every session,
/// such as the metronome rehearsals and the board-height calibration.
pub fn clear_repeating_steps(prefs: &mut ParticipantPrefs, steps: &[RunConfig]) {
    for (index, step) in steps.iter().enumerate() {
        if step.repeats_every_session() {
            prefs.done_bitmap = set_false(prefs.done_bitmap, index as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambex_core::bitmap::{get_bool, set_true};
    use ambex_experiment::generate_run_configs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let prefs = ParticipantPrefs::load_or_default(dir.path(), 42).unwrap();
        assert_eq!(prefs.participant_id, 42);
        assert!(!prefs.left_handed);
        assert_eq!(prefs.done_bitmap, 0);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let prefs = ParticipantPrefs {
            participant_id: 7,
            left_handed: true,
            done_bitmap: 0b1101,
        };
        prefs.save(dir.path()).unwrap();
        assert!(dir.path().join("7_prefs").exists());
        let back = ParticipantPrefs::load_or_default(dir.path(), 7).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn participants_do_not_share_files() {
        let dir = tempdir().unwrap();
        let first = ParticipantPrefs {
            participant_id: 1,
            left_handed: false,
            done_bitmap: 3,
        };
        first.save(dir.path()).unwrap();
        let other = ParticipantPrefs::load_or_default(dir.path(), 2).unwrap();
        assert_eq!(other.done_bitmap, 0);
    }

    #[test]
    fn garbage_blob_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("9_prefs"), [1, 2, 3]).unwrap();
        assert!(matches!(
            ParticipantPrefs::load_or_default(dir.path(), 9),
            Err(PrefsError::Codec(_))
        ));
    }

    #[test]
    fn reload_forgets_only_the_repeating_steps() {
        let steps = generate_run_configs(3, false);
        let mut prefs = ParticipantPrefs::fresh(3);
        for index in 0..steps.len() as i32 {
            prefs.done_bitmap = set_true(prefs.done_bitmap, index);
        }

        clear_repeating_steps(&mut prefs, &steps);
        let mut cleared = 0;
        for (index, step) in steps.iter().enumerate() {
            let done = get_bool(prefs.done_bitmap, index as i32);
            if step.repeats_every_session() {
                assert!(!done, "step {index} should have been forgotten");
                cleared += 1;
            } else {
                assert!(done, "step {index} should have stayed done");
            }
        }
        // two metronome rehearsals, the initial training and the calibration
        assert_eq!(cleared, 4);
    }
}
