//! Headset-side session process: the legality gate between the operator's
//! commands and the experiment state machine.
//!
//! The gate tracks which schedule step is current and how far it has got
//! (the coarse [`SessionStage`]), rejects commands that are not legal in the
//! current stage with an `InvalidOperation` reply, and broadcasts a fresh
//! summary after every accepted state-changing command.

use std::path::PathBuf;

use ambex_core::RunConfig;
use ambex_core::bitmap::{set_false, set_true};
use ambex_experiment::{
    ExperimentManager, ExperimentNotice, FrameSampler, Metronome, TargetsService, TrackService,
    generate_run_configs,
};
use ambex_net::{FromHeadset, HeadsetEndpoint, SessionStage, SessionSummary, ToHeadset, WireError};
use ambex_timing::Clock;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::prefs::{ParticipantPrefs, PrefsError, clear_repeating_steps};

/// Participant shown until the operator picks one.
const DEFAULT_PARTICIPANT_ID: i32 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Prefs(#[from] PrefsError),
    #[error(transparent)]
    Wire(#[from] WireError),
}

pub struct HeadsetProcess<T, W, M, F, C, G>
where
    T: TargetsService,
    W: TrackService,
    M: Metronome,
    F: FrameSampler,
    C: Clock,
    G: Rng,
{
    manager: ExperimentManager<T, W, M, F, C, G>,
    endpoint: HeadsetEndpoint,
    data_dir: PathBuf,
    prefs: ParticipantPrefs,
    steps: Vec<RunConfig>,
    index: i32,
    stage: SessionStage,
}

impl<T, W, M, F, C, G> HeadsetProcess<T, W, M, F, C, G>
where
    T: TargetsService,
    W: TrackService,
    M: Metronome,
    F: FrameSampler,
    C: Clock,
    G: Rng,
{
    /// Loads the default participant's prefs and announces the initial
    /// summary over the fresh connection.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        manager: ExperimentManager<T, W, M, F, C, G>,
        endpoint: HeadsetEndpoint,
    ) -> Result<Self, SessionError> {
        let data_dir = data_dir.into();
        let (prefs, steps) = load_participant(&data_dir, DEFAULT_PARTICIPANT_ID)?;
        let process = Self {
            manager,
            endpoint,
            data_dir,
            prefs,
            steps,
            index: -1,
            stage: SessionStage::Idle,
        };
        process.send_summary()?;
        Ok(process)
    }

    pub fn stage(&self) -> SessionStage {
        self.stage
    }

    pub fn step_index(&self) -> i32 {
        self.index
    }

    pub fn prefs(&self) -> &ParticipantPrefs {
        &self.prefs
    }

    pub fn steps(&self) -> &[RunConfig] {
        &self.steps
    }

    /// The machine itself, for the collaborators feeding geometry events in.
    pub fn experiment(&mut self) -> &mut ExperimentManager<T, W, M, F, C, G> {
        &mut self.manager
    }

    pub fn save_prefs(&self) -> Result<(), PrefsError> {
        self.prefs.save(&self.data_dir)
    }

    /// One frame of the session loop: applies pending operator commands,
    /// advances the machine and reports what it produced.
    pub fn tick(&mut self) -> Result<(), SessionError> {
        while let Some(command) = self.endpoint.try_recv()? {
            debug!(command = command.name(), "operator command");
            self.handle_command(command)?;
        }
        self.manager.tick();
        for notice in self.manager.take_notices() {
            self.handle_notice(notice)?;
        }
        Ok(())
    }

    fn handle_command(&mut self, command: ToHeadset) -> Result<(), SessionError> {
        match command {
            ToHeadset::RefreshSummary => self.send_summary()?,
            ToHeadset::SavePrefs => {
                if let Err(cause) = self.prefs.save(&self.data_dir) {
                    error!(%cause, "saving prefs failed");
                    self.endpoint.send(&FromHeadset::UnexpectedError {
                        message: format!("saving prefs failed: {cause}"),
                    })?;
                }
            }

            ToHeadset::SetParticipantId { participant_id } => {
                if self.stage != SessionStage::Idle {
                    return self
                        .invalid("Cannot change participant id when a step is prepared or running");
                }
                let (prefs, steps) = load_participant(&self.data_dir, participant_id)?;
                self.prefs = prefs;
                self.steps = steps;
                self.index = -1;
                self.send_summary()?;
            }
            ToHeadset::SetLeftHanded { left_handed } => {
                if self.stage != SessionStage::Idle {
                    return self.invalid("Cannot change hands when a step is prepared or running");
                }
                self.prefs.left_handed = left_handed;
                self.steps =
                    generate_run_configs(self.prefs.participant_id, self.prefs.left_handed);
                self.index = -1;
                self.send_summary()?;
            }
            ToHeadset::SetStepIsDone { index, done } => {
                if self.stage != SessionStage::Idle {
                    return self.invalid("Can change step done marks only while idle");
                }
                self.prefs.done_bitmap = if done {
                    set_true(self.prefs.done_bitmap, index)
                } else {
                    set_false(self.prefs.done_bitmap, index)
                };
                self.send_summary()?;
            }

            ToHeadset::PrepareNextStep { index } => {
                if matches!(self.stage, SessionStage::Running | SessionStage::Validation) {
                    return self.invalid("Cannot prepare while a step is running");
                }
                if self.stage == SessionStage::Preparing && index != self.index {
                    return self.invalid("Cannot prepare when another step was prepared");
                }
                let Some(step) = self.step_at(index) else {
                    return self.invalid(format!("No step with index {index}"));
                };
                self.index = index;
                self.stage = SessionStage::Preparing;
                self.send_summary()?;
                self.manager.on_server_said_prepare(step);
            }
            ToHeadset::StartNextStep { index } => {
                if self.stage != SessionStage::Preparing {
                    return self.invalid("Cannot start, no step is prepared");
                }
                if index != self.index {
                    return self.invalid("Cannot start a step that has not been prepared");
                }
                self.stage = SessionStage::Running;
                self.send_summary()?;
                self.manager.on_server_said_start();
            }
            ToHeadset::FinishTrainingStep { index } => {
                let is_training_running = self.stage == SessionStage::Running
                    && self
                        .current_step()
                        .is_some_and(|step| step.is_any_training());
                if !is_training_running || index != self.index {
                    return self.invalid("Can only stop the training that is running");
                }
                self.prefs.done_bitmap = set_true(self.prefs.done_bitmap, self.index);
                self.index += 1;
                self.stage = SessionStage::Idle;
                self.manager.on_server_said_finish_training();
                self.send_summary()?;
            }

            ToHeadset::ValidateTrial | ToHeadset::InvalidateTrial => {
                let validating_a_trial = self.stage == SessionStage::Validation
                    && self.current_step().is_some_and(|step| step.is_trial());
                if !validating_a_trial {
                    return self.invalid("Validate/invalidate needs a trial awaiting a verdict");
                }
                if command == ToHeadset::ValidateTrial {
                    self.manager.on_server_validated_trial();
                } else {
                    self.manager.on_server_invalidated_trial();
                }
                self.stage = SessionStage::Running;
                self.send_summary()?;
            }

            ToHeadset::SetPathRefHeight => self.manager.on_server_set_path_reference_height(),
            ToHeadset::PlaceTrackAndLight => self.manager.place_track_and_light(),
            ToHeadset::ToggleHeadsetAdjustmentText { show } => {
                self.manager.set_headset_adjustment_text(show);
            }
        }
        Ok(())
    }

    fn handle_notice(&mut self, notice: ExperimentNotice) -> Result<(), WireError> {
        match notice {
            ExperimentNotice::TrialsFinished => {
                self.prefs.done_bitmap = set_true(self.prefs.done_bitmap, self.index);
                self.stage = SessionStage::Idle;
                self.send_summary()
            }
            ExperimentNotice::RequestTrialValidation => {
                self.stage = SessionStage::Validation;
                self.send_summary()?;
                self.endpoint.send(&FromHeadset::RequestTrialValidation)
            }
            ExperimentNotice::UnexpectedError(message) => self
                .endpoint
                .send(&FromHeadset::UnexpectedError { message }),
            ExperimentNotice::UserError(message) => {
                self.endpoint.send(&FromHeadset::UserError { message })
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> Result<(), SessionError> {
        let reason = reason.into();
        warn!(%reason, "rejected operator command");
        self.endpoint
            .send(&FromHeadset::InvalidOperation { reason })?;
        Ok(())
    }

    fn send_summary(&self) -> Result<(), WireError> {
        self.endpoint.send(&FromHeadset::Summary(SessionSummary {
            participant_id: self.prefs.participant_id,
            left_handed: self.prefs.left_handed,
            done_bitmap: self.prefs.done_bitmap,
            index: self.index,
            stage: self.stage,
        }))
    }

    fn step_at(&self, index: i32) -> Option<RunConfig> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.steps.get(i))
            .copied()
    }

    fn current_step(&self) -> Option<RunConfig> {
        self.step_at(self.index)
    }
}

/// Prefs from disk plus the schedule they imply. Steps that repeat every
/// session come back unmarked.
fn load_participant(
    data_dir: &std::path::Path,
    participant_id: i32,
) -> Result<(ParticipantPrefs, Vec<RunConfig>), PrefsError> {
    let mut prefs = ParticipantPrefs::load_or_default(data_dir, participant_id)?;
    let steps = generate_run_configs(prefs.participant_id, prefs.left_handed);
    clear_repeating_steps(&mut prefs, &steps);
    Ok((prefs, steps))
}
