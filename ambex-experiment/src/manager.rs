//! State machine driving one step of a participant's session on the headset.
//!
//! Server commands arrive through the `on_server_*` methods, collaborator
//! geometry callbacks through the gated `on_selector_*`/`on_participant_*`
//! methods, and time through `tick`. Outbound reports accumulate as notices
//! the session layer drains with [`ExperimentManager::take_notices`].

use std::collections::VecDeque;
use std::fs;
use std::time::Duration;

use ambex_core::{
    CircleDirection, Context, Pose, RunConfig, TARGETS_COUNT, diametric_indexes,
};
use ambex_logging::{AsyncCsvLogger, FlushHandle, LoggerError};
use ambex_timing::{Clock, Scheduler};
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::columns::{SELECTION_COLUMNS, TRANSFORM_PREFIXES, TRANSFORM_SUFFIXES, high_frequency_columns};
use crate::config::ExperimentConfig;
use crate::events::{ExperimentEvent, ExperimentNotice};
use crate::rig::{FrameSampler, Metronome, TargetsService, TrackService};
use crate::sizes::TargetSizeSequence;

/// Trainings validate themselves after the participant clears a block.
const AUTO_VALIDATE_DELAY: Duration = Duration::from_secs(2);
/// Pause before the re-randomized direction arrow reappears between laps.
const ARROW_RESHOW_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    Idle,
    Preparing,
    AwaitingParticipantEnterTrack,
    WalkingWithMetronomeTraining,
    SelectingTargetsStanding,
    SelectingTargetsWalking,
    AwaitingServerValidationOfLastTrial,
}

impl ExperimentState {
    pub fn name(&self) -> &'static str {
        match self {
            ExperimentState::Idle => "Idle",
            ExperimentState::Preparing => "Preparing",
            ExperimentState::AwaitingParticipantEnterTrack => "AwaitingParticipantEnterTrack",
            ExperimentState::WalkingWithMetronomeTraining => "WalkingWithMetronomeTraining",
            ExperimentState::SelectingTargetsStanding => "SelectingTargetsStanding",
            ExperimentState::SelectingTargetsWalking => "SelectingTargetsWalking",
            ExperimentState::AwaitingServerValidationOfLastTrial => {
                "AwaitingServerValidationOfLastTrial"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Countdown,
    AutoValidate,
    ShowDirectionArrow,
}

/// What to do once both loggers report their queues written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterFlush {
    NextStandingBlock,
    NextWalkingBlock,
    FinishTrials,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("{event} arrived in {state} state, which is not supposed to happen")]
    NotSupposed {
        event: &'static str,
        state: &'static str,
    },
    #[error("cannot stop trials with a finish-training command in {state} state")]
    CannotStopTrials { state: &'static str },
    #[error("no run config has been prepared")]
    MissingRunConfig,
    #[error("target size sequence missing mid-step")]
    MissingSizes,
    #[error("selection reported but the targets service has no record of it")]
    MissingSelection,
    #[error("no active target while the movement log is running")]
    NoActiveTarget,
    #[error("logger missing for a trial step")]
    LoggerMissing,
    #[error(transparent)]
    Logger(#[from] LoggerError),
}

pub struct ExperimentManager<T, W, M, F, C, G>
where
    T: TargetsService,
    W: TrackService,
    M: Metronome,
    F: FrameSampler,
    C: Clock,
    G: Rng,
{
    targets: T,
    track: W,
    metronome: M,
    sampler: F,
    clock: C,
    rng: G,
    config: ExperimentConfig,

    state: ExperimentState,
    run_config: Option<RunConfig>,
    notices: Vec<ExperimentNotice>,
    timers: Scheduler<TimerKind>,

    listening_track_events: bool,
    listening_target_events: bool,
    movement_logging_on: bool,

    sizes: Option<TargetSizeSequence>,
    block_indexes: VecDeque<usize>,
    active_target_index: Option<usize>,
    circle_direction: CircleDirection,

    targets_selected: i32,
    selections_validated: i32,
    measurement_id: i64,

    activate_first_target_moment: Duration,
    select_first_target_moment: Duration,
    select_previous_target_moment: Duration,

    selections_logger: Option<AsyncCsvLogger>,
    movement_logger: Option<AsyncCsvLogger>,
    pending_flush: Option<(FlushHandle, FlushHandle, AfterFlush)>,
}

impl<T, W, M, F, C, G> ExperimentManager<T, W, M, F, C, G>
where
    T: TargetsService,
    W: TrackService,
    M: Metronome,
    F: FrameSampler,
    C: Clock,
    G: Rng,
{
    pub fn new(
        config: ExperimentConfig,
        targets: T,
        track: W,
        metronome: M,
        sampler: F,
        clock: C,
        rng: G,
    ) -> Self {
        Self {
            targets,
            track,
            metronome,
            sampler,
            clock,
            rng,
            config,
            state: ExperimentState::Idle,
            run_config: None,
            notices: Vec::new(),
            timers: Scheduler::new(),
            listening_track_events: false,
            listening_target_events: false,
            movement_logging_on: false,
            sizes: None,
            block_indexes: VecDeque::new(),
            active_target_index: None,
            circle_direction: CircleDirection::Clockwise,
            targets_selected: 0,
            selections_validated: 0,
            measurement_id: 0,
            activate_first_target_moment: Duration::ZERO,
            select_first_target_moment: Duration::ZERO,
            select_previous_target_moment: Duration::ZERO,
            selections_logger: None,
            movement_logger: None,
            pending_flush: None,
        }
    }

    pub fn state(&self) -> ExperimentState {
        self.state
    }

    /// Drains the reports accumulated since the previous call.
    pub fn take_notices(&mut self) -> Vec<ExperimentNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Advances timers, finishes pending flushes and samples the movement
    /// log. Call once per rendered frame.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        while let Some(kind) = self.timers.pop_due(now) {
            match kind {
                TimerKind::Countdown => self.handle_event(ExperimentEvent::CountdownFinished),
                TimerKind::AutoValidate => self.handle_event(ExperimentEvent::ServerValidatedTrial),
                TimerKind::ShowDirectionArrow => self.track.set_arrow_visible(true),
            }
        }

        if let Some((mut selections, mut movement, next)) = self.pending_flush.take() {
            if selections.is_complete() && movement.is_complete() {
                for handle in [&selections, &movement] {
                    if let Some(Err(cause)) = handle.outcome() {
                        error!(%cause, "saving loggers to disk failed");
                        self.notices.push(ExperimentNotice::UnexpectedError(format!(
                            "saving data to disk failed: {cause}"
                        )));
                    }
                }
                self.apply_after_flush(next);
            } else {
                self.pending_flush = Some((selections, movement, next));
            }
        }

        if self.movement_logging_on {
            if let Err(cause) = self.log_movement_row() {
                error!(%cause, "movement row failed");
                self.notices
                    .push(ExperimentNotice::UnexpectedError(cause.to_string()));
            }
        }
    }

    // ---- server commands -------------------------------------------------

    /// The run config is only adopted while idle; a re-prepare of the same
    /// step keeps the one already in progress.
    pub fn on_server_said_prepare(&mut self, config: RunConfig) {
        if self.state == ExperimentState::Idle {
            self.run_config = Some(config);
        }
        self.handle_event(ExperimentEvent::ServerSaidPrepare);
    }

    pub fn on_server_said_start(&mut self) {
        self.handle_event(ExperimentEvent::ServerSaidStart);
    }

    pub fn on_server_said_finish_training(&mut self) {
        self.handle_event(ExperimentEvent::ServerSaidFinishTraining);
    }

    pub fn on_server_validated_trial(&mut self) {
        self.handle_event(ExperimentEvent::ServerValidatedTrial);
    }

    pub fn on_server_invalidated_trial(&mut self) {
        self.handle_event(ExperimentEvent::ServerInvalidatedTrial);
    }

    pub fn on_server_set_path_reference_height(&mut self) {
        self.targets.refresh_path_reference();
    }

    pub fn place_track_and_light(&mut self) {
        self.track.place_forward_from_headset();
    }

    pub fn set_headset_adjustment_text(&mut self, show: bool) {
        self.targets.set_adjustment_text_visible(show);
    }

    // ---- collaborator callbacks, gated by the listening flags ------------

    pub fn on_selector_entered_target_zone(&mut self) {
        if self.listening_target_events {
            self.handle_event(ExperimentEvent::SelectorEnteredTargetZone);
        }
    }

    pub fn on_selector_exited_target_zone(&mut self) {
        if self.listening_target_events {
            self.handle_event(ExperimentEvent::SelectorExitedTargetZone);
        }
    }

    pub fn on_selector_exited_wrong_side(&mut self) {
        if self.listening_target_events {
            self.handle_event(ExperimentEvent::SelectorExitedWrongSide);
        }
    }

    pub fn on_participant_entered_track(&mut self, wrong_side: bool) {
        if self.listening_track_events {
            self.handle_event(ExperimentEvent::ParticipantEnteredTrack { wrong_side });
        }
    }

    pub fn on_participant_finished_track(&mut self) {
        if self.listening_track_events {
            self.handle_event(ExperimentEvent::ParticipantFinishedTrack);
        }
    }

    pub fn on_participant_swerved_off_track(&mut self) {
        if self.listening_track_events {
            self.handle_event(ExperimentEvent::ParticipantSwervedOffTrack);
        }
    }

    pub fn on_participant_slowed_down(&mut self) {
        if self.listening_track_events {
            self.handle_event(ExperimentEvent::ParticipantSlowedDown);
        }
    }

    // ---- dispatch --------------------------------------------------------

    /// Runs one transition. A failing handler keeps the machine alive: the
    /// state is restored to what it was before the event and the failure is
    /// surfaced as an `UnexpectedError` notice.
    fn handle_event(&mut self, event: ExperimentEvent) {
        let before = self.state;
        match self.dispatch(event) {
            Ok(()) => {
                if self.state != before {
                    debug!(
                        event = event.name(),
                        from = before.name(),
                        to = self.state.name(),
                        "state changed"
                    );
                }
            }
            Err(cause) => {
                error!(event = event.name(), state = before.name(), %cause, "transition failed");
                self.state = before;
                self.notices
                    .push(ExperimentNotice::UnexpectedError(cause.to_string()));
            }
        }
    }

    fn dispatch(&mut self, event: ExperimentEvent) -> Result<(), TransitionError> {
        use ExperimentEvent as E;
        use ExperimentState as S;

        match (self.state, event) {
            (S::Idle, E::ServerSaidPrepare) => self.prepare_step(),

            (S::Preparing, E::ServerSaidPrepare) => {
                self.targets.refresh_path_reference();
                Ok(())
            }
            (S::Preparing, E::ServerSaidStart) => self.start_step(),

            (S::AwaitingParticipantEnterTrack, E::ParticipantEnteredTrack { wrong_side }) => {
                self.participant_entered(wrong_side)
            }
            // only the entry matters here, the rest of the track chatter is noise
            (
                S::AwaitingParticipantEnterTrack,
                E::ParticipantFinishedTrack | E::ParticipantSlowedDown | E::ParticipantSwervedOffTrack,
            ) => Ok(()),
            (S::AwaitingParticipantEnterTrack, E::ServerSaidFinishTraining) => {
                let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
                self.finish_training(run.is_any_training())
            }

            (S::WalkingWithMetronomeTraining, E::ParticipantEnteredTrack { .. }) => Ok(()),
            (S::WalkingWithMetronomeTraining, E::ParticipantFinishedTrack) => {
                self.track.set_arrow_visible(false);
                self.randomize_direction_arrow();
                let deadline = self.clock.now() + ARROW_RESHOW_DELAY;
                self.timers.arm(TimerKind::ShowDirectionArrow, deadline);
                Ok(())
            }
            (S::WalkingWithMetronomeTraining, E::ParticipantSlowedDown) => {
                self.participant_error("Participant slowed down");
                Ok(())
            }
            (S::WalkingWithMetronomeTraining, E::ParticipantSwervedOffTrack) => {
                self.participant_error("Participant swerved off the track");
                Ok(())
            }
            (S::WalkingWithMetronomeTraining, E::ServerSaidFinishTraining) => {
                self.finish_training(true)
            }

            (S::SelectingTargetsStanding, E::CountdownFinished) => self.start_selecting_pipeline(),
            (S::SelectingTargetsStanding, E::SelectorEnteredTargetZone) => self.selector_entered(),
            (S::SelectingTargetsStanding, E::SelectorExitedTargetZone) => self.selector_exited(false),
            (S::SelectingTargetsStanding, E::SelectorExitedWrongSide) => {
                self.participant_error("Selector exited the wrong side of the board");
                self.handle_invalid()?;
                self.arm_countdown();
                Ok(())
            }
            (S::SelectingTargetsStanding, E::ServerSaidFinishTraining) => {
                let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
                self.finish_training(run.is_training)
            }

            (S::SelectingTargetsWalking, E::CountdownFinished) => self.start_selecting_pipeline(),
            (S::SelectingTargetsWalking, E::SelectorEnteredTargetZone) => self.selector_entered(),
            (S::SelectingTargetsWalking, E::SelectorExitedTargetZone) => self.selector_exited(true),
            (S::SelectingTargetsWalking, E::SelectorExitedWrongSide) => {
                self.walking_interrupted("Selector exited the wrong side of the board")
            }
            (S::SelectingTargetsWalking, E::ParticipantFinishedTrack) => {
                self.walking_interrupted("Participant finished the track early")
            }
            (S::SelectingTargetsWalking, E::ParticipantSlowedDown) => {
                self.walking_interrupted("Participant slowed down")
            }
            (S::SelectingTargetsWalking, E::ParticipantSwervedOffTrack) => {
                self.walking_interrupted("Participant swerved off the track")
            }
            (S::SelectingTargetsWalking, E::ServerSaidFinishTraining) => {
                let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
                self.finish_training(run.is_training)
            }

            (S::AwaitingServerValidationOfLastTrial, E::ServerValidatedTrial) => {
                self.trial_validated()
            }
            (S::AwaitingServerValidationOfLastTrial, E::ServerInvalidatedTrial) => {
                self.trial_invalidated()
            }
            (S::AwaitingServerValidationOfLastTrial, E::ServerSaidFinishTraining) => {
                let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
                self.finish_training(run.is_training)
            }

            (state, event) => Err(TransitionError::NotSupposed {
                event: event.name(),
                state: state.name(),
            }),
        }
    }

    // ---- transition handlers ---------------------------------------------

    fn prepare_step(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        if run.is_metronome_training {
            self.track.configure(run.context);
            self.track.set_enabled(true);
            self.randomize_direction_arrow();
            self.track.set_arrow_visible(true);
            self.targets.hide_board();
            self.state = ExperimentState::Preparing;
            return Ok(());
        }

        if run.is_break {
            // nothing to set up, starting a break reports it done right away
            self.state = ExperimentState::Preparing;
            return Ok(());
        }

        if run.is_height_calibration {
            self.targets.refresh_path_reference();
            self.targets.set_handedness(run.dominant_hand());
            self.state = ExperimentState::Preparing;
            return Ok(());
        }

        self.targets.refresh_path_reference();
        self.targets.set_handedness(run.dominant_hand());
        self.targets.set_reference_frame(run.reference_frame);
        self.targets.show_board();
        self.targets.set_selector_projection(true);

        let mut sizes = if run.is_training {
            TargetSizeSequence::for_training(&mut self.rng)
        } else {
            TargetSizeSequence::for_trial(&mut self.rng)
        };
        let first = sizes.advance().ok_or(TransitionError::MissingSizes)?;
        self.targets.set_target_size(first);
        self.targets.ensure_targets_shown();
        self.sizes = Some(sizes);

        self.targets_selected = 0;
        self.measurement_id = 0;
        self.selections_validated = 0;

        if run.is_trial() {
            self.ensure_loggers_initialised()?;
        }

        if run.context.is_moving() {
            self.track.configure(run.context);
            self.track.set_enabled(true);
            self.randomize_direction_arrow();
            self.track.set_arrow_visible(true);
        } else {
            self.track.set_enabled(false);
        }

        self.state = ExperimentState::Preparing;
        Ok(())
    }

    fn start_step(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        if run.is_break {
            self.notices.push(ExperimentNotice::TrialsFinished);
            self.state = ExperimentState::Idle;
            return Ok(());
        }

        if run.is_height_calibration {
            self.targets.commit_path_reference_height();
            self.notices.push(ExperimentNotice::TrialsFinished);
            self.state = ExperimentState::Idle;
            return Ok(());
        }

        if run.is_metronome_training || run.context.is_moving() {
            // participant first has to enter the track, training or not
            self.metronome.set_tempo(self.config.walking_tempo_bpm);
            self.metronome.set_enabled(true);
            self.listening_track_events = true;
            self.state = ExperimentState::AwaitingParticipantEnterTrack;
        } else {
            self.arm_countdown();
            self.state = ExperimentState::SelectingTargetsStanding;
        }
        Ok(())
    }

    fn participant_entered(&mut self, wrong_side: bool) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        if wrong_side && run.context == Context::Circle {
            self.participant_error("Participant entered the track from the wrong side");
            self.targets.ensure_no_active_targets();
            self.handle_invalid()?;
            return Ok(());
        }

        if run.is_metronome_training {
            self.state = ExperimentState::WalkingWithMetronomeTraining;
            return Ok(());
        }

        self.arm_countdown();
        self.state = ExperimentState::SelectingTargetsWalking;
        Ok(())
    }

    /// First target of the diametric lap goes live; for trials the movement
    /// log starts sampling.
    fn start_selecting_pipeline(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        let mut lap: VecDeque<usize> = diametric_indexes(TARGETS_COUNT)
            .take(TARGETS_COUNT)
            .collect();
        self.active_target_index = lap.pop_front();
        self.block_indexes = lap;
        if let Some(index) = self.active_target_index {
            self.targets.activate_target(index);
        }
        self.listening_target_events = true;

        if run.is_trial() {
            self.activate_first_target_moment = self.clock.now();
            self.movement_logging_on = true;
        }
        Ok(())
    }

    fn selector_entered(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        self.targets_selected += 1;
        if run.is_trial() {
            self.log_selection_row()?;
        }
        Ok(())
    }

    fn selector_exited(&mut self, walking: bool) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        if let Some(next) = self.block_indexes.pop_front() {
            self.active_target_index = Some(next);
            self.targets.activate_target(next);
            return Ok(());
        }

        // the just-selected target was the last one with this size
        self.listening_target_events = false;
        self.movement_logging_on = false;
        self.active_target_index = None;
        if walking {
            self.listening_track_events = false;
            self.track.set_arrow_visible(false);
            self.metronome.set_enabled(false);
        }
        self.targets.set_selector_projection(false);
        self.targets.ensure_targets_hidden();

        if run.is_training {
            let deadline = self.clock.now() + AUTO_VALIDATE_DELAY;
            self.timers.arm(TimerKind::AutoValidate, deadline);
        } else {
            self.notices.push(ExperimentNotice::RequestTrialValidation);
        }
        self.state = ExperimentState::AwaitingServerValidationOfLastTrial;
        Ok(())
    }

    fn walking_interrupted(&mut self, message: &str) -> Result<(), TransitionError> {
        self.participant_error(message);
        self.targets.ensure_no_active_targets();
        self.handle_invalid()?;
        // the countdown may still be pending when the track ends early
        self.timers.cancel(TimerKind::Countdown);
        self.state = ExperimentState::AwaitingParticipantEnterTrack;
        Ok(())
    }

    fn trial_validated(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        self.selections_validated += TARGETS_COUNT as i32;

        let sizes = self.sizes.as_mut().ok_or(TransitionError::MissingSizes)?;
        match sizes.advance() {
            None => {
                // only trials run out of sizes, trainings cycle forever
                self.track.set_enabled(false);
                self.begin_flush(AfterFlush::FinishTrials)?;
            }
            Some(size) => {
                self.targets.set_target_size(size);
                self.randomize_direction_arrow();
                self.track.set_arrow_visible(true);

                let next = if run.context == Context::Standing {
                    AfterFlush::NextStandingBlock
                } else {
                    AfterFlush::NextWalkingBlock
                };
                if run.is_training {
                    self.apply_after_flush(next);
                } else {
                    self.begin_flush(next)?;
                }
            }
        }
        Ok(())
    }

    fn trial_invalidated(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        self.handle_invalid()?;

        if run.context == Context::Standing {
            self.targets.set_selector_projection(true);
            self.targets.ensure_targets_shown();
            self.arm_countdown();
            self.state = ExperimentState::SelectingTargetsStanding;
        } else {
            self.targets.set_selector_projection(true);
            self.metronome.set_tempo(self.config.walking_tempo_bpm);
            self.metronome.set_enabled(true);
            self.listening_track_events = true;
            self.targets.ensure_targets_shown();
            self.state = ExperimentState::AwaitingParticipantEnterTrack;
        }
        Ok(())
    }

    /// Rolls the step back to its last validated block.
    fn handle_invalid(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;

        if run.is_metronome_training {
            self.randomize_direction_arrow();
            self.track.set_arrow_visible(true);
            return Ok(());
        }

        self.targets_selected = self.selections_validated;
        let sizes = self.sizes.take().ok_or(TransitionError::MissingSizes)?;
        let mut replacement = sizes.reshuffled_remaining(&mut self.rng);
        let size = replacement.advance().ok_or(TransitionError::MissingSizes)?;
        self.targets.set_target_size(size);
        self.targets.ensure_targets_shown();
        self.sizes = Some(replacement);

        if run.is_trial() {
            self.movement_logging_on = false;
            if let Some(logger) = self.selections_logger.as_mut() {
                logger.clear_unsaved_data();
            }
            if let Some(logger) = self.movement_logger.as_mut() {
                logger.clear_unsaved_data();
            }
        }

        self.randomize_direction_arrow();
        self.track.set_arrow_visible(true);
        Ok(())
    }

    fn finish_training(&mut self, allowed: bool) -> Result<(), TransitionError> {
        if !allowed {
            return Err(TransitionError::CannotStopTrials {
                state: self.state.name(),
            });
        }
        self.cleanup();
        self.state = ExperimentState::Idle;
        Ok(())
    }

    /// Resets every per-step flag, timer and scene element.
    fn cleanup(&mut self) {
        self.timers.cancel_all();
        self.listening_track_events = false;
        self.listening_target_events = false;
        self.movement_logging_on = false;
        self.active_target_index = None;
        self.metronome.set_enabled(false);
        self.track.set_enabled(false);
        self.track.set_arrow_visible(false);
        self.targets.ensure_targets_hidden();
        self.targets.set_selector_projection(false);
        self.targets.hide_board();
    }

    // ---- helpers ---------------------------------------------------------

    fn participant_error(&mut self, message: &str) {
        warn!(%message, "participant error");
        self.notices
            .push(ExperimentNotice::UserError(message.to_string()));
    }

    /// Standing blocks start after `1 + U[0,1)` s; on a track the delay is
    /// `0.5 + U[0, 2·beat)` so the first target is decoupled from the step.
    fn arm_countdown(&mut self) {
        let moving = self
            .run_config
            .map(|run| run.context.is_moving())
            .unwrap_or(false);
        let delay = if moving {
            let beat = self.config.step_period_secs();
            0.5 + self.rng.random_range(0.0f32..(2.0 * beat))
        } else {
            1.0 + self.rng.random_range(0.0f32..1.0)
        };
        let deadline = self.clock.now() + Duration::from_secs_f32(delay);
        self.timers.arm(TimerKind::Countdown, deadline);
    }

    fn randomize_direction_arrow(&mut self) {
        let direction = if self.rng.random_bool(0.5) {
            CircleDirection::Clockwise
        } else {
            CircleDirection::CounterClockwise
        };
        self.circle_direction = direction;
        self.track.set_arrow_direction(direction);
    }

    fn apply_after_flush(&mut self, next: AfterFlush) {
        match next {
            AfterFlush::NextStandingBlock => {
                self.targets.set_selector_projection(true);
                self.targets.ensure_targets_shown();
                self.arm_countdown();
                self.state = ExperimentState::SelectingTargetsStanding;
            }
            AfterFlush::NextWalkingBlock => {
                self.targets.set_selector_projection(true);
                self.metronome.set_tempo(self.config.walking_tempo_bpm);
                self.metronome.set_enabled(true);
                self.listening_track_events = true;
                self.targets.ensure_targets_shown();
                self.state = ExperimentState::AwaitingParticipantEnterTrack;
            }
            AfterFlush::FinishTrials => {
                self.targets.hide_board();
                self.notices.push(ExperimentNotice::TrialsFinished);
                self.state = ExperimentState::Idle;
            }
        }
    }

    fn begin_flush(&mut self, next: AfterFlush) -> Result<(), TransitionError> {
        let selections = self
            .selections_logger
            .as_ref()
            .ok_or(TransitionError::LoggerMissing)?;
        let movement = self
            .movement_logger
            .as_ref()
            .ok_or(TransitionError::LoggerMissing)?;
        self.pending_flush = Some((selections.save_to_disk(), movement.save_to_disk(), next));
        Ok(())
    }

    /// Loggers follow the participant id in their file names; a new id gets
    /// fresh loggers, the same id keeps appending.
    fn ensure_loggers_initialised(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        fs::create_dir_all(&self.config.data_dir).map_err(LoggerError::from)?;

        let selections_path = self
            .config
            .data_dir
            .join(format!("{}_selections.csv", run.participant_id));
        if self
            .selections_logger
            .as_ref()
            .is_none_or(|logger| logger.path() != selections_path.as_path())
        {
            let mut logger = AsyncCsvLogger::new(&selections_path)?;
            if !logger.has_been_initialised() {
                logger.add_columns(SELECTION_COLUMNS)?;
                logger.initialise()?;
            }
            self.selections_logger = Some(logger);
        }

        let movement_path = self
            .config
            .data_dir
            .join(format!("{}_highFrequency.csv", run.participant_id));
        if self
            .movement_logger
            .as_ref()
            .is_none_or(|logger| logger.path() != movement_path.as_path())
        {
            let mut logger = AsyncCsvLogger::new(&movement_path)?;
            if !logger.has_been_initialised() {
                logger.add_columns(high_frequency_columns())?;
                logger.initialise()?;
            }
            self.movement_logger = Some(logger);
        }
        Ok(())
    }

    fn log_selection_row(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        let selection = self
            .targets
            .last_selection()
            .ok_or(TransitionError::MissingSelection)?;
        let now = self.clock.now();

        // the per-block clocks restart on the first selection of every size
        let first_of_block = self.targets_selected % TARGETS_COUNT as i32 == 1;
        let (since_first_ms, duration_ms) = if first_of_block {
            self.select_first_target_moment = now;
            self.select_previous_target_moment = now;
            (0i64, 0i64)
        } else {
            let since_first = now.saturating_sub(self.select_first_target_moment);
            let since_previous = now.saturating_sub(self.select_previous_target_moment);
            self.select_previous_target_moment = now;
            (
                since_first.as_millis() as i64,
                since_previous.as_millis() as i64,
            )
        };

        let timestamp = utc_timestamp();
        let circle_direction = self.circle_direction;
        let logger = self
            .selections_logger
            .as_mut()
            .ok_or(TransitionError::LoggerMissing)?;

        logger.set_column_value("ParticipantID", run.participant_id)?;
        logger.set_column_value("SelectionID", self.targets_selected)?;
        logger.set_column_value("Context", run.context.name())?;
        if run.context == Context::Circle {
            logger.set_column_value("CircleDirection", circle_direction.name())?;
        }
        logger.set_column_value("ReferenceFrame", run.reference_frame.name())?;
        logger.set_column_value("TargetSize", selection.target_size)?;
        logger.set_column_value("DominantHand", run.dominant_hand().name())?;
        logger.set_column_value("HumanReadableTimestampUTC", timestamp)?;
        logger.set_column_value("SystemClockTimestampMs", since_first_ms)?;
        logger.set_column_value("ActiveTargetIndex", selection.active_target_index)?;
        logger.set_column_value("AbsoluteTargetPositionX", selection.target_absolute_position.x)?;
        logger.set_column_value("AbsoluteTargetPositionY", selection.target_absolute_position.y)?;
        logger.set_column_value(
            "AbsoluteSelectionPositionX",
            selection.selection_absolute_position.x,
        )?;
        logger.set_column_value(
            "AbsoluteSelectionPositionY",
            selection.selection_absolute_position.y,
        )?;
        logger.set_column_value("LocalSelectionPositionX", selection.selection_local_position.x)?;
        logger.set_column_value("LocalSelectionPositionY", selection.selection_local_position.y)?;
        logger.set_column_value("Success", if selection.success { 1 } else { 0 })?;
        logger.set_column_value("SelectionDuration", duration_ms)?;
        logger.log_and_clear()?;
        Ok(())
    }

    fn log_movement_row(&mut self) -> Result<(), TransitionError> {
        let run = self.run_config.ok_or(TransitionError::MissingRunConfig)?;
        let size = self
            .sizes
            .as_ref()
            .and_then(|sizes| sizes.current())
            .ok_or(TransitionError::MissingSizes)?;
        let diameter = self.config.target_diameters.diameter_of(size);
        let active_index = self
            .active_target_index
            .ok_or(TransitionError::NoActiveTarget)?;
        let snapshot = self.sampler.sample();
        let now = self.clock.now();
        let since_first = now.saturating_sub(self.activate_first_target_moment);

        self.measurement_id += 1;
        let measurement_id = self.measurement_id;
        let timestamp = utc_timestamp();
        let circle_direction = self.circle_direction;
        let logger = self
            .movement_logger
            .as_mut()
            .ok_or(TransitionError::LoggerMissing)?;

        logger.set_column_value("ParticipantID", run.participant_id)?;
        logger.set_column_value("MeasurementID", measurement_id)?;
        logger.set_column_value("Context", run.context.name())?;
        if run.context == Context::Circle {
            logger.set_column_value("CircleDirection", circle_direction.name())?;
        }
        logger.set_column_value("ReferenceFrame", run.reference_frame.name())?;
        logger.set_column_value("TargetSize", diameter)?;
        logger.set_column_value("DominantHand", run.dominant_hand().name())?;
        logger.set_column_value("HumanReadableTimestampUTC", timestamp)?;
        logger.set_column_value("SystemClockTimestampMs", since_first.as_millis() as i64)?;

        for (prefix, pose) in TRANSFORM_PREFIXES.iter().zip(snapshot.poses()) {
            write_pose(logger, prefix, pose)?;
        }

        logger.set_column_value(
            "SelectorProjectionOntoAllTargetsX",
            snapshot.selector_projection.x,
        )?;
        logger.set_column_value(
            "SelectorProjectionOntoAllTargetsY",
            snapshot.selector_projection.y,
        )?;
        logger.set_column_value("ActiveTargetIndex", active_index as i32)?;
        logger.set_column_value(
            "ActiveTargetInsideAllTargetsX",
            snapshot.active_target_projection.x,
        )?;
        logger.set_column_value(
            "ActiveTargetInsideAllTargetsY",
            snapshot.active_target_projection.y,
        )?;
        logger.set_column_value(
            "IsSelectorInsideCollider",
            if snapshot.selector_inside_collider { 1 } else { 0 },
        )?;
        let distance = if snapshot.selector_inside_collider {
            -snapshot.selector_distance_to_board_plane
        } else {
            snapshot.selector_distance_to_board_plane
        };
        logger.set_column_value("DistanceFromSelectorToAllTargetsOXYPlane", distance)?;
        logger.log_and_clear()?;
        Ok(())
    }
}

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn write_pose(
    logger: &mut AsyncCsvLogger,
    prefix: &str,
    pose: &Pose,
) -> Result<(), LoggerError> {
    let components = [
        pose.position.x,
        pose.position.y,
        pose.position.z,
        pose.forward.x,
        pose.forward.y,
        pose.forward.z,
        pose.up.x,
        pose.up.y,
        pose.up.z,
        pose.rotation.x,
        pose.rotation.y,
        pose.rotation.z,
        pose.rotation.w,
    ];
    for (suffix, value) in TRANSFORM_SUFFIXES.iter().zip(components) {
        logger.set_column_value(&format!("{prefix}{suffix}"), value)?;
    }
    Ok(())
}
