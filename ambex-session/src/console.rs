//! Operator-side console state, the desktop half of the session link.
//!
//! The console keeps no authoritative state of its own. Everything it shows
//! is rebuilt from the latest [`SessionSummary`], with the schedule
//! regenerated locally from the participant id and handedness the summary
//! carries, so a reconnect costs exactly one refresh request.

use ambex_core::RunConfig;
use ambex_core::bitmap::get_bool;
use ambex_experiment::generate_run_configs;
use ambex_net::{
    FromHeadset, OperatorEndpoint, SessionStage, SessionSummary, ToHeadset, WireError,
};
use tracing::{error, warn};

pub struct OperatorConsole {
    endpoint: OperatorEndpoint,
    summary: Option<SessionSummary>,
    summaries_seen: u32,
    steps: Vec<RunConfig>,
    pointer: i32,
    awaiting_validation: bool,
    last_error: Option<String>,
}

impl OperatorConsole {
    pub fn new(endpoint: OperatorEndpoint) -> Self {
        Self {
            endpoint,
            summary: None,
            summaries_seen: 0,
            steps: Vec::new(),
            pointer: 0,
            awaiting_validation: false,
            last_error: None,
        }
    }

    /// Applies every report the headset has sent since the last pump.
    pub fn pump(&mut self) -> Result<(), WireError> {
        while let Some(report) = self.endpoint.try_recv()? {
            self.apply(report);
        }
        Ok(())
    }

    fn apply(&mut self, report: FromHeadset) {
        match report {
            FromHeadset::Summary(summary) => {
                self.summaries_seen += 1;
                self.steps = generate_run_configs(summary.participant_id, summary.left_handed);
                if self.summaries_seen == 1 {
                    self.pointer = summary.index;
                }
                self.awaiting_validation = summary.stage == SessionStage::Validation;
                self.last_error = None;
                self.summary = Some(summary);
            }
            FromHeadset::InvalidOperation { reason } => {
                warn!(%reason, "headset rejected a command");
                self.last_error = Some(reason);
            }
            FromHeadset::UnexpectedError { message } => {
                error!(%message, "headset reported an error");
                self.last_error = Some(message);
            }
            FromHeadset::UserError { message } => {
                warn!(%message, "participant broke protocol");
            }
            FromHeadset::RequestTrialValidation => self.awaiting_validation = true,
        }
    }

    pub fn summary(&self) -> Option<&SessionSummary> {
        self.summary.as_ref()
    }

    pub fn summaries_seen(&self) -> u32 {
        self.summaries_seen
    }

    pub fn steps(&self) -> &[RunConfig] {
        &self.steps
    }

    pub fn pointer(&self) -> i32 {
        self.pointer
    }

    pub fn awaiting_validation(&self) -> bool {
        self.awaiting_validation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Moves the step cursor, clamped to the schedule.
    pub fn point_at(&mut self, index: i32) {
        let last = self.steps.len().saturating_sub(1) as i32;
        self.pointer = index.clamp(0, last);
    }

    pub fn point_next(&mut self) {
        self.point_at(self.pointer + 1);
    }

    pub fn point_previous(&mut self) {
        self.point_at(self.pointer - 1);
    }

    /// First schedule index whose done mark is still clear.
    pub fn next_undone_step(&self) -> Option<i32> {
        let summary = self.summary?;
        (0..self.steps.len() as i32).find(|&index| !get_bool(summary.done_bitmap, index))
    }

    pub fn set_participant_id(&self, participant_id: i32) -> Result<(), WireError> {
        self.endpoint
            .send(&ToHeadset::SetParticipantId { participant_id })
    }

    pub fn set_left_handed(&self, left_handed: bool) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::SetLeftHanded { left_handed })
    }

    /// Marks or unmarks the pointed step in the headset's done bitmap.
    pub fn mark_pointed_step(&self, done: bool) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::SetStepIsDone {
            index: self.pointer,
            done,
        })
    }

    pub fn save_prefs(&self) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::SavePrefs)
    }

    pub fn refresh_summary(&self) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::RefreshSummary)
    }

    pub fn prepare_pointed_step(&self) -> Result<(), WireError> {
        self.endpoint
            .send(&ToHeadset::PrepareNextStep { index: self.pointer })
    }

    pub fn start_pointed_step(&self) -> Result<(), WireError> {
        self.endpoint
            .send(&ToHeadset::StartNextStep { index: self.pointer })
    }

    pub fn finish_pointed_training(&self) -> Result<(), WireError> {
        self.endpoint
            .send(&ToHeadset::FinishTrainingStep { index: self.pointer })
    }

    /// Accepts the block awaiting a verdict. Clears the local flag right
    /// away so the verdict buttons cannot fire twice on one request.
    pub fn validate_trial(&mut self) -> Result<(), WireError> {
        self.awaiting_validation = false;
        self.endpoint.send(&ToHeadset::ValidateTrial)
    }

    pub fn invalidate_trial(&mut self) -> Result<(), WireError> {
        self.awaiting_validation = false;
        self.endpoint.send(&ToHeadset::InvalidateTrial)
    }

    pub fn set_path_ref_height(&self) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::SetPathRefHeight)
    }

    pub fn place_track_and_light(&self) -> Result<(), WireError> {
        self.endpoint.send(&ToHeadset::PlaceTrackAndLight)
    }

    pub fn toggle_adjustment_text(&self, show: bool) -> Result<(), WireError> {
        self.endpoint
            .send(&ToHeadset::ToggleHeadsetAdjustmentText { show })
    }

    /// Text rows of the schedule table, one per step. The cursor row starts
    /// with `>`, done steps carry an `x` mark and the headset's current step
    /// is suffixed with its stage.
    pub fn schedule_lines(&self) -> Vec<String> {
        let Some(summary) = self.summary else {
            return Vec::new();
        };
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let index = i as i32;
                let cursor = if index == self.pointer { '>' } else { ' ' };
                let done = if get_bool(summary.done_bitmap, index) {
                    'x'
                } else {
                    ' '
                };
                let mut line = format!("{cursor} [{done}] {i:2}  {}", step.label());
                if index == summary.index {
                    line.push_str("  <- ");
                    line.push_str(summary.stage.name());
                }
                line
            })
            .collect()
    }
}
