//! End-to-end checks of the operator command gate: every command crosses the
//! wire codec, the gate answers with summaries or rejections, and the
//! experiment machine underneath moves only when the gate lets it.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::Duration;

use ambex_core::bitmap::get_bool;
use ambex_core::{
    CircleDirection, Context, FrameSnapshot, Handedness, ReferenceFrame, RunConfig, SelectionData,
    TargetSizeVariant, Vec2,
};
use ambex_experiment::rig::{FrameSampler, Metronome, TargetsService, TrackService};
use ambex_experiment::{ExperimentConfig, ExperimentManager};
use ambex_net::{
    FromHeadset, OperatorEndpoint, SessionStage, SessionSummary, ToHeadset, channel_pair,
};
use ambex_session::HeadsetProcess;
use ambex_timing::VirtualClock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

/// Just enough scene state for the gate scenarios; the experiment crate's
/// own tests cover the full choreography.
#[derive(Debug, Default)]
struct RigState {
    active_target: Option<usize>,
    last_selection: Option<SelectionData>,
    track_placements: usize,
    path_reference_refreshes: usize,
    adjustment_text_visible: bool,
    snapshot: FrameSnapshot,
}

#[derive(Clone, Default)]
struct GateRig(Rc<RefCell<RigState>>);

impl GateRig {
    fn state(&self) -> Ref<'_, RigState> {
        self.0.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, RigState> {
        self.0.borrow_mut()
    }
}

impl TargetsService for GateRig {
    fn set_handedness(&mut self, _hand: Handedness) {}

    fn set_reference_frame(&mut self, _frame: ReferenceFrame) {}

    fn set_target_size(&mut self, _size: TargetSizeVariant) {}

    fn show_board(&mut self) {}

    fn hide_board(&mut self) {}

    fn ensure_targets_shown(&mut self) {}

    fn ensure_targets_hidden(&mut self) {}

    fn ensure_no_active_targets(&mut self) {
        self.0.borrow_mut().active_target = None;
    }

    fn activate_target(&mut self, index: usize) {
        self.0.borrow_mut().active_target = Some(index);
    }

    fn set_selector_projection(&mut self, _visible: bool) {}

    fn last_selection(&self) -> Option<SelectionData> {
        self.0.borrow().last_selection
    }

    fn refresh_path_reference(&mut self) {
        self.0.borrow_mut().path_reference_refreshes += 1;
    }

    fn commit_path_reference_height(&mut self) {}

    fn set_adjustment_text_visible(&mut self, visible: bool) {
        self.0.borrow_mut().adjustment_text_visible = visible;
    }
}

impl TrackService for GateRig {
    fn configure(&mut self, _context: Context) {}

    fn set_enabled(&mut self, _enabled: bool) {}

    fn set_arrow_direction(&mut self, _direction: CircleDirection) {}

    fn set_arrow_visible(&mut self, _visible: bool) {}

    fn place_forward_from_headset(&mut self) {
        self.0.borrow_mut().track_placements += 1;
    }
}

impl Metronome for GateRig {
    fn set_tempo(&mut self, _bpm: u32) {}

    fn set_enabled(&mut self, _enabled: bool) {}
}

impl FrameSampler for GateRig {
    fn sample(&self) -> FrameSnapshot {
        self.0.borrow().snapshot
    }
}

struct Gate {
    rig: GateRig,
    clock: VirtualClock,
    dir: TempDir,
    operator: OperatorEndpoint,
    process: HeadsetProcess<GateRig, GateRig, GateRig, GateRig, VirtualClock, StdRng>,
}

impl Gate {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig {
            data_dir: dir.path().to_path_buf(),
            ..ExperimentConfig::default()
        };
        let rig = GateRig::default();
        let clock = VirtualClock::new();
        let manager = ExperimentManager::new(
            config,
            rig.clone(),
            rig.clone(),
            rig.clone(),
            rig.clone(),
            clock.clone(),
            StdRng::seed_from_u64(13),
        );
        let (operator, headset) = channel_pair();
        let process = HeadsetProcess::new(dir.path(), manager, headset).expect("headset process");
        Self {
            rig,
            clock,
            dir,
            operator,
            process,
        }
    }

    /// Sends one command and runs one frame of the session loop.
    fn send(&mut self, command: ToHeadset) {
        self.operator.send(&command).expect("send");
        self.process.tick().expect("tick");
    }

    fn reports(&mut self) -> Vec<FromHeadset> {
        let mut out = Vec::new();
        while let Some(report) = self.operator.try_recv().expect("recv") {
            out.push(report);
        }
        out
    }

    fn last_summary(&mut self) -> SessionSummary {
        let reports = self.reports();
        *summaries_in(&reports).last().expect("no summary in the queue")
    }

    /// Drains the operator queue expecting one rejection and nothing else.
    fn sole_rejection(&mut self) -> String {
        let reports = self.reports();
        match reports.as_slice() {
            [FromHeadset::InvalidOperation { reason }] => reason.clone(),
            other => panic!("expected a single rejection, got {other:?}"),
        }
    }

    /// One complete selection through the gated callbacks.
    fn select(&mut self, index: i32) {
        self.rig.state_mut().last_selection = Some(selection(index));
        let experiment = self.process.experiment();
        experiment.on_selector_entered_target_zone();
        experiment.on_selector_exited_target_zone();
    }

    fn complete_block(&mut self) {
        for index in [0, 3, 6, 2, 5, 1, 4] {
            self.select(index);
        }
    }

    /// Ticks with small real sleeps until the gate reaches `stage`,
    /// typically while a background flush finishes.
    fn wait_for_stage(&mut self, stage: SessionStage) {
        for _ in 0..400 {
            if self.process.stage() == stage {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
            self.clock.advance(Duration::from_millis(2));
            self.process.tick().expect("tick");
        }
        panic!("timed out waiting for stage {stage:?}");
    }
}

fn summaries_in(reports: &[FromHeadset]) -> Vec<SessionSummary> {
    reports
        .iter()
        .filter_map(|report| match report {
            FromHeadset::Summary(summary) => Some(*summary),
            _ => None,
        })
        .collect()
}

fn selection(index: i32) -> SelectionData {
    SelectionData {
        active_target_index: index,
        target_size: 0.03,
        target_absolute_position: Vec2::new(0.1, 0.2),
        selection_absolute_position: Vec2::new(0.11, 0.19),
        selection_local_position: Vec2::new(0.01, -0.01),
        success: true,
    }
}

fn find(steps: &[RunConfig], pred: impl Fn(&RunConfig) -> bool) -> i32 {
    steps
        .iter()
        .position(pred)
        .expect("schedule lacks the wanted step") as i32
}

#[test]
fn boot_announces_the_default_participant() {
    let mut gate = Gate::new();
    let reports = gate.reports();
    assert_eq!(reports.len(), 1);
    let FromHeadset::Summary(summary) = &reports[0] else {
        panic!("expected a summary, got {reports:?}");
    };
    assert_eq!(summary.participant_id, 1);
    assert!(!summary.left_handed);
    assert_eq!(summary.done_bitmap, 0);
    assert_eq!(summary.index, -1);
    assert_eq!(summary.stage, SessionStage::Idle);
    assert_eq!(gate.process.steps().len(), 23);
}

#[test]
fn commands_that_need_a_running_step_bounce_in_idle() {
    let mut gate = Gate::new();
    gate.reports();

    gate.send(ToHeadset::ValidateTrial);
    assert_eq!(
        gate.sole_rejection(),
        "Validate/invalidate needs a trial awaiting a verdict"
    );

    gate.send(ToHeadset::StartNextStep { index: 0 });
    assert_eq!(gate.sole_rejection(), "Cannot start, no step is prepared");

    gate.send(ToHeadset::FinishTrainingStep { index: 0 });
    assert_eq!(
        gate.sole_rejection(),
        "Can only stop the training that is running"
    );

    assert_eq!(gate.process.stage(), SessionStage::Idle);
    assert_eq!(gate.process.step_index(), -1);
}

#[test]
fn a_break_step_runs_to_done_through_the_gate() {
    let mut gate = Gate::new();
    gate.reports();
    let brk = find(gate.process.steps(), |step| step.is_break);

    gate.send(ToHeadset::PrepareNextStep { index: brk });
    let summary = gate.last_summary();
    assert_eq!(summary.stage, SessionStage::Preparing);
    assert_eq!(summary.index, brk);

    // a break finishes the moment it starts, so one command yields the
    // Running summary and then the Idle one with the done mark
    gate.send(ToHeadset::StartNextStep { index: brk });
    let summaries = summaries_in(&gate.reports());
    assert_eq!(
        summaries.first().map(|s| s.stage),
        Some(SessionStage::Running)
    );
    let last = summaries.last().unwrap();
    assert_eq!(last.stage, SessionStage::Idle);
    assert!(get_bool(last.done_bitmap, brk));
}

#[test]
fn prepare_is_sticky_and_bounds_checked() {
    let mut gate = Gate::new();
    gate.reports();

    gate.send(ToHeadset::PrepareNextStep { index: 99 });
    assert_eq!(gate.sole_rejection(), "No step with index 99");

    gate.send(ToHeadset::PrepareNextStep { index: 0 });
    assert_eq!(gate.last_summary().stage, SessionStage::Preparing);

    gate.send(ToHeadset::PrepareNextStep { index: 1 });
    assert_eq!(
        gate.sole_rejection(),
        "Cannot prepare when another step was prepared"
    );

    // re-preparing the same step is how the operator refreshes the board
    gate.send(ToHeadset::PrepareNextStep { index: 0 });
    let summary = gate.last_summary();
    assert_eq!(summary.stage, SessionStage::Preparing);
    assert_eq!(summary.index, 0);
}

#[test]
fn start_must_match_the_prepared_step() {
    let mut gate = Gate::new();
    gate.reports();

    gate.send(ToHeadset::PrepareNextStep { index: 2 });
    gate.reports();

    gate.send(ToHeadset::StartNextStep { index: 3 });
    assert_eq!(
        gate.sole_rejection(),
        "Cannot start a step that has not been prepared"
    );
    assert_eq!(gate.process.stage(), SessionStage::Preparing);

    gate.send(ToHeadset::StartNextStep { index: 2 });
    assert_eq!(gate.last_summary().stage, SessionStage::Running);
}

#[test]
fn finish_training_marks_done_and_advances_the_index() {
    let mut gate = Gate::new();
    gate.reports();
    let training = find(gate.process.steps(), |step| step.is_any_training());

    gate.send(ToHeadset::PrepareNextStep { index: training });
    gate.send(ToHeadset::StartNextStep { index: training });
    gate.reports();

    gate.send(ToHeadset::FinishTrainingStep { index: training + 1 });
    assert_eq!(
        gate.sole_rejection(),
        "Can only stop the training that is running"
    );

    gate.send(ToHeadset::FinishTrainingStep { index: training });
    let summary = gate.last_summary();
    assert_eq!(summary.stage, SessionStage::Idle);
    assert_eq!(summary.index, training + 1);
    assert!(get_bool(summary.done_bitmap, training));
    assert_eq!(gate.process.step_index(), training + 1);
}

#[test]
fn identity_changes_are_idle_only() {
    let mut gate = Gate::new();
    gate.reports();

    gate.send(ToHeadset::SetParticipantId { participant_id: 5 });
    let summary = gate.last_summary();
    assert_eq!(summary.participant_id, 5);
    assert_eq!(summary.index, -1);

    gate.send(ToHeadset::SetLeftHanded { left_handed: true });
    assert!(gate.last_summary().left_handed);
    assert!(
        gate.process
            .steps()
            .iter()
            .all(|step| step.participant_id == 5 && step.left_handed)
    );

    gate.send(ToHeadset::PrepareNextStep { index: 0 });
    gate.reports();

    gate.send(ToHeadset::SetParticipantId { participant_id: 2 });
    assert_eq!(
        gate.sole_rejection(),
        "Cannot change participant id when a step is prepared or running"
    );
    gate.send(ToHeadset::SetLeftHanded { left_handed: false });
    assert_eq!(
        gate.sole_rejection(),
        "Cannot change hands when a step is prepared or running"
    );
    gate.send(ToHeadset::SetStepIsDone { index: 0, done: true });
    assert_eq!(
        gate.sole_rejection(),
        "Can change step done marks only while idle"
    );

    assert_eq!(gate.process.prefs().participant_id, 5);
    assert!(gate.process.prefs().left_handed);
}

#[test]
fn done_marks_survive_a_save_and_a_participant_switch() {
    let mut gate = Gate::new();
    gate.reports();
    let trial = find(gate.process.steps(), |step| step.is_trial());

    gate.send(ToHeadset::SetStepIsDone {
        index: trial,
        done: true,
    });
    assert!(get_bool(gate.last_summary().done_bitmap, trial));

    gate.send(ToHeadset::SavePrefs);
    assert!(gate.dir.path().join("1_prefs").is_file());

    gate.send(ToHeadset::SetParticipantId { participant_id: 2 });
    assert_eq!(gate.last_summary().done_bitmap, 0);

    gate.send(ToHeadset::SetParticipantId { participant_id: 1 });
    let summary = gate.last_summary();
    assert_eq!(summary.participant_id, 1);
    assert!(get_bool(summary.done_bitmap, trial));
}

#[test]
fn repeating_steps_reload_unmarked() {
    let mut gate = Gate::new();
    gate.reports();
    let rehearsal = find(gate.process.steps(), |step| step.is_metronome_training);

    gate.send(ToHeadset::SetStepIsDone {
        index: rehearsal,
        done: true,
    });
    gate.send(ToHeadset::SavePrefs);
    gate.send(ToHeadset::SetParticipantId { participant_id: 9 });
    gate.send(ToHeadset::SetParticipantId { participant_id: 1 });
    assert!(!get_bool(gate.last_summary().done_bitmap, rehearsal));
}

#[test]
fn a_trial_block_needs_a_verdict_before_anything_else() {
    let mut gate = Gate::new();
    gate.reports();
    let trial = find(gate.process.steps(), |step| {
        step.is_trial() && step.context == Context::Standing
    });

    gate.send(ToHeadset::PrepareNextStep { index: trial });
    gate.send(ToHeadset::StartNextStep { index: trial });
    gate.reports();

    gate.clock.advance(Duration::from_secs(2));
    gate.process.tick().expect("tick");
    assert_eq!(gate.rig.state().active_target, Some(0));

    gate.complete_block();
    gate.wait_for_stage(SessionStage::Validation);

    let reports = gate.reports();
    assert!(
        reports
            .iter()
            .any(|report| matches!(report, FromHeadset::RequestTrialValidation))
    );
    assert_eq!(
        summaries_in(&reports).last().map(|s| s.stage),
        Some(SessionStage::Validation)
    );

    gate.send(ToHeadset::PrepareNextStep { index: trial });
    assert_eq!(gate.sole_rejection(), "Cannot prepare while a step is running");

    gate.send(ToHeadset::ValidateTrial);
    assert_eq!(gate.last_summary().stage, SessionStage::Running);

    gate.send(ToHeadset::ValidateTrial);
    assert_eq!(
        gate.sole_rejection(),
        "Validate/invalidate needs a trial awaiting a verdict"
    );
}

#[test]
fn pass_through_commands_are_legal_in_any_stage() {
    let mut gate = Gate::new();
    gate.reports();

    gate.send(ToHeadset::PlaceTrackAndLight);
    gate.send(ToHeadset::SetPathRefHeight);
    gate.send(ToHeadset::ToggleHeadsetAdjustmentText { show: true });
    assert!(gate.reports().is_empty());
    assert_eq!(gate.rig.state().track_placements, 1);
    assert_eq!(gate.rig.state().path_reference_refreshes, 1);
    assert!(gate.rig.state().adjustment_text_visible);

    gate.send(ToHeadset::PrepareNextStep { index: 0 });
    gate.reports();

    gate.send(ToHeadset::PlaceTrackAndLight);
    gate.send(ToHeadset::ToggleHeadsetAdjustmentText { show: false });
    assert!(gate.reports().is_empty());
    assert_eq!(gate.rig.state().track_placements, 2);
    assert!(!gate.rig.state().adjustment_text_visible);
    assert_eq!(gate.process.stage(), SessionStage::Preparing);
}
