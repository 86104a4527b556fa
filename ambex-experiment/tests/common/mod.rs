#![allow(dead_code)]

use std::cell::{Ref, RefCell, RefMut};
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use ambex_core::{
    CircleDirection, Context, FrameSnapshot, Handedness, ReferenceFrame, RunConfig, SelectionData,
    TargetDiameters, TargetSizeVariant, Vec2,
};
use ambex_experiment::rig::{FrameSampler, Metronome, TargetsService, TrackService};
use ambex_experiment::{ExperimentConfig, ExperimentManager, ExperimentNotice};
use ambex_timing::VirtualClock;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

/// Scene and hardware state observed by the tests, mutated by the machine.
#[derive(Debug, Default)]
pub struct RigState {
    pub handedness: Option<Handedness>,
    pub reference_frame: Option<ReferenceFrame>,
    pub target_size: Option<TargetSizeVariant>,
    pub board_visible: bool,
    pub targets_visible: bool,
    pub active_target: Option<usize>,
    pub activation_history: Vec<usize>,
    pub selector_projection_on: bool,
    pub last_selection: Option<SelectionData>,
    pub path_reference_refreshes: usize,
    pub height_commits: usize,
    pub adjustment_text_visible: bool,

    pub track_context: Option<Context>,
    pub track_enabled: bool,
    pub arrow_visible: bool,
    pub arrow_direction: Option<CircleDirection>,
    pub track_placements: usize,

    pub metronome_tempo: Option<u32>,
    pub metronome_on: bool,

    pub snapshot: FrameSnapshot,
}

/// One shared handle passed to the machine as all four collaborators.
#[derive(Clone, Default)]
pub struct SharedRig(Rc<RefCell<RigState>>);

impl SharedRig {
    pub fn state(&self) -> Ref<'_, RigState> {
        self.0.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, RigState> {
        self.0.borrow_mut()
    }
}

impl TargetsService for SharedRig {
    fn set_handedness(&mut self, hand: Handedness) {
        self.0.borrow_mut().handedness = Some(hand);
    }

    fn set_reference_frame(&mut self, frame: ReferenceFrame) {
        self.0.borrow_mut().reference_frame = Some(frame);
    }

    fn set_target_size(&mut self, size: TargetSizeVariant) {
        self.0.borrow_mut().target_size = Some(size);
    }

    fn show_board(&mut self) {
        self.0.borrow_mut().board_visible = true;
    }

    fn hide_board(&mut self) {
        self.0.borrow_mut().board_visible = false;
    }

    fn ensure_targets_shown(&mut self) {
        self.0.borrow_mut().targets_visible = true;
    }

    fn ensure_targets_hidden(&mut self) {
        self.0.borrow_mut().targets_visible = false;
    }

    fn ensure_no_active_targets(&mut self) {
        self.0.borrow_mut().active_target = None;
    }

    fn activate_target(&mut self, index: usize) {
        let mut state = self.0.borrow_mut();
        state.active_target = Some(index);
        state.activation_history.push(index);
    }

    fn set_selector_projection(&mut self, visible: bool) {
        self.0.borrow_mut().selector_projection_on = visible;
    }

    fn last_selection(&self) -> Option<SelectionData> {
        self.0.borrow().last_selection
    }

    fn refresh_path_reference(&mut self) {
        self.0.borrow_mut().path_reference_refreshes += 1;
    }

    fn commit_path_reference_height(&mut self) {
        self.0.borrow_mut().height_commits += 1;
    }

    fn set_adjustment_text_visible(&mut self, visible: bool) {
        self.0.borrow_mut().adjustment_text_visible = visible;
    }
}

impl TrackService for SharedRig {
    fn configure(&mut self, context: Context) {
        self.0.borrow_mut().track_context = Some(context);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().track_enabled = enabled;
    }

    fn set_arrow_direction(&mut self, direction: CircleDirection) {
        self.0.borrow_mut().arrow_direction = Some(direction);
    }

    fn set_arrow_visible(&mut self, visible: bool) {
        self.0.borrow_mut().arrow_visible = visible;
    }

    fn place_forward_from_headset(&mut self) {
        self.0.borrow_mut().track_placements += 1;
    }
}

impl Metronome for SharedRig {
    fn set_tempo(&mut self, bpm: u32) {
        self.0.borrow_mut().metronome_tempo = Some(bpm);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.0.borrow_mut().metronome_on = enabled;
    }
}

impl FrameSampler for SharedRig {
    fn sample(&self) -> FrameSnapshot {
        self.0.borrow().snapshot
    }
}

pub type TestManager =
    ExperimentManager<SharedRig, SharedRig, SharedRig, SharedRig, VirtualClock, StdRng>;

/// Machine plus the handles a scenario needs to drive and observe it.
pub struct Harness {
    pub rig: SharedRig,
    pub clock: VirtualClock,
    pub dir: TempDir,
    pub manager: TestManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_seed(7)
    }

    pub fn with_seed(seed: u64) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig {
            data_dir: dir.path().to_path_buf(),
            ..ExperimentConfig::default()
        };
        let rig = SharedRig::default();
        let clock = VirtualClock::new();
        let manager = ExperimentManager::new(
            config,
            rig.clone(),
            rig.clone(),
            rig.clone(),
            rig.clone(),
            clock.clone(),
            StdRng::seed_from_u64(seed),
        );
        Self {
            rig,
            clock,
            dir,
            manager,
        }
    }

    /// Moves time forward and runs one frame.
    pub fn advance(&mut self, delta: Duration) {
        self.clock.advance(delta);
        self.manager.tick();
    }

    /// Longest possible countdown is under two seconds in either context.
    pub fn fire_countdown(&mut self) {
        self.advance(Duration::from_secs(2));
    }

    /// One complete selection: the selector dips into the active target and
    /// leaves through the correct side. The reported size echoes whatever
    /// the machine last configured, as the real collision service does.
    pub fn select_target(&mut self, index: i32) {
        let diameter = {
            let state = self.rig.state();
            let size = state.target_size.expect("no target size configured");
            TargetDiameters::default().diameter_of(size)
        };
        self.rig.state_mut().last_selection = Some(selection(index, diameter, true));
        self.manager.on_selector_entered_target_zone();
        self.manager.on_selector_exited_target_zone();
    }

    /// Clears the whole seven-target lap of the current size block.
    pub fn complete_block(&mut self) {
        for index in [0, 3, 6, 2, 5, 1, 4] {
            self.select_target(index);
        }
    }

    /// Ticks with small real sleeps until `cond` holds, typically while a
    /// background flush finishes.
    pub fn wait_until(&mut self, what: &str, cond: impl Fn(&Self) -> bool) {
        for _ in 0..400 {
            if cond(self) {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
            self.advance(Duration::from_millis(2));
        }
        panic!("timed out waiting for {what}");
    }

    pub fn notices(&mut self) -> Vec<ExperimentNotice> {
        self.manager.take_notices()
    }

    pub fn selections_csv(&self, participant_id: i32) -> Vec<String> {
        data_lines(&self.dir.path().join(format!("{participant_id}_selections.csv")))
    }

    pub fn movement_csv(&self, participant_id: i32) -> Vec<String> {
        data_lines(&self.dir.path().join(format!("{participant_id}_highFrequency.csv")))
    }
}

pub fn selection(index: i32, target_size: f32, success: bool) -> SelectionData {
    SelectionData {
        active_target_index: index,
        target_size,
        target_absolute_position: Vec2::new(0.1, 0.2),
        selection_absolute_position: Vec2::new(0.11, 0.19),
        selection_local_position: Vec2::new(0.01, -0.01),
        success,
    }
}

/// Rows of a CSV file without its header line.
pub fn data_lines(path: &Path) -> Vec<String> {
    let text = fs::read_to_string(path).unwrap_or_else(|e| panic!("read {path:?}: {e}"));
    text.lines().skip(1).map(str::to_owned).collect()
}

/// None of the logged values contain commas, so a plain split is enough.
pub fn fields(line: &str) -> Vec<&str> {
    line.split(',').collect()
}

pub fn standing_trial(participant_id: i32) -> RunConfig {
    RunConfig::trial(
        participant_id,
        false,
        Context::Standing,
        ReferenceFrame::PalmReferenced,
    )
}

pub fn walking_trial(participant_id: i32) -> RunConfig {
    RunConfig::trial(
        participant_id,
        false,
        Context::Walking,
        ReferenceFrame::PalmPositionOnly,
    )
}

pub fn circle_trial(participant_id: i32) -> RunConfig {
    RunConfig::trial(
        participant_id,
        false,
        Context::Circle,
        ReferenceFrame::PathReferenced,
    )
}
