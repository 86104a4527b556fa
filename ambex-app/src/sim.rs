//! Scripted stand-ins for the VR scene and the participant.
//!
//! The demo binary runs the full two-process session without a headset:
//! [`SimRig`] plays the scene objects the experiment machine drives, and
//! [`SimParticipant`] produces the geometry events a compliant participant
//! would cause, with seeded jitter on reach times and touch points.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::Duration;

use ambex_core::{
    CircleDirection, Context, FrameSnapshot, Handedness, ReferenceFrame, SelectionData,
    TARGETS_COUNT, TargetDiameters, TargetSizeVariant, Vec2, Vec3,
};
use ambex_experiment::rig::{FrameSampler, Metronome, TargetsService, TrackService};
use ambex_experiment::{ExperimentManager, ExperimentState};
use ambex_session::HeadsetProcess;
use ambex_timing::VirtualClock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub type SimExperiment = ExperimentManager<SimRig, SimRig, SimRig, SimRig, VirtualClock, StdRng>;
pub type SimHeadset = HeadsetProcess<SimRig, SimRig, SimRig, SimRig, VirtualClock, StdRng>;

/// Scene state mutated by the experiment machine, observed by the driver.
#[derive(Debug, Default)]
pub struct SimScene {
    pub handedness: Option<Handedness>,
    pub reference_frame: Option<ReferenceFrame>,
    pub target_size: Option<TargetSizeVariant>,
    pub board_visible: bool,
    pub targets_visible: bool,
    pub active_target: Option<usize>,
    pub selector_projection_on: bool,
    pub adjustment_text_visible: bool,
    pub selection: Option<SelectionData>,

    pub track_context: Option<Context>,
    pub track_enabled: bool,
    pub arrow_visible: bool,
    pub arrow_direction: Option<CircleDirection>,

    pub metronome_tempo: u32,
    pub metronome_on: bool,

    pub snapshot: FrameSnapshot,
}

/// One shared handle passed to the machine as all four collaborators.
#[derive(Clone, Default)]
pub struct SimRig(Rc<RefCell<SimScene>>);

impl SimRig {
    pub fn scene(&self) -> Ref<'_, SimScene> {
        self.0.borrow()
    }

    fn scene_mut(&self) -> RefMut<'_, SimScene> {
        self.0.borrow_mut()
    }

    fn record_selection(&self, selection: SelectionData) {
        self.scene_mut().selection = Some(selection);
    }

    /// Synthesizes the tracked poses for the current session time: a slow
    /// amble along the track with a little head bob and palm sway, so the
    /// movement log carries plausible numbers instead of zeros.
    pub fn drive_pose(&self, now: Duration) {
        let t = now.as_secs_f32();
        let along = 0.9 * t;
        let mut scene = self.scene_mut();
        let snapshot = &mut scene.snapshot;

        snapshot.head.position = Vec3::new(0.02 * (1.3 * t).sin(), 1.70 + 0.015 * (2.6 * t).sin(), along);
        snapshot.head.forward = Vec3::new(0.0, 0.0, 1.0);
        snapshot.head.up = Vec3::new(0.0, 1.0, 0.0);
        snapshot.neck_base.position = Vec3::new(snapshot.head.position.x, 1.52, along);
        snapshot.dominant_palm_center.position =
            Vec3::new(0.25, 1.20 + 0.05 * (3.0 * t).sin(), along + 0.35);
        snapshot.dominant_index_tip.position =
            Vec3::new(0.25, 1.20 + 0.05 * (3.0 * t).sin(), along + 0.43);
        snapshot.weak_palm_center.position = Vec3::new(-0.25, 1.15, along + 0.30);
        snapshot.all_targets.position = Vec3::new(-0.25, 1.15, along + 0.32);
        snapshot.selector_projection = Vec2::new(0.01 * (4.0 * t).sin(), 0.01 * (3.1 * t).cos());
        snapshot.selector_distance_to_board_plane = 0.10 + 0.08 * (2.0 * t).sin().abs();
    }
}

impl TargetsService for SimRig {
    fn set_handedness(&mut self, hand: Handedness) {
        self.scene_mut().handedness = Some(hand);
    }

    fn set_reference_frame(&mut self, frame: ReferenceFrame) {
        self.scene_mut().reference_frame = Some(frame);
    }

    fn set_target_size(&mut self, size: TargetSizeVariant) {
        self.scene_mut().target_size = Some(size);
    }

    fn show_board(&mut self) {
        self.scene_mut().board_visible = true;
    }

    fn hide_board(&mut self) {
        self.scene_mut().board_visible = false;
    }

    fn ensure_targets_shown(&mut self) {
        self.scene_mut().targets_visible = true;
    }

    fn ensure_targets_hidden(&mut self) {
        self.scene_mut().targets_visible = false;
    }

    fn ensure_no_active_targets(&mut self) {
        self.scene_mut().active_target = None;
    }

    fn activate_target(&mut self, index: usize) {
        self.scene_mut().active_target = Some(index);
    }

    fn set_selector_projection(&mut self, visible: bool) {
        self.scene_mut().selector_projection_on = visible;
    }

    fn last_selection(&self) -> Option<SelectionData> {
        self.scene().selection
    }

    fn refresh_path_reference(&mut self) {}

    fn commit_path_reference_height(&mut self) {}

    fn set_adjustment_text_visible(&mut self, visible: bool) {
        self.scene_mut().adjustment_text_visible = visible;
    }
}

impl TrackService for SimRig {
    fn configure(&mut self, context: Context) {
        self.scene_mut().track_context = Some(context);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.scene_mut().track_enabled = enabled;
    }

    fn set_arrow_direction(&mut self, direction: CircleDirection) {
        self.scene_mut().arrow_direction = Some(direction);
    }

    fn set_arrow_visible(&mut self, visible: bool) {
        self.scene_mut().arrow_visible = visible;
    }

    fn place_forward_from_headset(&mut self) {}
}

impl Metronome for SimRig {
    fn set_tempo(&mut self, bpm: u32) {
        self.scene_mut().metronome_tempo = bpm;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.scene_mut().metronome_on = enabled;
    }
}

impl FrameSampler for SimRig {
    fn sample(&self) -> FrameSnapshot {
        self.scene().snapshot
    }
}

/// Scripted participant: reaches for whichever target lights up, enters the
/// track when awaited and walks rehearsal laps at a steady pace.
pub struct SimParticipant {
    rng: StdRng,
    last_active: Option<usize>,
    selection_due: Option<Duration>,
    track_event_due: Option<Duration>,
}

impl SimParticipant {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            last_active: None,
            selection_due: None,
            track_event_due: None,
        }
    }

    /// One frame of behavior, keyed off what the machine currently awaits.
    pub fn act(&mut self, now: Duration, rig: &SimRig, experiment: &mut SimExperiment) {
        match experiment.state() {
            ExperimentState::SelectingTargetsStanding
            | ExperimentState::SelectingTargetsWalking => {
                self.track_event_due = None;
                self.reach_for_targets(now, rig, experiment);
            }
            ExperimentState::AwaitingParticipantEnterTrack => {
                self.clear_selection_intent();
                let due = self.track_event_in(now, 800..1_500);
                if now >= due {
                    self.track_event_due = None;
                    experiment.on_participant_entered_track(false);
                }
            }
            ExperimentState::WalkingWithMetronomeTraining => {
                self.clear_selection_intent();
                let due = self.track_event_in(now, 3_000..5_000);
                if now >= due {
                    self.track_event_due = None;
                    experiment.on_participant_finished_track();
                }
            }
            _ => {
                self.clear_selection_intent();
                self.track_event_due = None;
            }
        }
    }

    fn clear_selection_intent(&mut self) {
        self.last_active = None;
        self.selection_due = None;
    }

    fn track_event_in(&mut self, now: Duration, millis: std::ops::Range<u64>) -> Duration {
        match self.track_event_due {
            Some(due) => due,
            None => {
                let due = now + Duration::from_millis(self.rng.random_range(millis));
                self.track_event_due = Some(due);
                due
            }
        }
    }

    fn reach_for_targets(&mut self, now: Duration, rig: &SimRig, experiment: &mut SimExperiment) {
        let active = rig.scene().active_target;
        if active != self.last_active {
            self.last_active = active;
            self.selection_due = active
                .map(|_| now + Duration::from_millis(self.rng.random_range(350..650)));
        }
        if let (Some(due), Some(index)) = (self.selection_due, active) {
            if now >= due {
                self.selection_due = None;
                let diameter = rig
                    .scene()
                    .target_size
                    .map_or(0.03, |size| TargetDiameters::default().diameter_of(size));
                rig.record_selection(self.touch(index, diameter));
                experiment.on_selector_entered_target_zone();
                experiment.on_selector_exited_target_zone();
            }
        }
    }

    /// A touch near the target's center; one in twenty lands outside.
    fn touch(&mut self, index: usize, target_size: f32) -> SelectionData {
        let angle = index as f32 / TARGETS_COUNT as f32 * std::f32::consts::TAU;
        let target = Vec2::new(0.15 * angle.sin(), 0.15 * angle.cos());
        let miss = self.rng.random_bool(0.05);
        let spread = if miss { 0.025 } else { 0.006 };
        let dx = self.rng.random_range(-spread..spread);
        let dy = self.rng.random_range(-spread..spread);
        SelectionData {
            active_target_index: index as i32,
            target_size,
            target_absolute_position: target,
            selection_absolute_position: Vec2::new(target.x + dx, target.y + dy),
            selection_local_position: Vec2::new(dx, dy),
            success: !miss,
        }
    }
}
