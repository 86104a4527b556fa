//! Interfaces of the headset-side collaborators the state machine drives.
//!
//! The machine never reaches into scene objects itself; everything it can
//! observe or move sits behind these traits, which keeps the core testable
//! without any VR runtime.

use ambex_core::{
    CircleDirection, Context, FrameSnapshot, Handedness, ReferenceFrame, SelectionData,
    TargetSizeVariant,
};

/// Target board service: the disc of selectable targets plus the board UI.
pub trait TargetsService {
    fn set_handedness(&mut self, hand: Handedness);
    fn set_reference_frame(&mut self, frame: ReferenceFrame);
    fn set_target_size(&mut self, size: TargetSizeVariant);
    /// Shows or hides the whole board anchor (targets keep their own flag).
    fn show_board(&mut self);
    fn hide_board(&mut self);
    fn ensure_targets_shown(&mut self);
    fn ensure_targets_hidden(&mut self);
    fn ensure_no_active_targets(&mut self);
    fn activate_target(&mut self, index: usize);
    fn set_selector_projection(&mut self, visible: bool);
    /// Record of the most recent completed entry into the active target.
    fn last_selection(&self) -> Option<SelectionData>;
    /// Re-anchors the path-referenced frame to the participant's current pose.
    fn refresh_path_reference(&mut self);
    /// Fixes the path-referenced board height chosen during calibration.
    fn commit_path_reference_height(&mut self);
    fn set_adjustment_text_visible(&mut self, visible: bool);
}

/// Walking track service: borders, entry/exit sensing and the direction arrow.
pub trait TrackService {
    /// Shapes the track for the given context (straight lane or circle).
    fn configure(&mut self, context: Context);
    /// Enabled tracks show their borders and report participant events.
    fn set_enabled(&mut self, enabled: bool);
    fn set_arrow_direction(&mut self, direction: CircleDirection);
    fn set_arrow_visible(&mut self, visible: bool);
    /// Re-places track and light in front of the headset's current pose.
    fn place_forward_from_headset(&mut self);
}

pub trait Metronome {
    fn set_tempo(&mut self, bpm: u32);
    fn set_enabled(&mut self, enabled: bool);
}

/// Pose source for the high-frequency movement log.
pub trait FrameSampler {
    fn sample(&self) -> FrameSnapshot;
}
