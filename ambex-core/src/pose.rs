use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Unit quaternion, identity by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Position and orientation of one tracked transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub rotation: Quat,
}

/// Everything a high-frequency log row needs from one rendered frame.
///
/// The pose fields follow the column order of the movement CSV; the
/// scalar tail mirrors the selector-versus-board measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameSnapshot {
    pub track: Pose,
    pub walking_direction: Pose,
    pub head: Pose,
    pub neck_base: Pose,
    pub dominant_palm_center: Pose,
    pub dominant_index_tip: Pose,
    pub weak_palm_center: Pose,
    pub all_targets: Pose,
    pub active_target: Pose,
    pub selector_projection: Vec2,
    pub active_target_projection: Vec2,
    pub selector_inside_collider: bool,
    pub selector_distance_to_board_plane: f32,
}

impl FrameSnapshot {
    /// Poses in movement-log column order.
    pub fn poses(&self) -> [&Pose; 9] {
        [
            &self.track,
            &self.walking_direction,
            &self.head,
            &self.neck_base,
            &self.dominant_palm_center,
            &self.dominant_index_tip,
            &self.weak_palm_center,
            &self.all_targets,
            &self.active_target,
        ]
    }
}
