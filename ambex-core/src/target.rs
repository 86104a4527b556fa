use serde::{Deserialize, Serialize};

use crate::pose::Vec2;

/// Targets on the board. Odd so the diametric traversal closes.
pub const TARGETS_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSizeVariant {
    Small,
    Medium,
    Big,
    VeryBig,
}

impl TargetSizeVariant {
    pub const ALL: [TargetSizeVariant; 4] = [
        TargetSizeVariant::Small,
        TargetSizeVariant::Medium,
        TargetSizeVariant::Big,
        TargetSizeVariant::VeryBig,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TargetSizeVariant::Small => "Small",
            TargetSizeVariant::Medium => "Medium",
            TargetSizeVariant::Big => "Big",
            TargetSizeVariant::VeryBig => "VeryBig",
        }
    }
}

/// Target diameters in meters, one per size variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetDiameters {
    #[serde(default = "TargetDiameters::default_small")]
    pub small: f32,
    #[serde(default = "TargetDiameters::default_medium")]
    pub medium: f32,
    #[serde(default = "TargetDiameters::default_big")]
    pub big: f32,
    #[serde(default = "TargetDiameters::default_very_big")]
    pub very_big: f32,
}

impl TargetDiameters {
    fn default_small() -> f32 {
        0.03
    }
    fn default_medium() -> f32 {
        0.04
    }
    fn default_big() -> f32 {
        0.05
    }
    fn default_very_big() -> f32 {
        0.06
    }

    pub fn diameter_of(&self, variant: TargetSizeVariant) -> f32 {
        match variant {
            TargetSizeVariant::Small => self.small,
            TargetSizeVariant::Medium => self.medium,
            TargetSizeVariant::Big => self.big,
            TargetSizeVariant::VeryBig => self.very_big,
        }
    }
}

impl Default for TargetDiameters {
    fn default() -> Self {
        Self {
            small: Self::default_small(),
            medium: Self::default_medium(),
            big: Self::default_big(),
            very_big: Self::default_very_big(),
        }
    }
}

/// One completed entry into the active target's zone, as reported by the
/// target-collision service. Consumed immediately to build a selection row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionData {
    pub active_target_index: i32,
    pub target_size: f32,
    pub target_absolute_position: Vec2,
    pub selection_absolute_position: Vec2,
    pub selection_local_position: Vec2,
    pub success: bool,
}
