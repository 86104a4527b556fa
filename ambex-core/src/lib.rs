pub mod bitmap;
pub mod counterbalance;
pub mod pose;
pub mod run;
pub mod target;

pub use counterbalance::{balanced_latin_square, diametric_indexes, shuffled};
pub use pose::{FrameSnapshot, Pose, Quat, Vec2, Vec3};
pub use run::{CircleDirection, Context, Handedness, ReferenceFrame, RunConfig};
pub use target::{SelectionData, TARGETS_COUNT, TargetDiameters, TargetSizeVariant};
