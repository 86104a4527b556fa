pub mod columns;
pub mod config;
pub mod events;
pub mod manager;
pub mod rig;
pub mod sequence;
pub mod sizes;

pub use config::ExperimentConfig;
pub use events::{ExperimentEvent, ExperimentNotice};
pub use manager::{ExperimentManager, ExperimentState, TransitionError};
pub use rig::{FrameSampler, Metronome, TargetsService, TrackService};
pub use sequence::generate_run_configs;
pub use sizes::TargetSizeSequence;
