//! Deterministic session schedule generation.
//!
//! Both processes regenerate the schedule from `(participant_id,
//! left_handed)` alone and must arrive at the identical list, so every
//! random choice in here is seeded from those inputs.

use ambex_core::{Context, ReferenceFrame, RunConfig, balanced_latin_square, shuffled};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Builds the full ordered list of steps for one participant.
///
/// Reference frames are counterbalanced across participants with a balanced
/// Latin square; within each frame the three contexts are shuffled with a
/// seed derived from the participant and the frame. Every condition appears
/// as a training step directly followed by its measured twin. Around those
/// pairs the schedule gains: a metronome rehearsal before the first Walking
/// and the first Circle step, a mid-session break at a fixed position, one
/// initial standing training at the very start, and a board-height
/// calibration right before path-referenced anchoring is first used.
pub fn generate_run_configs(participant_id: i32, left_handed: bool) -> Vec<RunConfig> {
    let frames = balanced_latin_square(&ReferenceFrame::ALL, participant_id);

    let mut steps = Vec::new();
    for frame in &frames {
        let mut rng = StdRng::seed_from_u64(context_seed(participant_id, *frame));
        for context in shuffled(&Context::ALL, &mut rng) {
            let trial = RunConfig::trial(participant_id, left_handed, context, *frame);
            steps.push(trial.training_of());
            steps.push(trial);
        }
    }

    insert_metronome_before_first(&mut steps, Context::Walking, participant_id, left_handed);
    insert_metronome_before_first(&mut steps, Context::Circle, participant_id, left_handed);

    let break_position = Context::ALL.len() * 2 + 2;
    steps.insert(
        break_position,
        RunConfig::break_step(participant_id, left_handed),
    );

    steps.insert(
        0,
        RunConfig::initial_standing_training(participant_id, left_handed, frames[0]),
    );

    if let Some(position) = steps
        .iter()
        .position(|step| step.reference_frame == ReferenceFrame::PathReferenced)
    {
        steps.insert(
            position,
            RunConfig::height_calibration(participant_id, left_handed),
        );
    }

    steps
}

fn context_seed(participant_id: i32, frame: ReferenceFrame) -> u64 {
    (participant_id as i64 * 10) as u64 + frame.ordinal()
}

fn insert_metronome_before_first(
    steps: &mut Vec<RunConfig>,
    context: Context,
    participant_id: i32,
    left_handed: bool,
) {
    if let Some(position) = steps
        .iter()
        .position(|step| step.context == context && !step.is_metronome_training)
    {
        steps.insert(
            position,
            RunConfig::metronome_training(participant_id, left_handed, context),
        );
    }
}
