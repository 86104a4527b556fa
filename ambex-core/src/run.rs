use serde::{Deserialize, Serialize};

/// Locomotion context a selection block runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Context {
    Standing,
    Walking,
    Circle,
}

impl Context {
    pub const ALL: [Context; 3] = [Context::Standing, Context::Walking, Context::Circle];

    /// Walking and Circle share the track/metronome machinery.
    pub fn is_moving(&self) -> bool {
        !matches!(self, Context::Standing)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Context::Standing => "Standing",
            Context::Walking => "Walking",
            Context::Circle => "Circle",
        }
    }
}

/// Coordinate frame the target board is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceFrame {
    PalmReferenced,
    PalmPositionOnly,
    PathReferenced,
}

impl ReferenceFrame {
    pub const ALL: [ReferenceFrame; 3] = [
        ReferenceFrame::PalmReferenced,
        ReferenceFrame::PalmPositionOnly,
        ReferenceFrame::PathReferenced,
    ];

    /// Stable ordinal used to derive per-frame shuffle seeds.
    pub fn ordinal(&self) -> u64 {
        match self {
            ReferenceFrame::PalmReferenced => 0,
            ReferenceFrame::PalmPositionOnly => 1,
            ReferenceFrame::PathReferenced => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReferenceFrame::PalmReferenced => "PalmReferenced",
            ReferenceFrame::PalmPositionOnly => "PalmPositionOnly",
            ReferenceFrame::PathReferenced => "PathReferenced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn name(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// Direction of travel around the circular track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircleDirection {
    Clockwise,
    CounterClockwise,
}

impl CircleDirection {
    pub fn name(&self) -> &'static str {
        match self {
            CircleDirection::Clockwise => "Clockwise",
            CircleDirection::CounterClockwise => "CounterClockwise",
        }
    }
}

/// One step of a participant's session schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub participant_id: i32,
    pub left_handed: bool,
    pub context: Context,
    pub reference_frame: ReferenceFrame,
    pub is_training: bool,
    pub is_metronome_training: bool,
    pub is_initial_standing_training: bool,
    pub is_break: bool,
    pub is_height_calibration: bool,
}

impl RunConfig {
    pub fn trial(
        participant_id: i32,
        left_handed: bool,
        context: Context,
        reference_frame: ReferenceFrame,
    ) -> Self {
        Self {
            participant_id,
            left_handed,
            context,
            reference_frame,
            is_training: false,
            is_metronome_training: false,
            is_initial_standing_training: false,
            is_break: false,
            is_height_calibration: false,
        }
    }

    /// Same condition, flagged as its warm-up twin.
    pub fn training_of(&self) -> Self {
        Self {
            is_training: true,
            ..*self
        }
    }

    /// Metronome rehearsal step. The context decides the track shape it rehearses.
    pub fn metronome_training(participant_id: i32, left_handed: bool, context: Context) -> Self {
        Self {
            is_metronome_training: true,
            ..Self::trial(participant_id, left_handed, context, ReferenceFrame::PalmReferenced)
        }
    }

    pub fn initial_standing_training(
        participant_id: i32,
        left_handed: bool,
        reference_frame: ReferenceFrame,
    ) -> Self {
        Self {
            is_training: true,
            is_initial_standing_training: true,
            ..Self::trial(participant_id, left_handed, Context::Standing, reference_frame)
        }
    }

    pub fn break_step(participant_id: i32, left_handed: bool) -> Self {
        Self {
            is_break: true,
            ..Self::trial(
                participant_id,
                left_handed,
                Context::Standing,
                ReferenceFrame::PalmReferenced,
            )
        }
    }

    pub fn height_calibration(participant_id: i32, left_handed: bool) -> Self {
        Self {
            is_height_calibration: true,
            ..Self::trial(
                participant_id,
                left_handed,
                Context::Standing,
                ReferenceFrame::PathReferenced,
            )
        }
    }

    pub fn dominant_hand(&self) -> Handedness {
        if self.left_handed {
            Handedness::Left
        } else {
            Handedness::Right
        }
    }

    /// Measured step: selections end up in the participant's CSV files.
    pub fn is_trial(&self) -> bool {
        !self.is_training && !self.is_metronome_training && !self.is_special()
    }

    pub fn is_special(&self) -> bool {
        self.is_break || self.is_height_calibration
    }

    /// Steps that can be stopped with a finish-training command.
    pub fn is_any_training(&self) -> bool {
        self.is_training || self.is_metronome_training
    }

    /// Steps whose done mark is cleared on every session load.
    pub fn repeats_every_session(&self) -> bool {
        self.is_metronome_training || self.is_initial_standing_training || self.is_height_calibration
    }

    /// Short label for the operator's schedule table.
    pub fn label(&self) -> String {
        if self.is_break {
            return String::from("Break");
        }
        if self.is_height_calibration {
            return String::from("HeightCalibration");
        }
        if self.is_metronome_training {
            return format!("MetronomeTraining {}", self.context.name());
        }
        let kind = if self.is_training { "Training" } else { "Trial" };
        format!(
            "{kind} {} {}",
            self.context.name(),
            self.reference_frame.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn training_twin_keeps_condition() {
        let trial = RunConfig::trial(3, true, Context::Circle, ReferenceFrame::PathReferenced);
        let training = trial.training_of();
        assert!(training.is_training);
        assert!(!training.is_trial());
        assert_eq!(training.context, trial.context);
        assert_eq!(training.reference_frame, trial.reference_frame);
    }

    #[test]
    fn special_steps_are_not_trials() {
        let brk = RunConfig::break_step(1, false);
        let cal = RunConfig::height_calibration(1, false);
        assert!(brk.is_special() && !brk.is_trial() && !brk.is_any_training());
        assert!(cal.is_special() && !cal.is_trial());
        assert!(cal.repeats_every_session());
        assert!(!brk.repeats_every_session());
    }

    #[test]
    fn labels_name_the_condition() {
        let cfg = RunConfig::trial(1, false, Context::Walking, ReferenceFrame::PalmPositionOnly);
        assert_eq!(cfg.label(), "Trial Walking PalmPositionOnly");
        assert_eq!(cfg.training_of().label(), "Training Walking PalmPositionOnly");
    }
}
