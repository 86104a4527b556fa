/// Everything that can drive the experiment state machine.
///
/// Server commands, collaborator geometry callbacks and expired timers all
/// funnel into this one closed union; there is no dispatch by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentEvent {
    ServerSaidPrepare,
    ServerSaidStart,
    ServerSaidFinishTraining,
    ServerValidatedTrial,
    ServerInvalidatedTrial,
    CountdownFinished,
    SelectorEnteredTargetZone,
    SelectorExitedTargetZone,
    SelectorExitedWrongSide,
    ParticipantEnteredTrack { wrong_side: bool },
    ParticipantFinishedTrack,
    ParticipantSwervedOffTrack,
    ParticipantSlowedDown,
}

impl ExperimentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ExperimentEvent::ServerSaidPrepare => "ServerSaidPrepare",
            ExperimentEvent::ServerSaidStart => "ServerSaidStart",
            ExperimentEvent::ServerSaidFinishTraining => "ServerSaidFinishTraining",
            ExperimentEvent::ServerValidatedTrial => "ServerValidatedTrial",
            ExperimentEvent::ServerInvalidatedTrial => "ServerInvalidatedTrial",
            ExperimentEvent::CountdownFinished => "CountdownFinished",
            ExperimentEvent::SelectorEnteredTargetZone => "SelectorEnteredTargetZone",
            ExperimentEvent::SelectorExitedTargetZone => "SelectorExitedTargetZone",
            ExperimentEvent::SelectorExitedWrongSide => "SelectorExitedWrongSide",
            ExperimentEvent::ParticipantEnteredTrack { .. } => "ParticipantEnteredTrack",
            ExperimentEvent::ParticipantFinishedTrack => "ParticipantFinishedTrack",
            ExperimentEvent::ParticipantSwervedOffTrack => "ParticipantSwervedOffTrack",
            ExperimentEvent::ParticipantSlowedDown => "ParticipantSlowedDown",
        }
    }
}

/// Outbound reports the machine accumulates for the session layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentNotice {
    /// The current step is completely done and its data is on disk.
    TrialsFinished,
    /// A trial block ended; an operator verdict decides what happens next.
    RequestTrialValidation,
    /// A transition handler failed; the machine held its previous state.
    UnexpectedError(String),
    /// The participant broke protocol; the block restarts.
    UserError(String),
}
