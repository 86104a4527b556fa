use serde::{Deserialize, Serialize};

/// Coarse run stage the headset reports to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStage {
    Idle,
    Preparing,
    Running,
    Validation,
}

impl SessionStage {
    pub fn name(&self) -> &'static str {
        match self {
            SessionStage::Idle => "Idle",
            SessionStage::Preparing => "Preparing",
            SessionStage::Running => "Running",
            SessionStage::Validation => "Validation",
        }
    }
}

/// Full headset-side session state in one packet.
///
/// The operator console renders everything from the latest summary plus a
/// locally regenerated schedule, so a summary must carry enough to rebuild
/// the whole view after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub participant_id: i32,
    pub left_handed: bool,
    pub done_bitmap: i64,
    pub index: i32,
    pub stage: SessionStage,
}

/// Commands the operator console sends to the headset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToHeadset {
    SetParticipantId { participant_id: i32 },
    SetLeftHanded { left_handed: bool },
    SetStepIsDone { index: i32, done: bool },
    SavePrefs,
    RefreshSummary,
    PrepareNextStep { index: i32 },
    StartNextStep { index: i32 },
    FinishTrainingStep { index: i32 },
    ValidateTrial,
    InvalidateTrial,
    SetPathRefHeight,
    PlaceTrackAndLight,
    ToggleHeadsetAdjustmentText { show: bool },
}

impl ToHeadset {
    pub fn name(&self) -> &'static str {
        match self {
            ToHeadset::SetParticipantId { .. } => "SetParticipantId",
            ToHeadset::SetLeftHanded { .. } => "SetLeftHanded",
            ToHeadset::SetStepIsDone { .. } => "SetStepIsDone",
            ToHeadset::SavePrefs => "SavePrefs",
            ToHeadset::RefreshSummary => "RefreshSummary",
            ToHeadset::PrepareNextStep { .. } => "PrepareNextStep",
            ToHeadset::StartNextStep { .. } => "StartNextStep",
            ToHeadset::FinishTrainingStep { .. } => "FinishTrainingStep",
            ToHeadset::ValidateTrial => "ValidateTrial",
            ToHeadset::InvalidateTrial => "InvalidateTrial",
            ToHeadset::SetPathRefHeight => "SetPathRefHeight",
            ToHeadset::PlaceTrackAndLight => "PlaceTrackAndLight",
            ToHeadset::ToggleHeadsetAdjustmentText { .. } => "ToggleHeadsetAdjustmentText",
        }
    }
}

/// Reports the headset sends back to the operator console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FromHeadset {
    Summary(SessionSummary),
    /// A command arrived in a stage where it is not legal.
    InvalidOperation { reason: String },
    /// A transition handler failed; the experiment kept its state.
    UnexpectedError { message: String },
    /// The participant broke protocol and the block restarts.
    UserError { message: String },
    /// The last selection block is done and needs an operator verdict.
    RequestTrialValidation,
}
