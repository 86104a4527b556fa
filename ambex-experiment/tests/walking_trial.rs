mod common;

use ambex_experiment::{ExperimentNotice, ExperimentState};
use common::*;

#[test]
fn walking_block_runs_between_track_entry_and_validation() {
    let mut h = Harness::new();

    h.manager.on_server_said_prepare(walking_trial(5));
    {
        let rig = h.rig.state();
        assert_eq!(rig.track_context, Some(ambex_core::Context::Walking));
        assert!(rig.track_enabled && rig.arrow_visible);
        assert!(rig.arrow_direction.is_some());
        assert!(rig.board_visible);
    }

    h.manager.on_server_said_start();
    assert_eq!(
        h.manager.state(),
        ExperimentState::AwaitingParticipantEnterTrack
    );
    {
        let rig = h.rig.state();
        assert_eq!(rig.metronome_tempo, Some(90));
        assert!(rig.metronome_on);
    }

    // selector chatter is ignored until a block is underway
    h.manager.on_selector_entered_target_zone();
    h.manager.on_selector_exited_target_zone();
    assert_eq!(
        h.manager.state(),
        ExperimentState::AwaitingParticipantEnterTrack
    );
    assert!(h.notices().is_empty());

    h.manager.on_participant_entered_track(false);
    assert_eq!(h.manager.state(), ExperimentState::SelectingTargetsWalking);
    h.fire_countdown();
    assert_eq!(h.rig.state().active_target, Some(0));

    h.complete_block();
    assert_eq!(
        h.manager.state(),
        ExperimentState::AwaitingServerValidationOfLastTrial
    );
    {
        // end of a walking block parks the track gear
        let rig = h.rig.state();
        assert!(!rig.metronome_on && !rig.arrow_visible);
        assert!(!rig.targets_visible);
    }
    let notices = h.notices();
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, ExperimentNotice::RequestTrialValidation)),
        "{notices:?}"
    );

    h.manager.on_server_validated_trial();
    h.wait_until("next walking block", |h| {
        h.manager.state() == ExperimentState::AwaitingParticipantEnterTrack
    });
    {
        let rig = h.rig.state();
        assert!(rig.metronome_on && rig.targets_visible && rig.arrow_visible);
    }

    let rows = h.selections_csv(5);
    assert_eq!(rows.len(), 7);
    for row in &rows {
        let cells = fields(row);
        assert_eq!(cells[2], "Walking");
        // circle direction stays empty on the straight track
        assert_eq!(cells[3], "");
    }
}

#[test]
fn swerving_discards_the_block_and_waits_for_reentry() {
    let mut h = Harness::with_seed(21);

    h.manager.on_server_said_prepare(walking_trial(6));
    h.manager.on_server_said_start();
    h.manager.on_participant_entered_track(false);
    h.fire_countdown();
    h.select_target(0);
    h.select_target(3);
    h.select_target(6);
    h.notices();

    h.manager.on_participant_swerved_off_track();
    assert_eq!(
        h.manager.state(),
        ExperimentState::AwaitingParticipantEnterTrack
    );
    {
        let rig = h.rig.state();
        assert!(rig.active_target.is_none());
        // metronome keeps beating so the participant can walk right back in
        assert!(rig.metronome_on);
        assert!(rig.arrow_visible);
    }
    let notices = h.notices();
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, ExperimentNotice::UserError(_))),
        "{notices:?}"
    );

    h.manager.on_participant_entered_track(false);
    h.fire_countdown();
    assert_eq!(h.rig.state().active_target, Some(0));
    h.complete_block();
    h.manager.on_server_validated_trial();
    h.wait_until("block flushed", |h| {
        h.manager.state() == ExperimentState::AwaitingParticipantEnterTrack
    });

    let rows = h.selections_csv(6);
    assert_eq!(rows.len(), 7);
    assert_eq!(fields(&rows[0])[1], "1");
}

#[test]
fn walking_trial_finishes_after_four_validated_blocks() {
    let mut h = Harness::with_seed(8);

    h.manager.on_server_said_prepare(walking_trial(7));
    h.manager.on_server_said_start();

    for block in 0..4 {
        h.manager.on_participant_entered_track(false);
        assert_eq!(
            h.manager.state(),
            ExperimentState::SelectingTargetsWalking,
            "block {block}"
        );
        h.fire_countdown();
        h.complete_block();
        h.manager.on_server_validated_trial();
        let waiting_for = if block < 3 {
            ExperimentState::AwaitingParticipantEnterTrack
        } else {
            ExperimentState::Idle
        };
        h.wait_until("verdict applied", move |h| h.manager.state() == waiting_for);
    }

    let notices = h.notices();
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, ExperimentNotice::TrialsFinished)),
        "{notices:?}"
    );
    {
        let rig = h.rig.state();
        assert!(!rig.metronome_on && !rig.track_enabled && !rig.board_visible);
    }
    assert_eq!(h.selections_csv(7).len(), 28);
}

#[test]
fn circle_rows_carry_the_arrow_direction() {
    let mut h = Harness::new();

    h.manager.on_server_said_prepare(circle_trial(12));
    h.manager.on_server_said_start();
    h.manager.on_participant_entered_track(false);
    h.fire_countdown();
    let direction = h.rig.state().arrow_direction.unwrap();
    h.complete_block();
    h.manager.on_server_validated_trial();
    h.wait_until("block flushed", |h| {
        h.manager.state() == ExperimentState::AwaitingParticipantEnterTrack
    });

    let rows = h.selections_csv(12);
    assert_eq!(rows.len(), 7);
    for row in &rows {
        let cells = fields(row);
        assert_eq!(cells[2], "Circle");
        assert_eq!(cells[3], direction.name());
    }
}

#[test]
fn wrong_side_entry_only_matters_on_the_circle() {
    let mut h = Harness::new();

    h.manager.on_server_said_prepare(circle_trial(13));
    h.manager.on_server_said_start();
    h.notices();

    h.manager.on_participant_entered_track(true);
    assert_eq!(
        h.manager.state(),
        ExperimentState::AwaitingParticipantEnterTrack
    );
    let notices = h.notices();
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, ExperimentNotice::UserError(_))),
        "{notices:?}"
    );

    h.manager.on_participant_entered_track(false);
    assert_eq!(h.manager.state(), ExperimentState::SelectingTargetsWalking);

    // a straight track has no wrong side
    let mut h = Harness::new();
    h.manager.on_server_said_prepare(walking_trial(14));
    h.manager.on_server_said_start();
    h.manager.on_participant_entered_track(true);
    assert_eq!(h.manager.state(), ExperimentState::SelectingTargetsWalking);
    assert!(h.notices().is_empty());
}
