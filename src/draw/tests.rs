#![cfg(test)]

use std::time::Duration;

use crate::config::EngineConfig;
use crate::domain::{DrawCommand, DrawStatus, ParticipantId, Snapshot};
use crate::test_utils::fixtures::{advance, complete, participant, snapshot};

use super::elimination::AnimationStage;
use super::engine::{DrawingEngine, SnapshotOutcome};
use super::events::{EngineEvent, RebaselineReason, TimedEvent};
use super::gateway::{GatewayError, GatewayState};
use super::winner::WinnerStage;

fn engine() -> DrawingEngine {
    DrawingEngine::new(&EngineConfig::default().with_rng_seed(7)).unwrap()
}

/// Ten participants holding 100 tickets each over a three digit range.
fn ten_way_drawing() -> Snapshot {
    let participants = (1..=10)
        .map(|id| {
            let start = (id as u64 - 1) * 100;
            participant(id, start, start + 99)
        })
        .collect();
    snapshot(3, "", DrawStatus::Drawing, participants)
}

fn drive(engine: &mut DrawingEngine) -> Vec<TimedEvent> {
    while let Some(deadline) = engine.next_deadline() {
        engine.advance_to(deadline);
    }
    engine.drain_events()
}

/// Advances timer by timer until an event matching `pred` is emitted.
fn step_until<F>(engine: &mut DrawingEngine, pred: F) -> Vec<TimedEvent>
where
    F: Fn(&EngineEvent) -> bool,
{
    let mut seen = Vec::new();
    while let Some(deadline) = engine.next_deadline() {
        engine.advance_to(deadline);
        let batch = engine.drain_events();
        let hit = batch.iter().any(|e| pred(&e.event));
        seen.extend(batch);
        if hit {
            return seen;
        }
    }
    panic!("timeline drained without the expected event");
}

fn position<F>(events: &[TimedEvent], pred: F) -> usize
where
    F: Fn(&EngineEvent) -> bool,
{
    events
        .iter()
        .position(|e| pred(&e.event))
        .unwrap_or_else(|| panic!("event missing from {events:#?}"))
}

fn ids(view_list: &[super::view::ParticipantView]) -> Vec<ParticipantId> {
    view_list.iter().map(|p| p.id).collect()
}

fn reveal(engine: &mut DrawingEngine, next: Snapshot) {
    let ticket = engine.begin_command(DrawCommand::RevealNext).unwrap();
    assert!(engine.complete_command(&ticket, next));
}

#[test]
fn first_digit_eliminates_three_of_ten() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    reveal(&mut engine, advance(&base, "7", &[4, 5, 6, 7, 8, 9, 10]));
    let view = engine.view();
    assert_eq!(view.gateway, GatewayState::AwaitingPipeline);
    assert!(!view.can_reveal);
    assert_eq!(view.remaining_people, 10);
    assert_eq!(view.stage_of(1), AnimationStage::Pending);

    let landed = step_until(&mut engine, |e| matches!(e, EngineEvent::RevealComplete { .. }));
    let view = engine.view();
    assert_eq!(view.digit_strip(), "7__");
    assert_eq!(ids(&view.eligible), (1..=10).collect::<Vec<_>>());
    assert_eq!(view.remaining_people, 10);

    let shaking = step_until(&mut engine, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shake, .. })
    });
    let view = engine.view();
    for id in 1..=3 {
        assert_eq!(view.stage_of(id), AnimationStage::Shake);
    }
    assert_eq!(view.stage_of(4), AnimationStage::None);

    let committed = step_until(&mut engine, |e| {
        matches!(e, EngineEvent::EliminationCommitted { .. })
    });
    let view = engine.view();
    assert_eq!(ids(&view.eligible), (4..=10).collect::<Vec<_>>());
    assert_eq!(ids(&view.eliminated), vec![1, 2, 3]);
    assert_eq!(view.stage_of(2), AnimationStage::RecentlyEntered);
    assert!(view.eligible.iter().all(|p| p.survived));
    assert_eq!(view.gateway, GatewayState::Idle);
    assert!(view.can_reveal);

    let rest = drive(&mut engine);
    let events: Vec<TimedEvent> = landed
        .into_iter()
        .chain(shaking)
        .chain(committed)
        .chain(rest)
        .collect();

    let complete_at = position(&events, |e| matches!(e, EngineEvent::RevealComplete { .. }));
    let shake_at = position(&events, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shake, .. })
    });
    let shrink_at = position(&events, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shrink, .. })
    });
    let exit_at = position(&events, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Exit, .. })
    });
    let commit_at = position(&events, |e| matches!(e, EngineEvent::EliminationCommitted { .. }));
    let unlock_at = position(&events, |e| matches!(e, EngineEvent::GatewayUnlocked));
    assert!(complete_at < shake_at && shake_at < shrink_at && shrink_at < exit_at);
    assert!(exit_at < commit_at && commit_at < unlock_at);
    assert!(events[complete_at].at < events[shake_at].at);

    let people: Vec<u64> = events
        .iter()
        .filter_map(|e| match e.event {
            EngineEvent::CountersChanged { people, .. } => Some(people),
            _ => None,
        })
        .collect();
    assert!(people.windows(2).all(|w| w[1] <= w[0]));
    assert!(events.iter().any(|e| e.event
        == EngineEvent::CountersSettled {
            people: 7,
            tickets: 700
        }));

    let view = engine.view();
    assert_eq!((view.remaining_people, view.remaining_tickets), (7, 700));
    assert_eq!(view.stage_of(2), AnimationStage::None);
    assert!(view.eligible.iter().all(|p| !p.survived));
    assert_eq!(engine.pending_timers(), 0);
}

#[test]
fn digit_without_eliminations_glows_and_unlocks_immediately() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    reveal(&mut engine, advance(&base, "4", &(1..=10).collect::<Vec<_>>()));
    let events = step_until(&mut engine, |e| matches!(e, EngineEvent::RevealComplete { .. }));
    let landed_at = events.last().map(|e| e.at).unwrap();
    let same_instant: Vec<&EngineEvent> = events
        .iter()
        .filter(|e| e.at == landed_at)
        .map(|e| &e.event)
        .collect();
    assert!(same_instant
        .iter()
        .any(|e| matches!(e, EngineEvent::SurvivorGlow { ids } if ids.len() == 10)));
    assert!(same_instant.contains(&&EngineEvent::GatewayUnlocked));
    assert!(!events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::EliminationStage { .. })));

    let view = engine.view();
    assert_eq!(view.gateway, GatewayState::Idle);
    assert!(view.eligible.iter().all(|p| p.survived));
    assert_eq!(view.remaining_people, 10);

    let rest = drive(&mut engine);
    assert!(rest.iter().any(|e| e.event == EngineEvent::GlowCleared));
}

#[test]
fn repeated_identical_polls_are_idempotent() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    for _ in 0..5 {
        assert_eq!(engine.apply_snapshot(base.clone()), SnapshotOutcome::Unchanged);
    }
    assert!(engine.drain_events().is_empty());
    assert_eq!(engine.pending_timers(), 0);

    let next = advance(&base, "7", &[4, 5, 6]);
    assert_eq!(
        engine.apply_snapshot(next.clone()),
        SnapshotOutcome::Progressed { new_digits: 1 }
    );
    let pending = engine.pending_timers();
    for _ in 0..5 {
        assert_eq!(engine.apply_snapshot(next.clone()), SnapshotOutcome::Unchanged);
    }
    assert_eq!(engine.pending_timers(), pending);

    let events = drive(&mut engine);
    let spins = events
        .iter()
        .filter(|e| matches!(e.event, EngineEvent::DigitSpinStarted { .. }))
        .count();
    let batches = events
        .iter()
        .filter(|e| matches!(e.event, EngineEvent::EliminationCommitted { .. }))
        .count();
    assert_eq!((spins, batches), (1, 1));
}

#[test]
fn eliminated_participants_never_return_without_reset() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    let first = advance(&base, "7", &[4, 5, 6, 7, 8, 9, 10]);
    engine.apply_snapshot(first.clone());
    drive(&mut engine);

    let mut second = advance(&first, "72", &[5, 6, 7, 8, 9, 10]);
    second.participants[0].is_still_eligible = true;
    engine.apply_snapshot(second);
    let events = drive(&mut engine);

    let committed: Vec<&Vec<ParticipantId>> = events
        .iter()
        .filter_map(|e| match &e.event {
            EngineEvent::EliminationCommitted { ids } => Some(ids),
            _ => None,
        })
        .collect();
    assert_eq!(committed, vec![&vec![4]]);

    let view = engine.view();
    assert!(!ids(&view.eligible).contains(&1));
    assert_eq!(ids(&view.eliminated), vec![1, 2, 3, 4]);
    assert_eq!((view.remaining_people, view.remaining_tickets), (6, 600));
}

#[test]
fn skipped_digits_reveal_one_after_another() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    assert_eq!(
        engine.apply_snapshot(advance(&base, "72", &[7, 8])),
        SnapshotOutcome::Progressed { new_digits: 2 }
    );
    let events = drive(&mut engine);

    let first_done = position(&events, |e| *e == EngineEvent::CycleFinished { position: 0 });
    let second_spin = position(&events, |e| *e == EngineEvent::DigitSpinStarted { position: 1 });
    let second_land = position(&events, |e| {
        *e == EngineEvent::RevealComplete {
            position: 1,
            digit: '2',
        }
    });
    let shake = position(&events, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shake, .. })
    });
    assert!(first_done < second_spin && second_spin < second_land && second_land < shake);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.event, EngineEvent::EliminationCommitted { .. }))
            .count(),
        1
    );
    assert_eq!(engine.view().digit_strip(), "72_");
}

#[test]
fn stale_snapshot_is_dropped() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    let next = advance(&base, "72", &[7, 8]);
    engine.apply_snapshot(next);
    drive(&mut engine);

    // A lagging response: shorter reveal, nobody brought back.
    let stale = advance(&base, "7", &[7, 8]);
    assert_eq!(engine.apply_snapshot(stale), SnapshotOutcome::Stale);
    let events = engine.drain_events();
    assert_eq!(
        events.iter().map(|e| &e.event).collect::<Vec<_>>(),
        vec![&EngineEvent::StaleSnapshotDropped {
            revealed: "7".into()
        }]
    );
    let view = engine.view();
    assert_eq!(view.digit_strip(), "72_");
    assert_eq!(ids(&view.eligible), vec![7, 8]);
}

#[test]
fn only_one_command_at_a_time() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());

    let ticket = engine.begin_command(DrawCommand::RevealNext).unwrap();
    assert_eq!(
        engine.begin_command(DrawCommand::RevealNext),
        Err(GatewayError::CommandInFlight(DrawCommand::RevealNext))
    );
    assert_eq!(
        engine.begin_command(DrawCommand::Reset),
        Err(GatewayError::CommandInFlight(DrawCommand::RevealNext))
    );
    engine.complete_command(&ticket, advance(&base, "7", &[4, 5]));

    assert_eq!(
        engine.begin_command(DrawCommand::RevealNext),
        Err(GatewayError::AnimationInProgress)
    );
    assert_eq!(
        engine.begin_command(DrawCommand::Start),
        Err(GatewayError::AnimationInProgress)
    );
    let view = engine.view();
    assert!(!view.can_reveal && !view.can_start && view.can_reset);

    drive(&mut engine);
    assert!(engine.begin_command(DrawCommand::RevealNext).is_ok());
}

#[test]
fn reset_mid_animation_cancels_everything() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    reveal(&mut engine, advance(&base, "7", &[4, 5, 6]));
    step_until(&mut engine, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shake, .. })
    });

    let ticket = engine.begin_command(DrawCommand::Reset).unwrap();
    let mut fresh = ten_way_drawing();
    fresh.session.status = DrawStatus::Active;
    assert!(engine.complete_command(&ticket, fresh));

    let events = engine.drain_events();
    assert!(events.iter().any(|e| e.event
        == EngineEvent::Rebaselined {
            reason: RebaselineReason::Reset,
            revealed: String::new(),
        }));
    assert!(events.iter().any(|e| e.event == EngineEvent::GatewayUnlocked));
    assert_eq!(engine.pending_timers(), 0);

    let view = engine.view();
    assert_eq!(view.digit_strip(), "___");
    assert_eq!(ids(&view.eligible), (1..=10).collect::<Vec<_>>());
    assert!(view.eliminated.is_empty());
    assert!(view.eligible.iter().all(|p| p.stage == AnimationStage::None));
    assert_eq!(view.remaining_people, 10);
    assert!(view.can_start);

    engine.advance_to(engine.now() + Duration::from_secs(60));
    assert!(engine.drain_events().is_empty());
}

#[test]
fn unknown_participant_is_dropped_from_batch() {
    let mut engine = engine();
    let base = snapshot(
        1,
        "",
        DrawStatus::Drawing,
        vec![participant(1, 0, 3), participant(2, 4, 7), participant(3, 8, 9)],
    );
    engine.apply_snapshot(base.clone());

    let mut next = advance(&base, "5", &[2]);
    next.participants.retain(|p| p.id != 3);
    engine.apply_snapshot(next);
    let events = drive(&mut engine);

    assert!(events
        .iter()
        .any(|e| e.event == EngineEvent::EliminationDropped { ids: vec![3] }));
    assert!(events
        .iter()
        .any(|e| e.event == EngineEvent::EliminationCommitted { ids: vec![1] }));
    let view = engine.view();
    assert_eq!(ids(&view.eligible), vec![2]);
    assert_eq!(ids(&view.eliminated), vec![1]);
}

#[test]
fn winner_reveal_fires_once_after_pipeline_drains() {
    let mut engine = engine();
    let base = snapshot(
        1,
        "",
        DrawStatus::Drawing,
        vec![participant(1, 0, 4), participant(2, 5, 9)],
    );
    engine.apply_snapshot(base.clone());
    let done = complete(&base, "7", 2);
    engine.apply_snapshot(done.clone());
    assert_eq!(engine.view().winner_stage, WinnerStage::Hidden);

    let events = drive(&mut engine);
    let committed = position(&events, |e| matches!(e, EngineEvent::EliminationCommitted { .. }));
    let dark = position(&events, |e| {
        matches!(
            e,
            EngineEvent::WinnerStage {
                stage: WinnerStage::Dark,
                participant: Some(2)
            }
        )
    });
    assert!(committed < dark);
    let stages: Vec<WinnerStage> = events
        .iter()
        .filter_map(|e| match e.event {
            EngineEvent::WinnerStage { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            WinnerStage::Dark,
            WinnerStage::Spotlight,
            WinnerStage::CardReveal,
            WinnerStage::Visible
        ]
    );

    let mut refreshed = done.clone();
    refreshed.participants[1].name = "Winner".into();
    engine.apply_snapshot(done);
    engine.apply_snapshot(refreshed);
    let events = drive(&mut engine);
    assert!(!events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::WinnerStage { .. })));

    assert!(engine.dismiss_winner());
    assert_eq!(engine.view().winner_stage, WinnerStage::Hidden);
    assert!(engine.replay_winner());
    assert_eq!(engine.view().winner_stage, WinnerStage::Dark);
}

#[test]
fn completed_drawing_on_first_load_does_not_replay() {
    let mut engine = engine();
    let base = snapshot(
        1,
        "",
        DrawStatus::Drawing,
        vec![participant(1, 0, 4), participant(2, 5, 9)],
    );
    engine.apply_snapshot(complete(&base, "7", 2));
    let events = drive(&mut engine);
    assert!(!events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::WinnerStage { .. })));
    let view = engine.view();
    assert_eq!(view.winner, Some(2));
    assert_eq!(view.winner_stage, WinnerStage::Hidden);
    assert_eq!(view.digit_strip(), "7");
}

#[test]
fn failed_command_restores_controls_and_surfaces_error() {
    let mut engine = engine();
    engine.apply_snapshot(ten_way_drawing());
    engine.drain_events();

    let ticket = engine.begin_command(DrawCommand::RevealNext).unwrap();
    assert!(engine.fail_command(&ticket, "backend returned 503"));
    let events = engine.drain_events();
    assert!(events.iter().any(|e| e.event
        == EngineEvent::CommandFailed {
            command: DrawCommand::RevealNext,
            message: "backend returned 503".into()
        }));

    let view = engine.view();
    assert!(view.can_reveal);
    assert_eq!(view.error.as_ref().map(|e| e.message.as_str()), Some("backend returned 503"));
    assert!(engine.dismiss_error());
    assert!(engine.view().error.is_none());
    assert!(!engine.fail_command(&ticket, "late"));
}

#[test]
fn session_change_rebaselines_mid_animation() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.apply_snapshot(advance(&base, "7", &[4, 5]));
    assert!(engine.is_pipeline_busy());

    let mut other = ten_way_drawing();
    other.session.id = 2;
    assert_eq!(
        engine.apply_snapshot(other),
        SnapshotOutcome::Rebaselined(RebaselineReason::SessionChanged)
    );
    assert!(!engine.is_pipeline_busy());
    assert_eq!(engine.pending_timers(), 0);
    assert_eq!(engine.view().session_id, Some(2));
}

#[test]
fn disposal_stops_the_timeline() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.apply_snapshot(advance(&base, "7", &[4, 5]));
    engine.drain_events();

    engine.dispose();
    assert_eq!(
        engine.drain_events().into_iter().map(|e| e.event).collect::<Vec<_>>(),
        vec![EngineEvent::Disposed]
    );
    assert_eq!(engine.next_deadline(), None);
    engine.advance_to(Duration::from_secs(600));
    assert!(engine.drain_events().is_empty());
}

#[test]
fn local_reset_treats_next_snapshot_as_first_load() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.apply_snapshot(advance(&base, "7", &[4, 5]));
    engine.reset();
    assert_eq!(engine.pending_timers(), 0);
    assert!(engine.snapshot().is_none());

    assert_eq!(
        engine.apply_snapshot(advance(&base, "7", &[4, 5])),
        SnapshotOutcome::Rebaselined(RebaselineReason::Initial)
    );
    assert_eq!(engine.pending_timers(), 0);
    assert_eq!(engine.view().digit_strip(), "7__");
}

#[test]
fn restarted_drawing_behind_the_shown_prefix_rebaselines() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.apply_snapshot(advance(&base, "73", &[8]));
    drive(&mut engine);
    assert_eq!(ids(&engine.view().eligible), vec![8]);

    // Reset and restarted between two polls; the new drawing is at "7" again.
    let restarted = advance(&base, "7", &[7, 8]);
    assert_eq!(
        engine.apply_snapshot(restarted.clone()),
        SnapshotOutcome::Rebaselined(RebaselineReason::ResetObserved)
    );
    assert_eq!(engine.apply_snapshot(restarted), SnapshotOutcome::Unchanged);
    assert_eq!(engine.pending_timers(), 0);

    let view = engine.view();
    assert_eq!(view.digit_strip(), "7__");
    assert_eq!(ids(&view.eligible), vec![7, 8]);
    assert_eq!((view.remaining_people, view.remaining_tickets), (2, 200));
}

#[test]
fn eliminations_published_after_their_digit_still_animate() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.apply_snapshot(advance(&base, "7", &(1..=10).collect::<Vec<_>>()));
    drive(&mut engine);

    let late = advance(&base, "7", &[8, 9, 10]);
    assert_eq!(engine.apply_snapshot(late.clone()), SnapshotOutcome::Refreshed);
    assert!(engine.is_pipeline_busy());
    assert_eq!(engine.apply_snapshot(late.clone()), SnapshotOutcome::Unchanged);
    let events = drive(&mut engine);

    assert!(!events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::DigitSpinStarted { .. })));
    let committed: Vec<&Vec<ParticipantId>> = events
        .iter()
        .filter_map(|e| match &e.event {
            EngineEvent::EliminationCommitted { ids } => Some(ids),
            _ => None,
        })
        .collect();
    assert_eq!(committed, vec![&(1..=7).collect::<Vec<_>>()]);

    let view = engine.view();
    assert_eq!(view.digit_strip(), "7__");
    assert_eq!(ids(&view.eligible), vec![8, 9, 10]);
    assert_eq!(ids(&view.eliminated), (1..=7).collect::<Vec<_>>());
    assert_eq!((view.remaining_people, view.remaining_tickets), (3, 300));
    assert_eq!(engine.apply_snapshot(late), SnapshotOutcome::Unchanged);
}

#[test]
fn eliminations_arriving_mid_spin_wait_for_the_landing() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    engine.apply_snapshot(advance(&base, "7", &(1..=10).collect::<Vec<_>>()));
    assert_eq!(
        engine.apply_snapshot(advance(&base, "7", &[4, 5, 6, 7, 8, 9, 10])),
        SnapshotOutcome::Refreshed
    );
    let events = drive(&mut engine);

    let landed = position(&events, |e| matches!(e, EngineEvent::RevealComplete { .. }));
    let shake = position(&events, |e| {
        matches!(e, EngineEvent::EliminationStage { stage: AnimationStage::Shake, .. })
    });
    assert!(landed < shake);
    assert!(events[landed].at < events[shake].at);

    let view = engine.view();
    assert_eq!(ids(&view.eliminated), vec![1, 2, 3]);
    assert_eq!(view.remaining_people, 7);
}

#[test]
fn unspinnable_character_rebaselines_instead_of_eliminating() {
    let mut engine = engine();
    let base = ten_way_drawing();
    engine.apply_snapshot(base.clone());
    engine.drain_events();

    let garbled = advance(&base, "x", &[4, 5, 6, 7, 8, 9, 10]);
    engine.apply_snapshot(garbled);
    let events = drive(&mut engine);

    assert!(events
        .iter()
        .any(|e| matches!(e.event, EngineEvent::Rebaselined { reason: RebaselineReason::Diverged, .. })));
    assert!(!events.iter().any(|e| matches!(
        e.event,
        EngineEvent::EliminationStage { .. } | EngineEvent::EliminationCommitted { .. }
    )));
    let view = engine.view();
    assert_eq!(ids(&view.eligible), (4..=10).collect::<Vec<_>>());
    assert_eq!(view.remaining_people, 7);
    assert_eq!(view.gateway, GatewayState::Idle);
}

#[test]
fn engine_refuses_a_zero_lead_in() {
    let mut config = EngineConfig::default();
    config.elimination_lead_in = Duration::ZERO;
    assert!(DrawingEngine::new(&config).is_err());
}
