use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DrawCommand, DrawStatus, ParticipantId};

use super::elimination::AnimationStage;
use super::winner::WinnerStage;

/// Timer payloads registered on the engine scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    DigitStep { position: usize },
    ShakeBegin { batch: u64 },
    ShakeElapsed { batch: u64 },
    ShrinkElapsed { batch: u64 },
    EntranceElapsed { batch: u64 },
    CounterFrame,
    GlowElapsed,
    WinnerStageElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaselineReason {
    Initial,
    Started,
    Reset,
    ResetObserved,
    SessionChanged,
    Diverged,
}

/// Presentation timeline emitted by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Rebaselined {
        reason: RebaselineReason,
        revealed: String,
    },
    SnapshotAccepted {
        revealed: String,
        status: DrawStatus,
    },
    StaleSnapshotDropped {
        revealed: String,
    },
    DigitSpinStarted {
        position: usize,
    },
    DigitSpinStep {
        position: usize,
        shown: char,
    },
    RevealComplete {
        position: usize,
        digit: char,
    },
    EliminationStage {
        stage: AnimationStage,
        ids: Vec<ParticipantId>,
    },
    EliminationDropped {
        ids: Vec<ParticipantId>,
    },
    EliminationCommitted {
        ids: Vec<ParticipantId>,
    },
    EntranceSettled {
        ids: Vec<ParticipantId>,
    },
    CountersChanged {
        people: u64,
        tickets: u64,
    },
    CountersSettled {
        people: u64,
        tickets: u64,
    },
    SurvivorGlow {
        ids: Vec<ParticipantId>,
    },
    GlowCleared,
    CycleFinished {
        position: usize,
    },
    WinnerStage {
        stage: WinnerStage,
        participant: Option<ParticipantId>,
    },
    CommandIssued {
        command: DrawCommand,
    },
    CommandSucceeded {
        command: DrawCommand,
    },
    CommandFailed {
        command: DrawCommand,
        message: String,
    },
    GatewayUnlocked,
    Disposed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Virtual time since the engine was created.
    #[serde(with = "crate::config::duration_ms")]
    pub at: Duration,
    pub event: EngineEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serde::assert_round_trip_eq;

    #[test]
    fn timed_event_round_trips_with_serde() {
        let event = TimedEvent {
            at: Duration::from_millis(1250),
            event: EngineEvent::EliminationStage {
                stage: AnimationStage::Shake,
                ids: vec![3, 1],
            },
        };
        assert_round_trip_eq(&event);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["at"], 1250);
        assert_eq!(json["event"]["type"], "elimination_stage");
    }
}
