//! Common test utilities for drawing engine and backend tests.

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }

    /// Assert that serde_json emits the same payload before and after round-tripping.
    pub fn assert_round_trip_json<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned,
    {
        let json = serde_json::to_value(value)
            .expect("serialization to value should succeed during round-trip testing");
        let restored: T = serde_json::from_value(json.clone())
            .expect("deserialization from value should succeed during round-trip testing");
        let json_after = serde_json::to_value(restored)
            .expect("re-serialization should succeed during round-trip testing");
        assert_eq!(
            json_after, json,
            "serde_json round-trip altered the payload"
        );
    }
}

/// Snapshot builders.
pub mod fixtures {
    use crate::domain::{
        DrawSession, DrawStatus, Participant, ParticipantId, Snapshot, TicketNumber,
    };

    /// Eligible participant holding `start..=end`.
    pub fn participant(id: ParticipantId, start: TicketNumber, end: TicketNumber) -> Participant {
        Participant {
            id,
            name: format!("P{id}"),
            ticket_start: start,
            ticket_end: end,
            total_tickets: end - start + 1,
            is_still_eligible: true,
            is_winner: false,
        }
    }

    pub fn snapshot(
        ticket_digits: u32,
        revealed: &str,
        status: DrawStatus,
        participants: Vec<Participant>,
    ) -> Snapshot {
        Snapshot {
            session: DrawSession {
                id: 1,
                ticket_digits,
                revealed_digits: revealed.to_string(),
                status,
                winning_number: None,
            },
            participants,
            prizes: Vec::new(),
        }
    }

    /// Copy of `base` at `revealed`, with everyone outside `survivors` ineligible.
    pub fn advance(base: &Snapshot, revealed: &str, survivors: &[ParticipantId]) -> Snapshot {
        let mut next = base.clone();
        next.session.revealed_digits = revealed.to_string();
        for p in next.participants.iter_mut() {
            p.is_still_eligible = p.is_still_eligible && survivors.contains(&p.id);
        }
        next
    }

    /// Marks `winner` as the drawn participant and completes the session.
    pub fn complete(base: &Snapshot, revealed: &str, winner: ParticipantId) -> Snapshot {
        let mut next = advance(base, revealed, &[winner]);
        next.session.status = DrawStatus::Completed;
        next.session.winning_number = revealed.parse().ok();
        for p in next.participants.iter_mut() {
            p.is_winner = p.id == winner;
        }
        next
    }
}
