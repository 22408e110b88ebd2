//! Point-in-time drawing state as returned by the drawing backend.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::tickets::{format_ticket, is_prefix_of_ticket};
use super::{DrawStatus, ParticipantId, PrizeId, SessionId, TicketNumber};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawSession {
    pub id: SessionId,
    pub ticket_digits: u32,
    #[serde(default)]
    pub revealed_digits: String,
    pub status: DrawStatus,
    #[serde(default)]
    pub winning_number: Option<TicketNumber>,
}

impl DrawSession {
    pub fn revealed_len(&self) -> usize {
        self.revealed_digits.chars().count()
    }

    pub fn revealed_digit(&self, index: usize) -> Option<char> {
        self.revealed_digits.chars().nth(index)
    }

    pub fn is_fully_revealed(&self) -> bool {
        self.revealed_len() == self.ticket_digits as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(default)]
    pub name: String,
    pub ticket_start: TicketNumber,
    pub ticket_end: TicketNumber,
    pub total_tickets: u64,
    pub is_still_eligible: bool,
    #[serde(default)]
    pub is_winner: bool,
}

impl Participant {
    pub fn holds_ticket(&self, ticket: TicketNumber) -> bool {
        self.ticket_start <= ticket && ticket <= self.ticket_end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: PrizeId,
    pub name: String,
    #[serde(default)]
    pub rank: u32,
}

/// One fetched copy of session, participants and prizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub session: DrawSession,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub prizes: Vec<Prize>,
}

impl Snapshot {
    /// Eligible ids in participant-list order.
    pub fn eligible_ids(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.is_still_eligible)
            .map(|p| p.id)
            .collect()
    }

    pub fn eligible_set(&self) -> BTreeSet<ParticipantId> {
        self.eligible_ids().into_iter().collect()
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participant(id).is_some()
    }

    pub fn winner(&self) -> Option<&Participant> {
        self.participants.iter().find(|p| p.is_winner)
    }

    pub fn remaining_people(&self) -> u64 {
        self.participants
            .iter()
            .filter(|p| p.is_still_eligible)
            .count() as u64
    }

    pub fn remaining_tickets(&self) -> u64 {
        self.participants
            .iter()
            .filter(|p| p.is_still_eligible)
            .map(|p| p.total_tickets)
            .sum()
    }

    /// Checks the server-side invariants of a single snapshot.
    pub fn validate_invariants(&self) -> Result<(), SnapshotInvariantError> {
        let session = &self.session;
        let revealed = session.revealed_len();
        if revealed > session.ticket_digits as usize {
            return Err(SnapshotInvariantError::TooManyDigits {
                revealed,
                ticket_digits: session.ticket_digits,
            });
        }
        if !session.revealed_digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(SnapshotInvariantError::NonDecimalDigits(
                session.revealed_digits.clone(),
            ));
        }
        if let Some(winning) = session.winning_number {
            if !is_prefix_of_ticket(&session.revealed_digits, winning, session.ticket_digits) {
                return Err(SnapshotInvariantError::PrefixMismatch {
                    revealed: session.revealed_digits.clone(),
                    winning: format_ticket(winning, session.ticket_digits),
                });
            }
        }

        let winners = self.participants.iter().filter(|p| p.is_winner).count();
        match session.status {
            DrawStatus::Completed if winners != 1 => {
                return Err(SnapshotInvariantError::WinnerCount(winners));
            }
            DrawStatus::Active | DrawStatus::Drawing if winners != 0 => {
                return Err(SnapshotInvariantError::WinnerCount(winners));
            }
            _ => {}
        }

        let mut ranges: Vec<(TicketNumber, TicketNumber, ParticipantId)> = self
            .participants
            .iter()
            .map(|p| (p.ticket_start, p.ticket_end, p.id))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            if pair[1].0 <= pair[0].1 {
                return Err(SnapshotInvariantError::OverlappingTickets(pair[0].2, pair[1].2));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotInvariantError {
    #[error("{revealed} digits revealed but ticket width is {ticket_digits}")]
    TooManyDigits { revealed: usize, ticket_digits: u32 },
    #[error("revealed digits {0:?} are not decimal")]
    NonDecimalDigits(String),
    #[error("revealed digits {revealed:?} are not a prefix of {winning}")]
    PrefixMismatch { revealed: String, winning: String },
    #[error("unexpected winner count {0}")]
    WinnerCount(usize),
    #[error("participants {0} and {1} hold overlapping tickets")]
    OverlappingTickets(ParticipantId, ParticipantId),
}
