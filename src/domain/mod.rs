//! Core domain types for the raffle drawing backend contract

use serde::{Deserialize, Serialize};

pub mod snapshot;
pub mod tickets;

pub use snapshot::*;
pub use tickets::*;

/// ---------- Common type aliases ----------
pub type SessionId = i64;
pub type ParticipantId = i64;
pub type PrizeId = i64;
pub type TicketNumber = u64;

/// ---------- Enums ----------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawStatus {
    Active,
    Drawing,
    Completed,
}

impl DrawStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawStatus::Active => "active",
            DrawStatus::Drawing => "drawing",
            DrawStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Imperative commands the operator can issue against a drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawCommand {
    Start,
    RevealNext,
    Reset,
}

impl DrawCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawCommand::Start => "start",
            DrawCommand::RevealNext => "reveal_next",
            DrawCommand::Reset => "reset",
        }
    }

    /// Session-boundary commands rebaseline the engine instead of diffing.
    pub fn is_session_boundary(&self) -> bool {
        matches!(self, DrawCommand::Start | DrawCommand::Reset)
    }
}

impl std::fmt::Display for DrawCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
