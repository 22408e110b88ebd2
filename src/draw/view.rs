use serde::{Deserialize, Serialize};

use crate::domain::{DrawStatus, ParticipantId, SessionId};

use super::digits::DigitState;
use super::elimination::AnimationStage;
use super::gateway::{CommandFailure, GatewayState};
use super::winner::WinnerStage;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: ParticipantId,
    pub name: String,
    pub total_tickets: u64,
    pub stage: AnimationStage,
    pub survived: bool,
    pub is_winner: bool,
}

/// Everything a renderer needs for one frame of the drawing screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawView {
    pub session_id: Option<SessionId>,
    pub status: Option<DrawStatus>,
    pub ticket_digits: u32,
    pub digits: Vec<DigitState>,
    pub eligible: Vec<ParticipantView>,
    pub eliminated: Vec<ParticipantView>,
    pub remaining_people: u64,
    pub remaining_tickets: u64,
    pub winner_stage: WinnerStage,
    pub winner: Option<ParticipantId>,
    pub gateway: GatewayState,
    pub can_start: bool,
    pub can_reveal: bool,
    pub can_reset: bool,
    pub error: Option<CommandFailure>,
}

impl Default for DrawView {
    fn default() -> Self {
        Self {
            session_id: None,
            status: None,
            ticket_digits: 0,
            digits: Vec::new(),
            eligible: Vec::new(),
            eliminated: Vec::new(),
            remaining_people: 0,
            remaining_tickets: 0,
            winner_stage: WinnerStage::Hidden,
            winner: None,
            gateway: GatewayState::Idle,
            can_start: false,
            can_reveal: false,
            can_reset: false,
            error: None,
        }
    }
}

impl DrawView {
    /// Text currently on the digit cards, `_` for unrevealed positions.
    pub fn digit_strip(&self) -> String {
        self.digits
            .iter()
            .map(|d| d.shown().unwrap_or('_'))
            .collect()
    }

    pub fn stage_of(&self, id: ParticipantId) -> AnimationStage {
        self.eligible
            .iter()
            .chain(self.eliminated.iter())
            .find(|p| p.id == id)
            .map(|p| p.stage)
            .unwrap_or_default()
    }
}
