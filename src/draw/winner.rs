use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::{DrawStatus, ParticipantId};

use super::events::TimerEvent;
use super::scheduler::{Scheduler, TimerHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerStage {
    #[default]
    Hidden,
    Dark,
    Spotlight,
    CardReveal,
    Visible,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WinnerSignal {
    Quiet,
    /// First observation of a completed drawing with a winner.
    Fire(ParticipantId),
    /// Status left `Completed`; the latch is armed again.
    Rearmed,
}

/// One-shot winner reveal, latched per completed drawing.
#[derive(Debug)]
pub struct WinnerPresenter {
    latched: bool,
    deferred: bool,
    winner: Option<ParticipantId>,
    stage: WinnerStage,
    handle: Option<TimerHandle>,
    dark: Duration,
    spotlight: Duration,
    card_reveal: Duration,
}

impl WinnerPresenter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            latched: false,
            deferred: false,
            winner: None,
            stage: WinnerStage::Hidden,
            handle: None,
            dark: config.winner_dark,
            spotlight: config.winner_spotlight,
            card_reveal: config.winner_card_reveal,
        }
    }

    pub fn stage(&self) -> WinnerStage {
        self.stage
    }

    pub fn winner(&self) -> Option<ParticipantId> {
        self.winner
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Latches silently when a session is first seen already completed, so
    /// reloading a finished drawing does not replay the reveal.
    pub fn prime(&mut self, status: DrawStatus, winner: Option<ParticipantId>) {
        self.latched = status == DrawStatus::Completed;
        self.winner = if self.latched { winner } else { None };
    }

    pub fn observe(
        &mut self,
        status: DrawStatus,
        winner: Option<ParticipantId>,
        sched: &mut Scheduler<TimerEvent>,
    ) -> WinnerSignal {
        match (status, winner) {
            (DrawStatus::Completed, Some(id)) if !self.latched => {
                self.latched = true;
                self.winner = Some(id);
                WinnerSignal::Fire(id)
            }
            (DrawStatus::Completed, _) => WinnerSignal::Quiet,
            _ if self.latched => {
                self.reset(sched);
                WinnerSignal::Rearmed
            }
            _ => WinnerSignal::Quiet,
        }
    }

    /// Holds a fired presentation until the reveal pipeline drains.
    pub fn defer(&mut self) {
        self.deferred = true;
    }

    pub fn take_deferred(&mut self) -> bool {
        std::mem::take(&mut self.deferred)
    }

    /// Starts the dark stage. Returns `false` without a known winner.
    pub fn present(&mut self, sched: &mut Scheduler<TimerEvent>) -> bool {
        if self.winner.is_none() {
            return false;
        }
        self.deferred = false;
        self.enter(WinnerStage::Dark, sched);
        true
    }

    /// Explicit user replay; bypasses the latch.
    pub fn replay(&mut self, sched: &mut Scheduler<TimerEvent>) -> bool {
        self.present(sched)
    }

    pub fn dismiss(&mut self, sched: &mut Scheduler<TimerEvent>) -> bool {
        self.deferred = false;
        if self.stage == WinnerStage::Hidden {
            return false;
        }
        self.cancel(sched);
        self.stage = WinnerStage::Hidden;
        true
    }

    pub fn on_stage_elapsed(&mut self, sched: &mut Scheduler<TimerEvent>) -> Option<WinnerStage> {
        self.handle.take()?;
        let next = match self.stage {
            WinnerStage::Dark => WinnerStage::Spotlight,
            WinnerStage::Spotlight => WinnerStage::CardReveal,
            WinnerStage::CardReveal => WinnerStage::Visible,
            WinnerStage::Hidden | WinnerStage::Visible => return None,
        };
        self.enter(next, sched);
        Some(next)
    }

    /// Hides the overlay and rearms the latch.
    pub fn reset(&mut self, sched: &mut Scheduler<TimerEvent>) {
        self.cancel(sched);
        self.latched = false;
        self.deferred = false;
        self.winner = None;
        self.stage = WinnerStage::Hidden;
    }

    fn enter(&mut self, stage: WinnerStage, sched: &mut Scheduler<TimerEvent>) {
        self.cancel(sched);
        self.stage = stage;
        let hold = match stage {
            WinnerStage::Dark => Some(self.dark),
            WinnerStage::Spotlight => Some(self.spotlight),
            WinnerStage::CardReveal => Some(self.card_reveal),
            WinnerStage::Hidden | WinnerStage::Visible => None,
        };
        if let Some(hold) = hold {
            self.handle = Some(sched.schedule(hold, TimerEvent::WinnerStageElapsed));
        }
    }

    fn cancel(&mut self, sched: &mut Scheduler<TimerEvent>) {
        if let Some(handle) = self.handle.take() {
            sched.cancel(handle);
        }
    }
}
