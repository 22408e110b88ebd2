//! Per-position flip animation for newly revealed digits.

use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

use super::events::TimerEvent;
use super::scheduler::{Scheduler, TimerHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DigitState {
    Unrevealed,
    Spinning {
        shown: u8,
        step: u32,
        total_steps: u32,
        target: u8,
    },
    Landed {
        digit: u8,
    },
}

impl DigitState {
    /// Character currently on the flip card, if any.
    pub fn shown(&self) -> Option<char> {
        match self {
            DigitState::Unrevealed => None,
            DigitState::Spinning { shown, .. } => char::from_digit(u32::from(*shown), 10),
            DigitState::Landed { digit } => char::from_digit(u32::from(*digit), 10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinProgress {
    Step { position: usize, shown: char },
    Landed { position: usize, digit: char },
}

#[derive(Debug)]
pub struct DigitRevealSequencer {
    positions: Vec<DigitState>,
    animated: Vec<bool>,
    handles: Vec<Option<TimerHandle>>,
    steps_min: u32,
    steps_max: u32,
    base_delay: Duration,
    delay_increment: Duration,
    rng: StdRng,
}

impl DigitRevealSequencer {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = config
            .rng_seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);
        Self {
            positions: Vec::new(),
            animated: Vec::new(),
            handles: Vec::new(),
            steps_min: config.spin_steps_min,
            steps_max: config.spin_steps_max.max(config.spin_steps_min),
            base_delay: config.spin_base_delay,
            delay_increment: config.spin_delay_increment,
            rng,
        }
    }

    pub fn positions(&self) -> &[DigitState] {
        &self.positions
    }

    pub fn state(&self, position: usize) -> Option<DigitState> {
        self.positions.get(position).copied()
    }

    pub fn is_spinning(&self) -> bool {
        self.handles.iter().any(Option::is_some)
    }

    /// Lands every already revealed digit without animating it and marks
    /// those positions as done, so a rebuilt view never replays them.
    pub fn restore(&mut self, ticket_digits: u32, revealed: &str, sched: &mut Scheduler<TimerEvent>) {
        self.cancel(sched);
        let width = (ticket_digits as usize).max(revealed.len());
        self.positions = vec![DigitState::Unrevealed; width];
        self.animated = vec![false; width];
        self.handles = vec![None; width];
        for (position, ch) in revealed.chars().enumerate() {
            if let Some(digit) = ch.to_digit(10) {
                self.positions[position] = DigitState::Landed { digit: digit as u8 };
                self.animated[position] = true;
            }
        }
    }

    /// Starts the flip for `position`. Returns `false` if that position has
    /// already animated or the character is not a digit.
    pub fn begin(
        &mut self,
        position: usize,
        target: char,
        sched: &mut Scheduler<TimerEvent>,
    ) -> bool {
        let Some(target) = target.to_digit(10) else {
            return false;
        };
        if position >= self.positions.len() {
            self.positions.resize(position + 1, DigitState::Unrevealed);
            self.animated.resize(position + 1, false);
            self.handles.resize(position + 1, None);
        }
        if self.animated[position] {
            return false;
        }
        self.animated[position] = true;

        let total_steps = self.rng.gen_range(self.steps_min..=self.steps_max);
        let shown = self.rng.gen_range(0..10u8);
        self.positions[position] = DigitState::Spinning {
            shown,
            step: 0,
            total_steps,
            target: target as u8,
        };
        self.handles[position] =
            Some(sched.schedule(self.step_delay(0), TimerEvent::DigitStep { position }));
        true
    }

    /// Advances one step of the walk; the terminal step always shows the target.
    pub fn on_step(
        &mut self,
        position: usize,
        sched: &mut Scheduler<TimerEvent>,
    ) -> Option<SpinProgress> {
        let slot = self.handles.get_mut(position)?;
        slot.take()?;

        let DigitState::Spinning {
            shown,
            step,
            total_steps,
            target,
        } = self.positions[position]
        else {
            return None;
        };

        let step = step + 1;
        if step >= total_steps {
            self.positions[position] = DigitState::Landed { digit: target };
            let digit = char::from_digit(u32::from(target), 10)?;
            return Some(SpinProgress::Landed { position, digit });
        }

        let next = (shown + self.rng.gen_range(1..10u8)) % 10;
        self.positions[position] = DigitState::Spinning {
            shown: next,
            step,
            total_steps,
            target,
        };
        self.handles[position] =
            Some(sched.schedule(self.step_delay(step), TimerEvent::DigitStep { position }));
        let shown = char::from_digit(u32::from(next), 10)?;
        Some(SpinProgress::Step { position, shown })
    }

    pub fn cancel(&mut self, sched: &mut Scheduler<TimerEvent>) {
        for slot in self.handles.iter_mut() {
            if let Some(handle) = slot.take() {
                sched.cancel(handle);
            }
        }
    }

    fn step_delay(&self, step: u32) -> Duration {
        self.base_delay + self.delay_increment * step
    }
}
