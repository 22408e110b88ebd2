//! Displayed "people remaining" / "tickets remaining" counters and the
//! survivor glow.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::domain::ParticipantId;

use super::events::TimerEvent;
use super::scheduler::{Scheduler, TimerHandle};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimatedCounter {
    displayed: u64,
    from: u64,
    target: u64,
}

impl AnimatedCounter {
    pub fn displayed(&self) -> u64 {
        self.displayed
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    fn retarget(&mut self, target: u64) {
        self.from = self.displayed;
        self.target = target;
    }

    fn jump(&mut self, value: u64) {
        self.displayed = value;
        self.from = value;
        self.target = value;
    }

    fn distance(&self) -> u64 {
        self.from.abs_diff(self.target)
    }

    fn apply(&mut self, eased: f64) {
        let delta = self.target as f64 - self.from as f64;
        let value = (self.from as f64 + delta * eased).round();
        self.displayed = value.max(0.0) as u64;
    }
}

/// Ease-out cubic: fast start, gentle landing.
pub fn ease_out_cubic(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powi(3)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterFrame {
    pub people: u64,
    pub tickets: u64,
    pub settled: bool,
}

#[derive(Debug)]
pub struct CounterReconciler {
    people: AnimatedCounter,
    tickets: AnimatedCounter,
    step: u32,
    steps: u32,
    handle: Option<TimerHandle>,
    max_steps: u32,
    frame: Duration,
}

impl CounterReconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            people: AnimatedCounter::default(),
            tickets: AnimatedCounter::default(),
            step: 0,
            steps: 0,
            handle: None,
            max_steps: config.counter_max_steps.max(1),
            frame: config.counter_frame,
        }
    }

    pub fn people(&self) -> u64 {
        self.people.displayed()
    }

    pub fn tickets(&self) -> u64 {
        self.tickets.displayed()
    }

    pub fn is_animating(&self) -> bool {
        self.handle.is_some()
    }

    /// Snaps both counters, cancelling any running interpolation.
    pub fn set_immediate(&mut self, people: u64, tickets: u64, sched: &mut Scheduler<TimerEvent>) {
        self.stop(sched);
        self.people.jump(people);
        self.tickets.jump(tickets);
    }

    /// Interpolates from the displayed values toward the targets over at most
    /// `max_steps` frames. Returns `false` when already on target.
    pub fn update(
        &mut self,
        target_people: u64,
        target_tickets: u64,
        sched: &mut Scheduler<TimerEvent>,
    ) -> bool {
        self.stop(sched);
        self.people.retarget(target_people);
        self.tickets.retarget(target_tickets);

        let distance = self.people.distance().max(self.tickets.distance());
        if distance == 0 {
            return false;
        }
        self.steps = distance.min(u64::from(self.max_steps)) as u32;
        self.step = 0;
        self.handle = Some(sched.schedule(self.frame, TimerEvent::CounterFrame));
        true
    }

    pub fn on_frame(&mut self, sched: &mut Scheduler<TimerEvent>) -> Option<CounterFrame> {
        self.handle.take()?;
        self.step += 1;
        let settled = self.step >= self.steps;
        if settled {
            self.people.jump(self.people.target());
            self.tickets.jump(self.tickets.target());
        } else {
            let eased = ease_out_cubic(f64::from(self.step) / f64::from(self.steps));
            self.people.apply(eased);
            self.tickets.apply(eased);
            self.handle = Some(sched.schedule(self.frame, TimerEvent::CounterFrame));
        }
        Some(CounterFrame {
            people: self.people.displayed(),
            tickets: self.tickets.displayed(),
            settled,
        })
    }

    pub fn stop(&mut self, sched: &mut Scheduler<TimerEvent>) {
        if let Some(handle) = self.handle.take() {
            sched.cancel(handle);
        }
    }
}

/// Best-effort highlight of participants that survived the last reveal.
#[derive(Debug)]
pub struct SurvivorGlow {
    ids: BTreeSet<ParticipantId>,
    handle: Option<TimerHandle>,
    duration: Duration,
}

impl SurvivorGlow {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ids: BTreeSet::new(),
            handle: None,
            duration: config.glow_duration,
        }
    }

    pub fn is_glowing(&self, id: ParticipantId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &BTreeSet<ParticipantId> {
        &self.ids
    }

    /// Replaces any running glow with `ids`, restarting the fade timer.
    pub fn apply<I>(&mut self, ids: I, sched: &mut Scheduler<TimerEvent>)
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        self.clear(sched);
        self.ids = ids.into_iter().collect();
        if !self.ids.is_empty() {
            self.handle = Some(sched.schedule(self.duration, TimerEvent::GlowElapsed));
        }
    }

    /// Returns `true` if a glow was actually cleared by this timer.
    pub fn on_elapsed(&mut self) -> bool {
        if self.handle.take().is_none() {
            return false;
        }
        self.ids.clear();
        true
    }

    pub fn clear(&mut self, sched: &mut Scheduler<TimerEvent>) {
        if let Some(handle) = self.handle.take() {
            sched.cancel(handle);
        }
        self.ids.clear();
    }
}
