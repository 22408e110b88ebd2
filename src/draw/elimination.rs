//! Batch removal animation for participants eliminated by one reveal cycle.
//!
//! A batch moves `Pending -> Shake -> Shrink -> Exit` as a unit; every id in
//! the batch carries the same stage at all times. The batch holds `Pending`
//! for a short lead-in after its digit lands before shaking starts. After
//! `Exit` the ids leave the eligible list and are tagged `RecentlyEntered` on
//! the eliminated side for a short entrance grace.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::domain::ParticipantId;

use super::diff::EliminationDelta;
use super::events::TimerEvent;
use super::scheduler::{Scheduler, TimerHandle};

const LOG_TARGET: &str = "draw::elimination";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationStage {
    #[default]
    None,
    Pending,
    Shake,
    Shrink,
    Exit,
    RecentlyEntered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchStarted {
    Started {
        ids: Vec<ParticipantId>,
        dropped: Vec<ParticipantId>,
    },
    /// Nothing left to animate after dropping unknown ids.
    Empty { dropped: Vec<ParticipantId> },
    Idle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchProgress {
    Shaking { ids: Vec<ParticipantId> },
    Shrinking { ids: Vec<ParticipantId> },
    /// `Exit` reached and the ids were removed from the eligible list.
    Committed { ids: Vec<ParticipantId> },
    EntranceSettled { ids: Vec<ParticipantId> },
}

#[derive(Debug)]
struct ActiveBatch {
    id: u64,
    ids: Vec<ParticipantId>,
    handle: TimerHandle,
}

#[derive(Debug)]
struct Entrance {
    batch: u64,
    ids: Vec<ParticipantId>,
    handle: TimerHandle,
}

#[derive(Debug)]
pub struct EliminationSequencer {
    stages: BTreeMap<ParticipantId, AnimationStage>,
    queue: VecDeque<EliminationDelta>,
    active: Option<ActiveBatch>,
    entrances: Vec<Entrance>,
    next_batch: u64,
    lead_in: Duration,
    shake: Duration,
    shrink: Duration,
    entrance_grace: Duration,
}

impl EliminationSequencer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            stages: BTreeMap::new(),
            queue: VecDeque::new(),
            active: None,
            entrances: Vec::new(),
            next_batch: 0,
            lead_in: config.elimination_lead_in,
            shake: config.shake_duration,
            shrink: config.shrink_duration,
            entrance_grace: config.entrance_grace,
        }
    }

    pub fn stage(&self, id: ParticipantId) -> AnimationStage {
        self.stages.get(&id).copied().unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Flags a delta's ids before its digit has landed.
    pub fn mark_pending(&mut self, delta: &EliminationDelta) {
        for id in &delta.eliminated_ids {
            self.stages.insert(*id, AnimationStage::Pending);
        }
    }

    pub fn enqueue(&mut self, delta: EliminationDelta) {
        self.mark_pending(&delta);
        self.queue.push_back(delta);
    }

    /// Starts the next queued batch unless one is already animating.
    ///
    /// Ids that `is_known` rejects are dropped from the batch; the rest of
    /// the batch proceeds normally.
    pub fn start_next<F>(&mut self, is_known: F, sched: &mut Scheduler<TimerEvent>) -> BatchStarted
    where
        F: Fn(ParticipantId) -> bool,
    {
        if self.active.is_some() {
            return BatchStarted::Idle;
        }
        let Some(delta) = self.queue.pop_front() else {
            return BatchStarted::Idle;
        };

        let (ids, dropped): (Vec<ParticipantId>, Vec<ParticipantId>) =
            delta.eliminated_ids.iter().copied().partition(|id| is_known(*id));
        for id in &dropped {
            self.stages.remove(id);
        }
        if !dropped.is_empty() {
            warn!(
                target = LOG_TARGET,
                digit_index = delta.digit_index,
                ?dropped,
                "elimination delta references unknown participants"
            );
        }
        if ids.is_empty() {
            return BatchStarted::Empty { dropped };
        }

        let batch = self.next_batch;
        self.next_batch += 1;
        let handle = sched.schedule(self.lead_in, TimerEvent::ShakeBegin { batch });
        self.active = Some(ActiveBatch {
            id: batch,
            ids: ids.clone(),
            handle,
        });
        BatchStarted::Started { ids, dropped }
    }

    pub fn on_timer(
        &mut self,
        timer: &TimerEvent,
        sched: &mut Scheduler<TimerEvent>,
    ) -> Option<BatchProgress> {
        match *timer {
            TimerEvent::ShakeBegin { batch } => {
                let active = self.active.as_mut().filter(|a| a.id == batch)?;
                let ids = active.ids.clone();
                active.handle = sched.schedule(self.shake, TimerEvent::ShakeElapsed { batch });
                self.set_stage(&ids, AnimationStage::Shake);
                Some(BatchProgress::Shaking { ids })
            }
            TimerEvent::ShakeElapsed { batch } => {
                let active = self.active.as_mut().filter(|a| a.id == batch)?;
                let ids = active.ids.clone();
                active.handle = sched.schedule(self.shrink, TimerEvent::ShrinkElapsed { batch });
                self.set_stage(&ids, AnimationStage::Shrink);
                Some(BatchProgress::Shrinking { ids })
            }
            TimerEvent::ShrinkElapsed { batch } => {
                if self.active.as_ref().map(|a| a.id) != Some(batch) {
                    return None;
                }
                let active = self.active.take()?;
                let ids = active.ids;
                self.set_stage(&ids, AnimationStage::RecentlyEntered);
                let handle = sched.schedule(self.entrance_grace, TimerEvent::EntranceElapsed { batch });
                self.entrances.push(Entrance {
                    batch,
                    ids: ids.clone(),
                    handle,
                });
                Some(BatchProgress::Committed { ids })
            }
            TimerEvent::EntranceElapsed { batch } => {
                let index = self.entrances.iter().position(|e| e.batch == batch)?;
                let entrance = self.entrances.remove(index);
                for id in &entrance.ids {
                    if self.stages.get(id) == Some(&AnimationStage::RecentlyEntered) {
                        self.stages.remove(id);
                    }
                }
                Some(BatchProgress::EntranceSettled { ids: entrance.ids })
            }
            _ => None,
        }
    }

    /// Cancels every stage timer and clears all tags back to `None`.
    pub fn clear(&mut self, sched: &mut Scheduler<TimerEvent>) {
        if let Some(active) = self.active.take() {
            sched.cancel(active.handle);
        }
        for entrance in self.entrances.drain(..) {
            sched.cancel(entrance.handle);
        }
        self.queue.clear();
        self.stages.clear();
    }

    fn set_stage(&mut self, ids: &[ParticipantId], stage: AnimationStage) {
        for id in ids {
            self.stages.insert(*id, stage);
        }
    }
}
