//! Reconciliation engine: turns successive authoritative snapshots and
//! command results into a serialized presentation timeline.
//!
//! The engine is a deterministic state machine over a virtual clock. Callers
//! feed it snapshots and command outcomes and advance its clock; it reports
//! what to animate through [`TimedEvent`]s and [`DrawView`].

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{DrawCommand, DrawStatus, ParticipantId, Snapshot};

use super::counters::{CounterReconciler, SurvivorGlow};
use super::diff::{DiffEngine, EliminationDelta};
use super::digits::{DigitRevealSequencer, SpinProgress};
use super::elimination::{AnimationStage, BatchProgress, BatchStarted, EliminationSequencer};
use super::events::{EngineEvent, RebaselineReason, TimedEvent, TimerEvent};
use super::gateway::{CommandGateway, CommandTicket, GatewayError};
use super::scheduler::Scheduler;
use super::view::{DrawView, ParticipantView};
use super::winner::{WinnerPresenter, WinnerSignal, WinnerStage};

const LOG_TARGET: &str = "draw::engine";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Disposed,
    Unchanged,
    Stale,
    Refreshed,
    Rebaselined(RebaselineReason),
    Progressed { new_digits: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Classification {
    Unchanged,
    Stale,
    Refresh,
    Progress,
    Boundary(RebaselineReason),
}

fn cycle_totals(snapshot: &Snapshot, survivors: &[ParticipantId]) -> (u64, u64) {
    let survivor_set: BTreeSet<ParticipantId> = survivors.iter().copied().collect();
    let tickets = snapshot
        .participants
        .iter()
        .filter(|p| survivor_set.contains(&p.id))
        .map(|p| p.total_tickets)
        .sum();
    (survivors.len() as u64, tickets)
}

fn classify(current: &Snapshot, next: &Snapshot) -> Classification {
    if current == next {
        return Classification::Unchanged;
    }
    let (cur, new) = (&current.session, &next.session);
    if cur.id != new.id || cur.ticket_digits != new.ticket_digits {
        return Classification::Boundary(RebaselineReason::SessionChanged);
    }
    if new.status == DrawStatus::Active && cur.status != DrawStatus::Active {
        return Classification::Boundary(RebaselineReason::ResetObserved);
    }
    let (cur_rev, new_rev) = (&cur.revealed_digits, &new.revealed_digits);
    if new_rev == cur_rev {
        return Classification::Refresh;
    }
    if new_rev.starts_with(cur_rev.as_str()) {
        return Classification::Progress;
    }
    if new_rev.is_empty() {
        return Classification::Boundary(RebaselineReason::ResetObserved);
    }
    if cur_rev.starts_with(new_rev.as_str()) {
        // A shorter reveal that brings eliminated participants back is a
        // restarted drawing, not a late response.
        let reinstated = next.participants.iter().any(|p| {
            p.is_still_eligible
                && current
                    .participant(p.id)
                    .is_some_and(|seen| !seen.is_still_eligible)
        });
        if reinstated {
            return Classification::Boundary(RebaselineReason::ResetObserved);
        }
        return Classification::Stale;
    }
    Classification::Boundary(RebaselineReason::Diverged)
}

/// Work unit for one newly known digit position.
#[derive(Debug)]
struct RevealCycle {
    position: usize,
    digit: char,
    /// `false` when the digit is already on screen and only its
    /// eliminations remain.
    spin: bool,
    delta: Option<EliminationDelta>,
    survivors: Vec<ParticipantId>,
    totals: Option<(u64, u64)>,
}

pub struct DrawingEngine {
    scheduler: Scheduler<TimerEvent>,
    snapshot: Option<Snapshot>,
    diff: DiffEngine,
    digits: DigitRevealSequencer,
    eliminations: EliminationSequencer,
    counters: CounterReconciler,
    glow: SurvivorGlow,
    winner: WinnerPresenter,
    gateway: CommandGateway,
    pending_cycles: VecDeque<RevealCycle>,
    active_cycle: Option<RevealCycle>,
    rendered_eligible: Vec<ParticipantId>,
    eliminated: Vec<ParticipantId>,
    events: Vec<TimedEvent>,
    disposed: bool,
}

impl DrawingEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &EngineConfig) -> Self {
        Self {
            scheduler: Scheduler::new(),
            snapshot: None,
            diff: DiffEngine::new(),
            digits: DigitRevealSequencer::new(config),
            eliminations: EliminationSequencer::new(config),
            counters: CounterReconciler::new(config),
            glow: SurvivorGlow::new(config),
            winner: WinnerPresenter::new(config),
            gateway: CommandGateway::new(),
            pending_cycles: VecDeque::new(),
            active_cycle: None,
            rendered_eligible: Vec::new(),
            eliminated: Vec::new(),
            events: Vec::new(),
            disposed: false,
        }
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// True from the moment a new digit is accepted until its eliminations
    /// are committed.
    pub fn is_pipeline_busy(&self) -> bool {
        self.active_cycle.is_some() || !self.pending_cycles.is_empty() || self.eliminations.is_busy()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.scheduler.next_deadline()
    }

    pub fn drain_events(&mut self) -> Vec<TimedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Fires every timer due at or before `now`, in deadline order.
    pub fn advance_to(&mut self, now: Duration) {
        if self.disposed {
            return;
        }
        while let Some((_, timer)) = self.scheduler.pop_due(now) {
            self.on_timer(timer);
        }
        self.scheduler.advance_to(now);
    }

    /// Accepts a polled snapshot.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> SnapshotOutcome {
        if self.disposed {
            return SnapshotOutcome::Disposed;
        }
        if let Err(err) = snapshot.validate_invariants() {
            warn!(target = LOG_TARGET, error = %err, "snapshot violates drawing invariants");
        }

        let Some(current) = self.snapshot.as_ref() else {
            return self.rebaseline(snapshot, RebaselineReason::Initial);
        };

        match classify(current, &snapshot) {
            Classification::Unchanged => SnapshotOutcome::Unchanged,
            Classification::Stale => {
                debug!(
                    target = LOG_TARGET,
                    revealed = %snapshot.session.revealed_digits,
                    "dropping stale snapshot"
                );
                self.emit(EngineEvent::StaleSnapshotDropped {
                    revealed: snapshot.session.revealed_digits,
                });
                SnapshotOutcome::Stale
            }
            Classification::Refresh => {
                self.accept(snapshot);
                self.reconcile_eligibility();
                self.observe_winner();
                SnapshotOutcome::Refreshed
            }
            Classification::Boundary(reason) => self.rebaseline(snapshot, reason),
            Classification::Progress => self.progress(snapshot),
        }
    }

    /// Admits a command through the gateway.
    pub fn begin_command(&mut self, command: DrawCommand) -> Result<CommandTicket, GatewayError> {
        if self.disposed {
            return Err(GatewayError::Disposed);
        }
        let ticket = self.gateway.try_issue(command, self.is_pipeline_busy())?;
        self.emit(EngineEvent::CommandIssued { command });
        Ok(ticket)
    }

    /// Applies an authoritative command response. Returns `false` for a
    /// ticket that is no longer current.
    pub fn complete_command(&mut self, ticket: &CommandTicket, snapshot: Snapshot) -> bool {
        if self.disposed || !self.gateway.is_current(ticket) {
            return false;
        }
        if ticket.command.is_session_boundary() {
            let reason = match ticket.command {
                DrawCommand::Start => RebaselineReason::Started,
                _ => RebaselineReason::Reset,
            };
            self.rebaseline(snapshot, reason);
        } else {
            self.apply_snapshot(snapshot);
        }

        let busy = self.is_pipeline_busy();
        self.gateway.succeeded(ticket, busy);
        info!(
            target = LOG_TARGET,
            command = %ticket.command,
            awaiting_pipeline = busy,
            "command succeeded"
        );
        self.emit(EngineEvent::CommandSucceeded {
            command: ticket.command,
        });
        if !self.gateway.is_locked() {
            self.emit(EngineEvent::GatewayUnlocked);
        }
        true
    }

    pub fn fail_command(&mut self, ticket: &CommandTicket, message: impl Into<String>) -> bool {
        if self.disposed {
            return false;
        }
        let message = message.into();
        let busy = self.is_pipeline_busy();
        if !self.gateway.failed(ticket, message.clone(), busy) {
            return false;
        }
        warn!(
            target = LOG_TARGET,
            command = %ticket.command,
            %message,
            "command failed"
        );
        self.emit(EngineEvent::CommandFailed {
            command: ticket.command,
            message,
        });
        if !self.gateway.is_locked() {
            self.emit(EngineEvent::GatewayUnlocked);
        }
        true
    }

    pub fn dismiss_error(&mut self) -> bool {
        self.gateway.dismiss_error()
    }

    pub fn dismiss_winner(&mut self) -> bool {
        if !self.winner.dismiss(&mut self.scheduler) {
            return false;
        }
        self.emit_winner_stage();
        true
    }

    /// Explicit operator replay of the winner reveal.
    pub fn replay_winner(&mut self) -> bool {
        if self.disposed || !self.winner.replay(&mut self.scheduler) {
            return false;
        }
        self.emit_winner_stage();
        true
    }

    /// Drops every baseline, latch and pending timer. The next snapshot is
    /// treated as a first load.
    pub fn reset(&mut self) {
        if self.disposed {
            return;
        }
        self.clear_presentation();
        self.scheduler.cancel_all();
        self.snapshot = None;
        self.diff.clear();
        self.rendered_eligible.clear();
        self.eliminated.clear();
        self.gateway.abandon();
        self.counters.set_immediate(0, 0, &mut self.scheduler);
    }

    /// Tears the engine down; nothing mutates afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear_presentation();
        self.scheduler.close();
        self.gateway.abandon();
        self.emit(EngineEvent::Disposed);
        self.disposed = true;
    }

    pub fn stage_of(&self, id: ParticipantId) -> AnimationStage {
        self.eliminations.stage(id)
    }

    pub fn view(&self) -> DrawView {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return DrawView {
                gateway: self.gateway.state(),
                error: self.gateway.last_error().cloned(),
                ..DrawView::default()
            };
        };

        let participant_view = |id: &ParticipantId| {
            let participant = snapshot.participant(*id);
            ParticipantView {
                id: *id,
                name: participant.map(|p| p.name.clone()).unwrap_or_default(),
                total_tickets: participant.map(|p| p.total_tickets).unwrap_or_default(),
                stage: self.eliminations.stage(*id),
                survived: self.glow.is_glowing(*id),
                is_winner: participant.map(|p| p.is_winner).unwrap_or(false),
            }
        };

        let session = &snapshot.session;
        let busy = self.is_pipeline_busy();
        DrawView {
            session_id: Some(session.id),
            status: Some(session.status),
            ticket_digits: session.ticket_digits,
            digits: self.digits.positions().to_vec(),
            eligible: self.rendered_eligible.iter().map(participant_view).collect(),
            eliminated: self.eliminated.iter().map(participant_view).collect(),
            remaining_people: self.counters.people(),
            remaining_tickets: self.counters.tickets(),
            winner_stage: self.winner.stage(),
            winner: self.winner.winner(),
            gateway: self.gateway.state(),
            can_start: session.status == DrawStatus::Active
                && self.gateway.can_issue(DrawCommand::Start, busy),
            can_reveal: session.status == DrawStatus::Drawing
                && !session.is_fully_revealed()
                && self.gateway.can_issue(DrawCommand::RevealNext, busy),
            can_reset: self.gateway.can_issue(DrawCommand::Reset, busy),
            error: self.gateway.last_error().cloned(),
        }
    }

    fn emit(&mut self, event: EngineEvent) {
        self.events.push(TimedEvent {
            at: self.scheduler.now(),
            event,
        });
    }

    fn emit_winner_stage(&mut self) {
        let event = EngineEvent::WinnerStage {
            stage: self.winner.stage(),
            participant: self.winner.winner(),
        };
        self.emit(event);
    }

    fn accept(&mut self, snapshot: Snapshot) {
        self.emit(EngineEvent::SnapshotAccepted {
            revealed: snapshot.session.revealed_digits.clone(),
            status: snapshot.session.status,
        });
        self.snapshot = Some(snapshot);
    }

    fn clear_presentation(&mut self) {
        let sched = &mut self.scheduler;
        self.pending_cycles.clear();
        self.active_cycle = None;
        self.digits.cancel(sched);
        self.eliminations.clear(sched);
        self.glow.clear(sched);
        self.counters.stop(sched);
        self.winner.reset(sched);
    }

    /// Takes `snapshot` as ground truth without diffing: session boundaries
    /// and first loads land here.
    fn rebaseline(&mut self, snapshot: Snapshot, reason: RebaselineReason) -> SnapshotOutcome {
        self.clear_presentation();
        self.scheduler.cancel_all();

        let session = &snapshot.session;
        self.digits
            .restore(session.ticket_digits, &session.revealed_digits, &mut self.scheduler);
        self.counters.set_immediate(
            snapshot.remaining_people(),
            snapshot.remaining_tickets(),
            &mut self.scheduler,
        );
        self.winner
            .prime(session.status, snapshot.winner().map(|p| p.id));
        self.diff.rebaseline(&snapshot);
        self.rendered_eligible = snapshot.eligible_ids();
        self.eliminated = snapshot
            .participants
            .iter()
            .filter(|p| !p.is_still_eligible)
            .map(|p| p.id)
            .collect();

        info!(
            target = LOG_TARGET,
            ?reason,
            session_id = session.id,
            status = %session.status,
            revealed = %session.revealed_digits,
            "rebaselined drawing state"
        );
        self.emit(EngineEvent::Rebaselined {
            reason,
            revealed: session.revealed_digits.clone(),
        });
        self.emit(EngineEvent::CountersSettled {
            people: self.counters.people(),
            tickets: self.counters.tickets(),
        });
        self.snapshot = Some(snapshot);
        self.on_pipeline_drained();
        SnapshotOutcome::Rebaselined(reason)
    }

    fn progress(&mut self, snapshot: Snapshot) -> SnapshotOutcome {
        let Some(outcome) = self.diff.diff(&snapshot) else {
            self.accept(snapshot);
            return SnapshotOutcome::Refreshed;
        };
        if !outcome.reappeared.is_empty() {
            warn!(
                target = LOG_TARGET,
                reappeared = ?outcome.reappeared,
                "participants regained eligibility without a reset; keeping them eliminated"
            );
        }

        let totals = cycle_totals(&snapshot, &outcome.survivors);

        let new_digits = outcome.revealed.len();
        let mut delta = outcome.delta;
        if let Some(delta) = delta.as_ref() {
            self.eliminations.mark_pending(delta);
        }
        for (i, digit) in outcome.revealed.iter().enumerate() {
            let last = i + 1 == new_digits;
            self.pending_cycles.push_back(RevealCycle {
                position: digit.index,
                digit: digit.value,
                spin: true,
                delta: if last { delta.take() } else { None },
                survivors: if last {
                    outcome.survivors.clone()
                } else {
                    Vec::new()
                },
                totals: last.then_some(totals),
            });
        }

        debug!(
            target = LOG_TARGET,
            revealed = %snapshot.session.revealed_digits,
            new_digits,
            "queued reveal cycles"
        );
        self.accept(snapshot);
        self.observe_winner();
        self.pump_cycles();
        SnapshotOutcome::Progressed { new_digits }
    }

    fn observe_winner(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        let status = snapshot.session.status;
        let winner = snapshot.winner().map(|p| p.id);
        match self.winner.observe(status, winner, &mut self.scheduler) {
            WinnerSignal::Fire(id) => {
                info!(target = LOG_TARGET, winner = id, "winner latched");
                if self.is_pipeline_busy() {
                    self.winner.defer();
                } else if self.winner.present(&mut self.scheduler) {
                    self.emit_winner_stage();
                }
            }
            WinnerSignal::Rearmed => self.emit_winner_stage(),
            WinnerSignal::Quiet => {}
        }
    }

    /// Runs eliminations the server published after their digit had
    /// already landed. Returns `true` when a batch was queued.
    fn reconcile_eligibility(&mut self) -> bool {
        if self.is_pipeline_busy() {
            return false;
        }
        let Some(snapshot) = self.snapshot.as_ref() else {
            return false;
        };
        let Some(outcome) = self.diff.reconcile(snapshot) else {
            return false;
        };
        let Some(delta) = outcome.delta else {
            return false;
        };
        let totals = cycle_totals(snapshot, &outcome.survivors);

        info!(
            target = LOG_TARGET,
            eliminated = ?delta.eliminated_ids,
            position = delta.digit_index,
            "eligibility shrank without a new digit"
        );
        self.eliminations.mark_pending(&delta);
        self.pending_cycles.push_back(RevealCycle {
            position: delta.digit_index,
            digit: delta.digit_value,
            spin: false,
            delta: Some(delta),
            survivors: outcome.survivors,
            totals: Some(totals),
        });
        self.pump_cycles();
        true
    }

    /// Starts queued reveal cycles one at a time.
    fn pump_cycles(&mut self) {
        while self.active_cycle.is_none() {
            let Some(cycle) = self.pending_cycles.pop_front() else {
                break;
            };
            let (position, digit, spin) = (cycle.position, cycle.digit, cycle.spin);
            self.active_cycle = Some(cycle);
            if !spin {
                self.after_reveal(None);
                continue;
            }
            if self.digits.begin(position, digit, &mut self.scheduler) {
                self.emit(EngineEvent::DigitSpinStarted { position });
                break;
            }
            // Eliminations never run without a landed digit.
            warn!(
                target = LOG_TARGET,
                position,
                %digit,
                "revealed character cannot be spun; rebaselining"
            );
            self.active_cycle = None;
            if let Some(snapshot) = self.snapshot.clone() {
                self.rebaseline(snapshot, RebaselineReason::Diverged);
            }
            return;
        }
        if !self.is_pipeline_busy() {
            self.on_pipeline_drained();
        }
    }

    fn after_reveal(&mut self, announce: Option<(usize, char)>) {
        if let Some((position, digit)) = announce {
            self.emit(EngineEvent::RevealComplete { position, digit });
        }
        let delta = self.active_cycle.as_mut().and_then(|c| c.delta.take());
        match delta {
            Some(delta) => {
                self.eliminations.enqueue(delta);
                self.start_elimination();
            }
            None => self.finish_cycle(),
        }
    }

    fn start_elimination(&mut self) {
        let known: BTreeSet<ParticipantId> = match self.snapshot.as_ref() {
            Some(snapshot) => snapshot
                .participants
                .iter()
                .map(|p| p.id)
                .filter(|id| self.rendered_eligible.contains(id))
                .collect(),
            None => BTreeSet::new(),
        };
        match self
            .eliminations
            .start_next(|id| known.contains(&id), &mut self.scheduler)
        {
            BatchStarted::Started { ids, dropped } => {
                if !dropped.is_empty() {
                    self.drop_unknown(dropped);
                }
                debug!(target = LOG_TARGET, ?ids, "elimination batch scheduled");
            }
            BatchStarted::Empty { dropped } => {
                self.drop_unknown(dropped);
                self.finish_cycle();
            }
            BatchStarted::Idle => {}
        }
    }

    fn drop_unknown(&mut self, ids: Vec<ParticipantId>) {
        self.rendered_eligible.retain(|id| !ids.contains(id));
        self.emit(EngineEvent::EliminationDropped { ids });
    }

    fn commit(&mut self, ids: Vec<ParticipantId>) {
        self.emit(EngineEvent::EliminationStage {
            stage: AnimationStage::Exit,
            ids: ids.clone(),
        });
        self.rendered_eligible.retain(|id| !ids.contains(id));
        self.eliminated.extend(ids.iter().copied());
        self.emit(EngineEvent::EliminationCommitted { ids });
        self.finish_cycle();
    }

    fn finish_cycle(&mut self) {
        let Some(cycle) = self.active_cycle.take() else {
            return;
        };
        if let Some((people, tickets)) = cycle.totals {
            if !self.counters.update(people, tickets, &mut self.scheduler) {
                self.emit(EngineEvent::CountersSettled { people, tickets });
            }
        }
        if !cycle.survivors.is_empty() {
            self.glow
                .apply(cycle.survivors.iter().copied(), &mut self.scheduler);
            self.emit(EngineEvent::SurvivorGlow {
                ids: cycle.survivors,
            });
        }
        self.emit(EngineEvent::CycleFinished {
            position: cycle.position,
        });
    }

    fn on_pipeline_drained(&mut self) {
        if self.reconcile_eligibility() {
            return;
        }
        if self.gateway.pipeline_drained() {
            self.emit(EngineEvent::GatewayUnlocked);
        }
        if self.winner.take_deferred() && self.winner.present(&mut self.scheduler) {
            self.emit_winner_stage();
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::DigitStep { position } => {
                match self.digits.on_step(position, &mut self.scheduler) {
                    Some(SpinProgress::Step { position, shown }) => {
                        self.emit(EngineEvent::DigitSpinStep { position, shown });
                    }
                    Some(SpinProgress::Landed { position, digit }) => {
                        self.after_reveal(Some((position, digit)));
                        self.pump_cycles();
                    }
                    None => {}
                }
            }
            TimerEvent::ShakeBegin { .. }
            | TimerEvent::ShakeElapsed { .. }
            | TimerEvent::ShrinkElapsed { .. }
            | TimerEvent::EntranceElapsed { .. } => {
                match self.eliminations.on_timer(&timer, &mut self.scheduler) {
                    Some(BatchProgress::Shaking { ids }) => {
                        self.emit(EngineEvent::EliminationStage {
                            stage: AnimationStage::Shake,
                            ids,
                        });
                    }
                    Some(BatchProgress::Shrinking { ids }) => {
                        self.emit(EngineEvent::EliminationStage {
                            stage: AnimationStage::Shrink,
                            ids,
                        });
                    }
                    Some(BatchProgress::Committed { ids }) => {
                        self.commit(ids);
                        self.pump_cycles();
                    }
                    Some(BatchProgress::EntranceSettled { ids }) => {
                        self.emit(EngineEvent::EntranceSettled { ids });
                    }
                    None => {}
                }
            }
            TimerEvent::CounterFrame => {
                if let Some(frame) = self.counters.on_frame(&mut self.scheduler) {
                    self.emit(EngineEvent::CountersChanged {
                        people: frame.people,
                        tickets: frame.tickets,
                    });
                    if frame.settled {
                        self.emit(EngineEvent::CountersSettled {
                            people: frame.people,
                            tickets: frame.tickets,
                        });
                    }
                }
            }
            TimerEvent::GlowElapsed => {
                if self.glow.on_elapsed() {
                    self.emit(EngineEvent::GlowCleared);
                }
            }
            TimerEvent::WinnerStageElapsed => {
                if self.winner.on_stage_elapsed(&mut self.scheduler).is_some() {
                    self.emit_winner_stage();
                }
            }
        }
    }
}

impl Default for DrawingEngine {
    fn default() -> Self {
        Self::build(&EngineConfig::default())
    }
}
