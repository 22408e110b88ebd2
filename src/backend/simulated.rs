//! In-memory drawing backend applying the real drawing rules.
//!
//! A hidden winning ticket is drawn among sold tickets when the drawing
//! starts. Each reveal appends its next digit, and a participant stays
//! eligible while any ticket in their range still matches the revealed
//! prefix.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

use crate::domain::{
    format_ticket, range_matches_prefix, DrawCommand, DrawSession, DrawStatus, Participant,
    SessionId, Snapshot, TicketNumber,
};

use super::{BackendError, DrawingBackend};

const LOG_TARGET: &str = "backend::simulated";

struct Inner {
    snapshot: Snapshot,
    winning_ticket: Option<TicketNumber>,
    fixed_ticket: Option<TicketNumber>,
    rng: StdRng,
    failing_fetches: u32,
    failing_commands: u32,
    latency: Duration,
    fetches: u64,
}

#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedBackend {
    /// Serves `snapshot` as an `Active` drawing awaiting its start.
    pub fn new(mut snapshot: Snapshot) -> Self {
        reset_snapshot(&mut snapshot);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                snapshot,
                winning_ticket: None,
                fixed_ticket: None,
                rng: StdRng::from_entropy(),
                failing_fetches: 0,
                failing_commands: 0,
                latency: Duration::ZERO,
                fetches: 0,
            })),
        }
    }

    /// Builds a drawing with `participants` holders of contiguous ticket
    /// ranges of random size.
    pub fn generate(session: SessionId, ticket_digits: u32, participants: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let capacity = 10u64.saturating_pow(ticket_digits);
        let per_holder = (capacity / participants.max(1) as u64).max(1);

        let mut next: TicketNumber = 0;
        let mut holders = Vec::with_capacity(participants);
        for index in 0..participants {
            if next >= capacity {
                break;
            }
            let size = rng.gen_range(1..=per_holder).min(capacity - next);
            holders.push(Participant {
                id: index as i64 + 1,
                name: format!("Participant {}", index + 1),
                ticket_start: next,
                ticket_end: next + size - 1,
                total_tickets: size,
                is_still_eligible: true,
                is_winner: false,
            });
            next += per_holder;
        }

        let snapshot = Snapshot {
            session: DrawSession {
                id: session,
                ticket_digits,
                revealed_digits: String::new(),
                status: DrawStatus::Active,
                winning_number: None,
            },
            participants: holders,
            prizes: Vec::new(),
        };
        Self::new(snapshot).with_seed(seed)
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.inner.lock().rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Draws `ticket` on every start instead of a random sold ticket.
    pub fn with_winning_ticket(self, ticket: TicketNumber) -> Self {
        self.inner.lock().fixed_ticket = Some(ticket);
        self
    }

    /// Delays every response by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.inner.lock().latency = latency;
        self
    }

    pub fn fail_next_fetches(&self, count: u32) {
        self.inner.lock().failing_fetches = count;
    }

    pub fn fail_next_commands(&self, count: u32) {
        self.inner.lock().failing_commands = count;
    }

    pub fn current(&self) -> Snapshot {
        self.inner.lock().snapshot.clone()
    }

    pub fn fetch_count(&self) -> u64 {
        self.inner.lock().fetches
    }

    pub fn winning_ticket(&self) -> Option<TicketNumber> {
        self.inner.lock().winning_ticket
    }

    async fn delay(&self) {
        let latency = self.inner.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn command(&self, session: SessionId, command: DrawCommand) -> Result<Snapshot, BackendError> {
        let mut inner = self.inner.lock();
        if inner.snapshot.session.id != session {
            return Err(BackendError::NotFound(session));
        }
        if inner.failing_commands > 0 {
            inner.failing_commands -= 1;
            return Err(BackendError::Unavailable(format!("{command} failed (injected)")));
        }
        match command {
            DrawCommand::Start => inner.start()?,
            DrawCommand::RevealNext => inner.reveal()?,
            DrawCommand::Reset => inner.reset(),
        }
        Ok(inner.snapshot.clone())
    }
}

impl Inner {
    fn start(&mut self) -> Result<(), BackendError> {
        if self.snapshot.session.status != DrawStatus::Active {
            return Err(BackendError::rejected(
                DrawCommand::Start,
                format!("drawing is {}", self.snapshot.session.status),
            ));
        }
        let ticket = match self.fixed_ticket {
            Some(ticket) => ticket,
            None => self.draw_sold_ticket().ok_or_else(|| {
                BackendError::rejected(DrawCommand::Start, "no tickets sold")
            })?,
        };
        reset_snapshot(&mut self.snapshot);
        self.snapshot.session.status = DrawStatus::Drawing;
        self.winning_ticket = Some(ticket);
        info!(
            target = LOG_TARGET,
            session_id = self.snapshot.session.id,
            "drawing started"
        );
        Ok(())
    }

    fn reveal(&mut self) -> Result<(), BackendError> {
        let session = &self.snapshot.session;
        if session.status != DrawStatus::Drawing {
            return Err(BackendError::rejected(
                DrawCommand::RevealNext,
                format!("drawing is {}", session.status),
            ));
        }
        let Some(ticket) = self.winning_ticket else {
            return Err(BackendError::rejected(DrawCommand::RevealNext, "no winning ticket"));
        };
        let width = session.ticket_digits;
        let digits = format_ticket(ticket, width);
        let Some(next) = digits.chars().nth(session.revealed_len()) else {
            return Err(BackendError::rejected(
                DrawCommand::RevealNext,
                "all digits revealed",
            ));
        };

        let session = &mut self.snapshot.session;
        session.revealed_digits.push(next);
        let prefix = session.revealed_digits.clone();
        for p in self.snapshot.participants.iter_mut() {
            p.is_still_eligible = range_matches_prefix(p.ticket_start, p.ticket_end, &prefix, width);
        }

        if self.snapshot.session.is_fully_revealed() {
            self.snapshot.session.status = DrawStatus::Completed;
            self.snapshot.session.winning_number = Some(ticket);
            for p in self.snapshot.participants.iter_mut() {
                p.is_winner = p.holds_ticket(ticket);
            }
            info!(target = LOG_TARGET, winning = %digits, "drawing completed");
        } else {
            debug!(
                target = LOG_TARGET,
                %prefix,
                remaining = self.snapshot.remaining_people(),
                "digit revealed"
            );
        }
        Ok(())
    }

    fn reset(&mut self) {
        reset_snapshot(&mut self.snapshot);
        self.winning_ticket = None;
        info!(
            target = LOG_TARGET,
            session_id = self.snapshot.session.id,
            "drawing reset"
        );
    }

    /// Uniform over sold tickets, so holders win in proportion to tickets.
    fn draw_sold_ticket(&mut self) -> Option<TicketNumber> {
        let sold: u64 = self.snapshot.participants.iter().map(|p| p.total_tickets).sum();
        if sold == 0 {
            return None;
        }
        let mut pick = self.rng.gen_range(0..sold);
        for p in &self.snapshot.participants {
            if pick < p.total_tickets {
                return Some(p.ticket_start + pick);
            }
            pick -= p.total_tickets;
        }
        None
    }
}

fn reset_snapshot(snapshot: &mut Snapshot) {
    let session = &mut snapshot.session;
    session.status = DrawStatus::Active;
    session.revealed_digits.clear();
    session.winning_number = None;
    for p in snapshot.participants.iter_mut() {
        p.is_still_eligible = true;
        p.is_winner = false;
    }
}

#[async_trait]
impl DrawingBackend for SimulatedBackend {
    async fn drawing_state(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.fetches += 1;
        if inner.snapshot.session.id != session {
            return Err(BackendError::NotFound(session));
        }
        if inner.failing_fetches > 0 {
            inner.failing_fetches -= 1;
            return Err(BackendError::Unavailable("fetch failed (injected)".into()));
        }
        Ok(inner.snapshot.clone())
    }

    async fn start_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.delay().await;
        self.command(session, DrawCommand::Start)
    }

    async fn reveal_next(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.delay().await;
        self.command(session, DrawCommand::RevealNext)
    }

    async fn reset_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError> {
        self.delay().await;
        self.command(session, DrawCommand::Reset)
    }
}
