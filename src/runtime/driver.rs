//! Tokio task owning a [`DrawingEngine`].
//!
//! The task maps wall-clock time onto the engine's virtual clock, polls the
//! backend on a fixed cadence, runs commands on spawned tasks and publishes
//! the event timeline and view. Every engine mutation happens on this task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{BackendError, DrawingBackend};
use crate::config::{ConfigError, EngineConfig};
use crate::domain::{DrawCommand, SessionId, Snapshot};
use crate::draw::{CommandTicket, DrawView, DrawingEngine, GatewayError, TimedEvent};
use crate::tokio_tools::{sleep_until_or_pending, spawn_named_task};

use super::poller::SnapshotPoller;

const LOG_TARGET: &str = "runtime::driver";

#[derive(Debug, Clone)]
pub struct DrawRuntimeConfig {
    pub session: SessionId,
    pub engine: EngineConfig,
    pub event_capacity: usize,
    pub request_capacity: usize,
}

impl DrawRuntimeConfig {
    pub fn new(session: SessionId, engine: EngineConfig) -> Self {
        Self {
            session,
            engine,
            event_capacity: 256,
            request_capacity: 16,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("drawing runtime stopped")]
    Stopped,
    #[error("drawing runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

enum Request {
    Command {
        command: DrawCommand,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
    DismissWinner(oneshot::Sender<bool>),
    ReplayWinner(oneshot::Sender<bool>),
    DismissError(oneshot::Sender<bool>),
    /// Drops local state and refetches, as a remounted screen would.
    Resync,
}

enum Outcome {
    Polled {
        seq: u64,
        result: Result<Snapshot, BackendError>,
    },
    Commanded {
        ticket: CommandTicket,
        result: Result<Snapshot, BackendError>,
    },
}

/// Client side of a running drawing. Dropping it does not stop the task;
/// call [`DrawingHandle::shutdown`].
pub struct DrawingHandle {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<TimedEvent>,
    view: watch::Receiver<DrawView>,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl DrawingHandle {
    pub fn spawn(
        backend: Arc<dyn DrawingBackend>,
        config: DrawRuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        Self::spawn_with_token(backend, config, CancellationToken::new())
    }

    /// Spawns the driver; cancelling `stop` tears it down. Fails without
    /// spawning anything if the engine config is invalid.
    pub fn spawn_with_token(
        backend: Arc<dyn DrawingBackend>,
        config: DrawRuntimeConfig,
        stop: CancellationToken,
    ) -> Result<Self, RuntimeError> {
        let engine = DrawingEngine::new(&config.engine)?;
        let (requests_tx, requests_rx) = mpsc::channel(config.request_capacity.max(1));
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (view_tx, view_rx) = watch::channel(DrawView::default());
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            backend,
            session: config.session,
            poll_interval: config.engine.poll_interval,
            engine,
            poller: SnapshotPoller::new(),
            origin: Instant::now(),
            events: events_tx.clone(),
            view: view_tx,
            outcomes: outcomes_tx,
            stop: stop.clone(),
        };
        let task = spawn_named_task(
            format!("drawing-{}", config.session),
            driver.run(requests_rx, outcomes_rx),
        );

        Ok(Self {
            requests: requests_tx,
            events: events_tx,
            view: view_rx,
            stop,
            task,
        })
    }

    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.command(DrawCommand::Start).await
    }

    pub async fn reveal_next(&self) -> Result<(), RuntimeError> {
        self.command(DrawCommand::RevealNext).await
    }

    pub async fn reset(&self) -> Result<(), RuntimeError> {
        self.command(DrawCommand::Reset).await
    }

    /// Resolves once the gateway admitted or rejected `command`; the request
    /// itself completes in the background.
    pub async fn command(&self, command: DrawCommand) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Command { command, reply }).await?;
        Ok(rx.await.map_err(|_| RuntimeError::Stopped)??)
    }

    pub async fn dismiss_winner(&self) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::DismissWinner(reply)).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn replay_winner(&self) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::ReplayWinner(reply)).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn dismiss_error(&self) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::DismissError(reply)).await?;
        rx.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn resync(&self) -> Result<(), RuntimeError> {
        self.send(Request::Resync).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimedEvent> {
        self.events.subscribe()
    }

    pub fn view(&self) -> watch::Receiver<DrawView> {
        self.view.clone()
    }

    /// Waits until the published view satisfies `pred`.
    pub async fn wait_for<F>(&self, pred: F) -> Result<DrawView, RuntimeError>
    where
        F: FnMut(&DrawView) -> bool,
    {
        let mut view = self.view.clone();
        let seen = view.wait_for(pred).await.map_err(|_| RuntimeError::Stopped)?;
        Ok(seen.clone())
    }

    pub async fn shutdown(self) -> Result<(), RuntimeError> {
        self.stop.cancel();
        self.task.await?;
        Ok(())
    }

    async fn send(&self, request: Request) -> Result<(), RuntimeError> {
        if self.stop.is_cancelled() {
            return Err(RuntimeError::Stopped);
        }
        self.requests
            .send(request)
            .await
            .map_err(|_| RuntimeError::Stopped)
    }
}

struct Driver {
    backend: Arc<dyn DrawingBackend>,
    session: SessionId,
    poll_interval: Duration,
    engine: DrawingEngine,
    poller: SnapshotPoller,
    origin: Instant,
    events: broadcast::Sender<TimedEvent>,
    view: watch::Sender<DrawView>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    stop: CancellationToken,
}

impl Driver {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut outcomes: mpsc::UnboundedReceiver<Outcome>,
    ) {
        info!(target = LOG_TARGET, session_id = self.session, "drawing runtime started");
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.engine.next_deadline().map(|at| self.origin + at);

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    debug!(target = LOG_TARGET, "shutdown signal received");
                    break;
                }
                Some(outcome) = outcomes.recv() => {
                    self.catch_up();
                    self.on_outcome(outcome);
                }
                Some(request) = requests.recv() => {
                    self.catch_up();
                    self.on_request(request);
                }
                _ = sleep_until_or_pending(deadline) => self.catch_up(),
                _ = ticker.tick() => {
                    self.catch_up();
                    if self.poller.in_flight() == 0 {
                        self.spawn_poll();
                    }
                }
            }
            self.publish();
        }

        self.engine.dispose();
        self.publish();
        info!(target = LOG_TARGET, session_id = self.session, "drawing runtime stopped");
    }

    fn catch_up(&mut self) {
        let now = self.origin.elapsed();
        self.engine.advance_to(now);
    }

    fn on_request(&mut self, request: Request) {
        match request {
            Request::Command { command, reply } => {
                let result = match self.engine.begin_command(command) {
                    Ok(ticket) => {
                        self.spawn_command(ticket);
                        Ok(())
                    }
                    Err(err) => {
                        debug!(target = LOG_TARGET, %command, error = %err, "command rejected");
                        Err(err)
                    }
                };
                // Callers observe the locked gateway as soon as they are answered.
                self.publish();
                let _ = reply.send(result);
            }
            Request::DismissWinner(reply) => {
                let _ = reply.send(self.engine.dismiss_winner());
            }
            Request::ReplayWinner(reply) => {
                let _ = reply.send(self.engine.replay_winner());
            }
            Request::DismissError(reply) => {
                let _ = reply.send(self.engine.dismiss_error());
            }
            Request::Resync => {
                info!(target = LOG_TARGET, "resyncing drawing state");
                self.engine.reset();
                self.poller.fence();
                self.spawn_poll();
            }
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Polled { seq, result } => match result {
                Ok(snapshot) => {
                    if self.poller.accept(seq) {
                        let applied = self.engine.apply_snapshot(snapshot);
                        debug!(target = LOG_TARGET, seq, ?applied, "poll applied");
                    }
                }
                Err(err) => self.poller.record_failure(seq, &err),
            },
            Outcome::Commanded { ticket, result } => match result {
                Ok(snapshot) => {
                    self.poller.fence();
                    if self.engine.complete_command(&ticket, snapshot) {
                        self.spawn_poll();
                    }
                }
                Err(err) => {
                    self.engine.fail_command(&ticket, err.to_string());
                }
            },
        }
    }

    fn spawn_poll(&mut self) {
        let seq = self.poller.issue();
        let backend = Arc::clone(&self.backend);
        let outcomes = self.outcomes.clone();
        let stop = self.stop.clone();
        let session = self.session;
        spawn_named_task(format!("drawing-{session}-poll-{seq}"), async move {
            let result = tokio::select! {
                _ = stop.cancelled() => return,
                result = backend.drawing_state(session) => result,
            };
            let _ = outcomes.send(Outcome::Polled { seq, result });
        });
    }

    fn spawn_command(&mut self, ticket: CommandTicket) {
        let backend = Arc::clone(&self.backend);
        let outcomes = self.outcomes.clone();
        let stop = self.stop.clone();
        let session = self.session;
        info!(target = LOG_TARGET, command = %ticket.command, session_id = session, "issuing command");
        spawn_named_task(format!("drawing-{session}-{}", ticket.command), async move {
            let result = tokio::select! {
                _ = stop.cancelled() => return,
                result = backend.execute(session, ticket.command) => result,
            };
            let _ = outcomes.send(Outcome::Commanded { ticket, result });
        });
    }

    fn publish(&mut self) {
        for event in self.engine.drain_events() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        let next = self.engine.view();
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}
