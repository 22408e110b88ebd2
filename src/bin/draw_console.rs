use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

use raffle_draw::backend::{DrawingBackend, HttpBackendConfig, HttpDrawingBackend, SimulatedBackend};
use raffle_draw::config::EngineConfig;
use raffle_draw::domain::{DrawStatus, SessionId};
use raffle_draw::draw::{DrawView, EngineEvent, GatewayState, TimedEvent, WinnerStage};
use raffle_draw::runtime::{DrawRuntimeConfig, DrawingHandle};
use raffle_draw::tokio_tools::spawn_named_task;

const LOG_TARGET: &str = "bin::draw_console";

#[derive(Debug, Parser)]
#[command(name = "draw_console")]
#[command(about = "Run a raffle drawing and log its presentation timeline", long_about = None)]
struct Args {
    /// Drawing API base URL; omit to run against an in-memory simulation
    #[arg(long, env = "DRAW_BACKEND_URL")]
    backend_url: Option<Url>,

    /// Drawing session to drive
    #[arg(long, env = "DRAW_SESSION_ID", default_value_t = 1)]
    session: SessionId,

    /// Ticket width of the simulated drawing
    #[arg(long, env = "DRAW_TICKET_DIGITS", default_value_t = 3)]
    ticket_digits: u32,

    /// Number of simulated ticket holders
    #[arg(long, env = "DRAW_PARTICIPANTS", default_value_t = 12)]
    participants: usize,

    /// Seed for the simulation and the digit spins
    #[arg(long, env = "DRAW_SEED")]
    seed: Option<u64>,

    /// JSON file with engine timing overrides
    #[arg(long, env = "DRAW_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,

    /// Pause between reveals once the previous one settled, in milliseconds
    #[arg(long, env = "DRAW_REVEAL_PAUSE_MS", default_value_t = 1500)]
    reveal_pause_ms: u64,

    /// HTTP request timeout, in milliseconds
    #[arg(long, env = "DRAW_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "DRAW_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;
    let config = build_config(&args).context("failed to build drawing config")?;
    let backend = build_backend(&args).context("failed to build drawing backend")?;
    run_drawing(backend, config, Duration::from_millis(args.reveal_pause_ms)).await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    let installed = if json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn build_config(args: &Args) -> Result<DrawRuntimeConfig> {
    let mut engine = match &args.engine_config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            EngineConfig::from_json_str(&raw)
                .with_context(|| format!("invalid engine config in {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(seed) = args.seed {
        engine = engine.with_rng_seed(seed);
    }
    engine.validate().context("invalid engine config")?;
    Ok(DrawRuntimeConfig::new(args.session, engine))
}

fn build_backend(args: &Args) -> Result<Arc<dyn DrawingBackend>> {
    match &args.backend_url {
        Some(url) => {
            let config = HttpBackendConfig::new(url.clone())
                .with_request_timeout(Duration::from_millis(args.request_timeout_ms));
            info!(target = LOG_TARGET, base_url = %url, "using HTTP drawing backend");
            Ok(Arc::new(HttpDrawingBackend::new(config)?))
        }
        None => {
            if args.participants == 0 {
                return Err(anyhow!("simulation needs at least one participant"));
            }
            let seed = args.seed.unwrap_or_else(rand::random);
            info!(
                target = LOG_TARGET,
                participants = args.participants,
                ticket_digits = args.ticket_digits,
                seed,
                "using simulated drawing backend"
            );
            Ok(Arc::new(SimulatedBackend::generate(
                args.session,
                args.ticket_digits,
                args.participants,
                seed,
            )))
        }
    }
}

async fn run_drawing(
    backend: Arc<dyn DrawingBackend>,
    config: DrawRuntimeConfig,
    reveal_pause: Duration,
) -> Result<()> {
    let stop = CancellationToken::new();
    let handle = DrawingHandle::spawn_with_token(backend, config, stop.clone())
        .context("failed to start drawing runtime")?;

    let events = BroadcastStream::new(handle.subscribe());
    let logger = spawn_named_task("draw-console-events", log_events(events));

    let ctrl_c = stop.clone();
    spawn_named_task("draw-console-signal", async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target = LOG_TARGET, "interrupt received; shutting down");
            ctrl_c.cancel();
        }
    });

    tokio::select! {
        _ = stop.cancelled() => {}
        result = auto_reveal(&handle, reveal_pause) => {
            if let Err(err) = result {
                warn!(target = LOG_TARGET, error = %err, "drawing ended early");
            }
        }
    }

    let final_view = handle.view().borrow().clone();
    handle.shutdown().await.context("drawing runtime did not stop cleanly")?;
    logger.await.ok();
    report(&final_view);
    Ok(())
}

async fn auto_reveal(handle: &DrawingHandle, reveal_pause: Duration) -> Result<()> {
    let view = handle.wait_for(|v| v.session_id.is_some()).await?;
    if view.status == Some(DrawStatus::Completed) {
        info!(target = LOG_TARGET, "drawing already completed; replaying winner");
        handle.replay_winner().await?;
    } else {
        if view.status == Some(DrawStatus::Active) {
            handle.start().await?;
        }
        loop {
            let view = handle
                .wait_for(|v| {
                    v.gateway == GatewayState::Idle
                        && (v.can_reveal || v.error.is_some() || v.status == Some(DrawStatus::Completed))
                })
                .await?;
            if view.status == Some(DrawStatus::Completed) {
                break;
            }
            if let Some(failure) = view.error {
                warn!(
                    target = LOG_TARGET,
                    command = %failure.command,
                    message = %failure.message,
                    "command failed; retrying after pause"
                );
                handle.dismiss_error().await?;
                tokio::time::sleep(reveal_pause).await;
                if view.status == Some(DrawStatus::Active) {
                    handle.start().await?;
                }
                continue;
            }
            tokio::time::sleep(reveal_pause).await;
            handle.reveal_next().await?;
        }
    }

    handle
        .wait_for(|v| v.winner_stage == WinnerStage::Visible)
        .await?;
    Ok(())
}

async fn log_events(mut events: BroadcastStream<TimedEvent>) {
    while let Some(item) = events.next().await {
        match item {
            Ok(TimedEvent { at, event }) => {
                let at_ms = at.as_millis() as u64;
                let payload = serde_json::to_string(&event).unwrap_or_default();
                match event {
                    EngineEvent::DigitSpinStep { .. } | EngineEvent::CountersChanged { .. } => {
                        debug!(target = LOG_TARGET, at_ms, event = %payload, "timeline");
                    }
                    _ => info!(target = LOG_TARGET, at_ms, event = %payload, "timeline"),
                }
            }
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(target = LOG_TARGET, skipped, "event log fell behind");
            }
        }
    }
}

fn report(view: &DrawView) {
    let winner = view
        .winner
        .and_then(|id| view.eligible.iter().chain(&view.eliminated).find(|p| p.id == id))
        .map(|p| p.name.clone());
    info!(
        target = LOG_TARGET,
        digits = %view.digit_strip(),
        remaining_people = view.remaining_people,
        remaining_tickets = view.remaining_tickets,
        winner = ?winner,
        "drawing finished"
    );
}
