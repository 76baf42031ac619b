// Debug surface for P2Snake
// Tracing setup for the --debug flag, plus a JSON view of everything a test
// harness may want to observe about a running peer

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::game::{Cell, ControlKind, DeathReason, Direction, Mode, PlayerId, TickEvents, Winner};
use crate::network::{ConnectorFactory, Phase, Role, SignalRelay};
use crate::sync::SnakePeer;

pub const LOG_FILE_PATH: &str = "/tmp/p2snake-debug.log";

const COORDINATE_SYSTEM: &str = "origin_top_left_x_right_y_down_shared_grid";

/// Frame length used by `advance_time`
const DEBUG_FRAME: Duration = Duration::from_micros(16_667);

/// Initialize tracing.
///
/// `RUST_LOG` wins when set. Otherwise the default level is `info`, or `debug`
/// with `--debug`, in which case output goes to `LOG_FILE_PATH` instead of the
/// terminal (truncated, with a header).
pub fn init(debug: bool) -> io::Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if !debug {
        // A second init (tests, embedding) keeps the first subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .try_init();
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(LOG_FILE_PATH)?;

    writeln!(file, "=== P2Snake Debug Log ===")?;
    writeln!(file, "Session started: {:?}", SystemTime::now())?;
    writeln!(file, "To monitor: tail -f {}", LOG_FILE_PATH)?;
    writeln!(file, "========================================\n")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSize {
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: &'static str,
    pub control: ControlKind,
    pub alive: bool,
    pub score: u32,
    pub best: u32,
    pub reason: Option<DeathReason>,
    pub direction: Direction,
    pub queued_direction: Direction,
    pub snake: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkView {
    pub role: Role,
    pub phase: Phase,
    pub has_invite_link: bool,
    pub host_ready: bool,
    pub client_ready: bool,
    pub step_mode: bool,
    pub pending_steps: u32,
    pub remote_input_count: u64,
    pub last_error: Option<String>,
}

/// Observable game and network state of one peer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugState {
    pub coordinate_system: &'static str,
    pub grid: GridSize,
    pub mode: Mode,
    pub step_ms: u64,
    pub winner: Option<Winner>,
    pub food: Cell,
    pub players: Vec<PlayerView>,
    pub network: NetworkView,
}

impl DebugState {
    pub fn capture<F, R>(peer: &SnakePeer<F, R>) -> Self
    where
        F: ConnectorFactory,
        R: SignalRelay + Clone + Send + 'static,
    {
        let rules = peer.rules();
        let state = peer.state();
        let session = peer.session();
        let ready = peer.ready();
        let steps = peer.steps();

        let players = state
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id,
                name: match p.id {
                    PlayerId::P1 => "P1",
                    PlayerId::P2 => "P2",
                },
                control: p.control,
                alive: p.alive,
                score: p.score,
                best: p.best,
                reason: p.reason,
                direction: p.direction,
                queued_direction: p.queued_direction,
                snake: p.snake.iter().copied().collect(),
            })
            .collect();

        Self {
            coordinate_system: COORDINATE_SYSTEM,
            grid: GridSize {
                width: rules.grid,
                height: rules.grid,
            },
            mode: state.mode,
            step_ms: rules.step.as_millis() as u64,
            winner: state.winner,
            food: state.food,
            players,
            network: NetworkView {
                role: session.role(),
                phase: session.phase(),
                has_invite_link: peer.invite_link().is_some(),
                host_ready: ready.host_ready,
                client_ready: ready.client_ready,
                step_mode: steps.step_mode,
                pending_steps: steps.pending_steps,
                remote_input_count: steps.remote_input_count,
                last_error: session.last_error().map(str::to_string),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Run `max(1, round(ms / frame))` fixed 1/60 s updates
pub fn advance_time<F, R>(peer: &mut SnakePeer<F, R>, ms: f64) -> TickEvents
where
    F: ConnectorFactory,
    R: SignalRelay + Clone + Send + 'static,
{
    let frames = (ms / (1000.0 / 60.0)).round().max(1.0) as u32;
    let mut events = TickEvents::default();
    for _ in 0..frames {
        events.merge(peer.update(DEBUG_FRAME));
    }
    events
}
