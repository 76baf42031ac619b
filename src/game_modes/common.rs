//! Common utilities shared by the local and network game modes
//!
//! Both modes drive one `SnakePeer` from a fixed-rate frame loop and take
//! their input as text commands, one per line.

use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{Config, GameConfig};
use crate::debug::DebugState;
use crate::error::Result;
use crate::game::{Direction, InputAction, Mode, PlayerId};
use crate::network::{HttpRelay, Phase, Role, Str0mFactory};
use crate::sync::{PeerSettings, SnakePeer};

/// The peer every binary mode runs: real WebRTC, HTTP room relay
pub type LivePeer = SnakePeer<Str0mFactory, HttpRelay>;

pub fn build_peer(config: &Config) -> Result<LivePeer> {
    let factory = Str0mFactory {
        stun_server: config.network.stun_server.clone(),
        channel_label: config.network.channel_label.clone(),
    };
    let relay = HttpRelay::new(&config.network.relay_url)?;
    Ok(SnakePeer::new(PeerSettings::from(config), factory, relay))
}

/// One line typed by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Action(InputAction),
    /// Local seating only: steer the second snake
    SteerP2(Direction),
    Paste(String),
    State,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match head.to_ascii_lowercase().as_str() {
            "quit" | "q" | "exit" => Ok(Command::Quit),
            "state" => Ok(Command::State),
            "paste" if !rest.is_empty() => Ok(Command::Paste(rest.to_string())),
            "paste" => Err("paste needs a code".to_string()),
            "p2" => match rest.parse::<InputAction>()? {
                InputAction::Steer(dir) => Ok(Command::SteerP2(dir)),
                _ => Err(format!("p2 can only steer, got {}", rest)),
            },
            _ => line.parse().map(Command::Action),
        }
    }
}

/// Read commands from stdin on a helper thread. The receiver disconnects at EOF.
pub fn spawn_command_reader() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("? {}", e),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn stdin reader: {}", e);
    }
    rx
}

/// What the frame loop should do after handling a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn apply_command(peer: &mut LivePeer, cmd: Command) -> Flow {
    match cmd {
        Command::Quit => return Flow::Quit,
        Command::Action(action) => peer.apply(action),
        Command::SteerP2(dir) => peer.steer_player(PlayerId::P2, dir),
        Command::Paste(code) => {
            if let Err(e) = peer.paste(&code) {
                eprintln!("Paste rejected: {}", e);
            }
        }
        Command::State => match DebugState::capture(peer).to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Failed to render state: {}", e),
        },
    }
    Flow::Continue
}

/// Clamp a frame's real elapsed time before it reaches the simulation
pub fn clamp_frame(dt: Duration, cap: Duration) -> Duration {
    dt.min(cap)
}

/// Apply frame rate limiting to maintain consistent game speed.
///
/// Call at the end of each loop iteration with the `Instant` the frame began.
pub fn limit_frame_rate(frame_start: Instant, frame: Duration) {
    let elapsed = frame_start.elapsed();
    if elapsed < frame {
        thread::sleep(frame - elapsed);
    }
}

/// Prints what changed between frames so a headless user can follow along
#[derive(Debug, Default)]
pub struct Watcher {
    role: Role,
    phase: Phase,
    mode: Option<Mode>,
    last_error: Option<String>,
    ready: (bool, bool),
}

impl Watcher {
    pub fn observe(&mut self, peer: &LivePeer) {
        let session = peer.session();
        if (session.role(), session.phase()) != (self.role, self.phase) {
            self.role = session.role();
            self.phase = session.phase();
            println!("[net] role={:?} phase={:?}", self.role, self.phase);
        }

        let error = session.last_error().map(str::to_string);
        if error != self.last_error {
            if let Some(e) = &error {
                println!("[net] error: {}", e);
            }
            self.last_error = error;
        }

        let ready = peer.ready();
        if (ready.host_ready, ready.client_ready) != self.ready {
            self.ready = (ready.host_ready, ready.client_ready);
            println!(
                "[ready] host={} client={}",
                ready.host_ready, ready.client_ready
            );
        }

        let state = peer.state();
        if Some(state.mode) != self.mode {
            self.mode = Some(state.mode);
            match state.mode {
                Mode::Playing => println!("[game] round started"),
                Mode::Gameover => {
                    let [p1, p2] = &state.players;
                    println!(
                        "[game] round over, winner {:?} (p1 {} / best {}, p2 {} / best {})",
                        state.winner, p1.score, p1.best, p2.score, p2.best
                    );
                }
                Mode::Menu => println!("[game] menu"),
            }
        }
    }
}

/// Run frames until the user quits or stdin closes
pub fn run_frames(
    peer: &mut LivePeer,
    game: &GameConfig,
    commands: &mpsc::Receiver<Command>,
    mut on_frame: impl FnMut(&mut LivePeer),
) {
    let frame = game.frame_duration();
    let cap = game.frame_cap();
    let mut watcher = Watcher::default();
    let mut last = Instant::now();

    loop {
        let now = Instant::now();
        let dt = clamp_frame(now.duration_since(last), cap);
        last = now;

        loop {
            match commands.try_recv() {
                Ok(cmd) => {
                    if apply_command(peer, cmd) == Flow::Quit {
                        info!("Quit requested");
                        return;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    info!("Input closed, leaving");
                    return;
                }
            }
        }

        peer.update(dt);
        on_frame(peer);
        watcher.observe(peer);

        limit_frame_rate(now, frame);
    }
}
