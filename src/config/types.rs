// P2Snake configuration types
// Every section and field falls back to its default when missing

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::game::state::{FIRST_FOOD, FOOD_PLACEMENT_ATTEMPTS, GRID, MIN_GRID, STEP_MS};
use crate::network::SignalTimings;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameConfig {
    // Board is grid x grid cells
    pub grid: i32,

    // Tick length in continuous mode
    pub step_ms: u64,

    // Food cell at the start of every round
    pub first_food: [i32; 2],

    // Random tries before food may land on a snake
    pub food_placement_attempts: u32,

    // Longest frame delta fed to the simulation
    pub frame_cap_ms: u64,

    pub target_fps: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid: GRID,
            step_ms: STEP_MS,
            first_food: [FIRST_FOOD.x, FIRST_FOOD.y],
            food_placement_attempts: FOOD_PLACEMENT_ATTEMPTS,
            frame_cap_ms: 34,
            target_fps: 60,
        }
    }
}

impl GameConfig {
    pub fn frame_cap(&self) -> Duration {
        Duration::from_millis(self.frame_cap_ms)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.target_fps.max(1))
    }

    /// Pull values the simulation cannot run with back into range
    pub fn validated(mut self) -> Self {
        if self.grid < MIN_GRID {
            warn!("grid {} is too small, using {}", self.grid, MIN_GRID);
            self.grid = MIN_GRID;
        }
        if self.step_ms == 0 {
            warn!("step_ms must be positive, using {}", STEP_MS);
            self.step_ms = STEP_MS;
        }
        let [x, y] = self.first_food;
        if !(0..self.grid).contains(&x) || !(0..self.grid).contains(&y) {
            let center = self.grid / 2;
            warn!(
                "first_food [{}, {}] is off the {}x{} board, using [{}, {}]",
                x, y, self.grid, self.grid, center, center
            );
            self.first_food = [center, center];
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    // Room relay root (serves /room/<id>/<kind>)
    pub relay_url: String,

    // Used for the server reflexive candidate
    pub stun_server: String,

    pub poll_interval_ms: u64,

    // Relay wait for offer or answer
    pub signal_timeout_secs: u64,

    // Wait for a pasted code in offline mode
    pub manual_timeout_secs: u64,

    pub channel_label: String,

    // Prefix for offline invite links; empty prints the bare code
    pub invite_base_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:4173/signal".to_string(),
            stun_server: "stun.l.google.com:19302".to_string(),
            poll_interval_ms: 250,
            signal_timeout_secs: 45,
            manual_timeout_secs: 300,
            channel_label: "snake".to_string(),
            invite_base_url: String::new(),
        }
    }
}

impl NetworkConfig {
    pub fn relay_timings(&self) -> SignalTimings {
        SignalTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.signal_timeout_secs),
        }
    }

    pub fn manual_timings(&self) -> SignalTimings {
        SignalTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_secs(self.manual_timeout_secs),
        }
    }

    pub fn invite_base(&self) -> Option<&str> {
        let base = self.invite_base_url.trim();
        (!base.is_empty()).then_some(base)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4173".to_string(),
        }
    }
}
