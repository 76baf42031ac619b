use std::collections::VecDeque;
use std::ops::Neg;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::network::Role;

// Shared square grid, origin top-left, x right, y down
pub const GRID: i32 = 26;
pub const STEP_MS: u64 = 105;
pub const FIRST_FOOD: Cell = Cell { x: 13, y: 13 };
pub const FOOD_PLACEMENT_ATTEMPTS: u32 = 500;
/// Smallest board that fits both three-cell starting snakes
pub const MIN_GRID: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dir: Direction) -> Cell {
        Cell::new(self.x + dir.x, self.y + dir.y)
    }

    pub fn in_bounds(self, grid: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < grid && self.y < grid
    }
}

/// Unit grid vector, or zero for "not moving"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Direction {
    pub x: i32,
    pub y: i32,
}

impl Direction {
    pub const ZERO: Direction = Direction { x: 0, y: 0 };
    pub const UP: Direction = Direction { x: 0, y: -1 };
    pub const DOWN: Direction = Direction { x: 0, y: 1 };
    pub const LEFT: Direction = Direction { x: -1, y: 0 };
    pub const RIGHT: Direction = Direction { x: 1, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self == Direction::ZERO
    }

    /// Zero or one of the four axis-aligned unit vectors
    pub fn is_valid(self) -> bool {
        self.x.abs() + self.y.abs() <= 1
    }
}

impl Neg for Direction {
    type Output = Direction;

    fn neg(self) -> Direction {
        Direction::new(-self.x, -self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerId {
    P1,
    P2,
}

impl PlayerId {
    pub fn index(self) -> usize {
        match self {
            PlayerId::P1 => 0,
            PlayerId::P2 => 1,
        }
    }

    pub fn other(self) -> PlayerId {
        match self {
            PlayerId::P1 => PlayerId::P2,
            PlayerId::P2 => PlayerId::P1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    KeyboardLocal,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathReason {
    Wall,
    Body,
    Head,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Menu,
    Playing,
    Gameover,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    P1,
    P2,
    Draw,
}

impl From<PlayerId> for Winner {
    fn from(id: PlayerId) -> Self {
        match id {
            PlayerId::P1 => Winner::P1,
            PlayerId::P2 => Winner::P2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub control: ControlKind,
    /// Head first, never empty
    pub snake: VecDeque<Cell>,
    pub direction: Direction,
    pub queued_direction: Direction,
    pub alive: bool,
    pub score: u32,
    pub best: u32,
    pub reason: Option<DeathReason>,
}

impl Player {
    pub fn new(id: PlayerId, control: ControlKind, snake: &[Cell], direction: Direction) -> Self {
        Self {
            id,
            control,
            snake: snake.iter().copied().collect(),
            direction,
            queued_direction: direction,
            alive: true,
            score: 0,
            best: 0,
            reason: None,
        }
    }

    pub fn head(&self) -> Cell {
        self.snake[0]
    }

    pub fn covers(&self, cell: Cell) -> bool {
        self.snake.contains(&cell)
    }

    pub(crate) fn kill(&mut self, reason: DeathReason) {
        self.alive = false;
        self.reason = Some(reason);
        self.best = self.best.max(self.score);
    }
}

/// Fixed parameters of the simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rules {
    pub grid: i32,
    pub step: Duration,
    pub first_food: Cell,
    pub food_placement_attempts: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            grid: GRID,
            step: Duration::from_millis(STEP_MS),
            first_food: FIRST_FOOD,
            food_placement_attempts: FOOD_PLACEMENT_ATTEMPTS,
        }
    }
}

impl From<&GameConfig> for Rules {
    fn from(config: &GameConfig) -> Self {
        Self {
            grid: config.grid,
            step: Duration::from_millis(config.step_ms),
            first_food: Cell::new(config.first_food[0], config.first_food[1]),
            food_placement_attempts: config.food_placement_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchState {
    pub mode: Mode,
    pub food: Cell,
    pub winner: Option<Winner>,
    /// Real time owed to the fixed-step clock (host/local only)
    pub elapsed: Duration,
    pub players: [Player; 2],
}

impl MatchState {
    /// Fresh state in the menu, seated for `role`
    pub fn new(rules: &Rules, role: Role) -> Self {
        Self {
            mode: Mode::Menu,
            food: rules.first_food,
            winner: None,
            elapsed: Duration::ZERO,
            players: initial_players(rules, role),
        }
    }

    /// Start a new round: players recreated, food back on its first cell
    pub fn reset(&mut self, rules: &Rules, role: Role) {
        *self = Self::new(rules, role);
        self.mode = Mode::Playing;
    }

    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id.index()]
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[id.index()]
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.players.iter().any(|p| p.covers(cell))
    }
}

/// Opposite-facing starting snakes on the middle row.
/// In local seating p2 waits with a zero direction until steered.
fn initial_players(rules: &Rules, role: Role) -> [Player; 2] {
    let row = rules.grid / 2;
    let left = rules.grid / 4;
    let right = rules.grid - rules.grid / 4 - 1;

    let p1_control = match role {
        Role::Client => ControlKind::Remote,
        _ => ControlKind::KeyboardLocal,
    };
    let p2_control = match role {
        Role::Host => ControlKind::Remote,
        _ => ControlKind::KeyboardLocal,
    };
    let p2_dir = match role {
        Role::None => Direction::ZERO,
        Role::Host | Role::Client => Direction::LEFT,
    };

    [
        Player::new(
            PlayerId::P1,
            p1_control,
            &[
                Cell::new(left, row),
                Cell::new(left - 1, row),
                Cell::new(left - 2, row),
            ],
            Direction::RIGHT,
        ),
        Player::new(
            PlayerId::P2,
            p2_control,
            &[
                Cell::new(right, row),
                Cell::new(right + 1, row),
                Cell::new(right + 2, row),
            ],
            p2_dir,
        ),
    ]
}
