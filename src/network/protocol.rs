// P2Snake peer protocol
// Text (JSON) messages exchanged over the data channel, tagged by "type"

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Role;
use crate::error::{Result, SyncError};
use crate::game::{Cell, DeathReason, Direction, MatchState, Mode, PlayerId, Winner};

/// Every message kind this build understands
const KNOWN_KINDS: [&str; 7] = [
    "input",
    "ready",
    "step_request",
    "start",
    "debug_state",
    "ready_state",
    "state",
];

/// Messages exchanged between peers once the channel is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkMessage {
    /// Client steering intent for p2
    Input { dir: Direction },

    /// Client readiness toggle
    Ready { value: bool },

    /// Client asks the host for one tick while in step mode
    StepRequest,

    /// Host started a round
    Start,

    /// Host step-mode flag
    DebugState { step_mode: bool },

    /// Host's authoritative ready flags
    ReadyState { host_ready: bool, client_ready: bool },

    /// Full authoritative snapshot (sent by host every frame)
    State { payload: Snapshot },
}

impl NetworkMessage {
    /// The only role allowed to send this kind
    pub fn sender(&self) -> Role {
        match self {
            NetworkMessage::Input { .. }
            | NetworkMessage::Ready { .. }
            | NetworkMessage::StepRequest => Role::Client,
            NetworkMessage::Start
            | NetworkMessage::DebugState { .. }
            | NetworkMessage::ReadyState { .. }
            | NetworkMessage::State { .. } => Role::Host,
        }
    }

    /// Whether a peer in `role` should act on this message
    pub fn accepted_by(&self, role: Role) -> bool {
        match self.sender() {
            Role::Client => role == Role::Host,
            Role::Host => role == Role::Client,
            Role::None => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NetworkMessage::Input { .. } => "input",
            NetworkMessage::Ready { .. } => "ready",
            NetworkMessage::StepRequest => "step_request",
            NetworkMessage::Start => "start",
            NetworkMessage::DebugState { .. } => "debug_state",
            NetworkMessage::ReadyState { .. } => "ready_state",
            NetworkMessage::State { .. } => "state",
        }
    }

    /// Serialize message to text for transmission
    pub fn to_text(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an inbound message.
    /// `Ok(None)` means a well-formed message of a kind we do not know.
    pub fn from_text(text: &str) -> Result<Option<Self>> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| SyncError::ProtocolParse(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::ProtocolParse("missing message type".to_string()))?;
        if !KNOWN_KINDS.contains(&kind) {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| SyncError::ProtocolParse(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub alive: bool,
    pub score: u32,
    pub best: u32,
    pub reason: Option<DeathReason>,
    pub direction: Direction,
    pub queued_direction: Direction,
    pub snake: Vec<Cell>,
}

/// Host-authoritative view of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub winner: Option<Winner>,
    pub food: Cell,
    pub players: [PlayerSnapshot; 2],
}

impl Snapshot {
    pub fn capture(state: &MatchState) -> Self {
        let player = |i: usize| {
            let p = &state.players[i];
            PlayerSnapshot {
                id: p.id,
                alive: p.alive,
                score: p.score,
                best: p.best,
                reason: p.reason,
                direction: p.direction,
                queued_direction: p.queued_direction,
                snake: p.snake.iter().copied().collect(),
            }
        };
        Self {
            mode: state.mode,
            winner: state.winner,
            food: state.food,
            players: [player(0), player(1)],
        }
    }

    /// Overwrite the local mirror. Control kinds stay local; nothing else survives.
    pub fn apply_to(&self, state: &mut MatchState) -> Result<()> {
        if self.players[0].id == self.players[1].id {
            return Err(SyncError::ProtocolParse(
                "snapshot lists the same player twice".to_string(),
            ));
        }
        if self.players.iter().any(|p| p.snake.is_empty()) {
            return Err(SyncError::ProtocolParse(
                "snapshot contains an empty snake".to_string(),
            ));
        }

        state.mode = self.mode;
        state.winner = self.winner;
        state.food = self.food;
        for src in &self.players {
            let dst = state.player_mut(src.id);
            dst.alive = src.alive;
            dst.score = src.score;
            dst.best = src.best;
            dst.reason = src.reason;
            dst.direction = src.direction;
            dst.queued_direction = src.queued_direction;
            dst.snake = src.snake.iter().copied().collect();
        }
        Ok(())
    }
}
