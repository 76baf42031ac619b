use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::state::{Direction, Mode, PlayerId};
use crate::network::Role;

/// Local player intents, whatever device produced them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputAction {
    Steer(Direction),
    /// Start (local) or toggle readiness (networked)
    Ready,
    Step,
    ToggleStepMode,
}

impl FromStr for InputAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "w" | "i" | "8" => Ok(InputAction::Steer(Direction::UP)),
            "down" | "s" | "k" | "2" => Ok(InputAction::Steer(Direction::DOWN)),
            "left" | "a" | "j" | "4" => Ok(InputAction::Steer(Direction::LEFT)),
            "right" | "d" | "l" | "6" => Ok(InputAction::Steer(Direction::RIGHT)),
            "ready" | "r" | "start" => Ok(InputAction::Ready),
            "step" | "n" => Ok(InputAction::Step),
            "mode" | "t" => Ok(InputAction::ToggleStepMode),
            other => Err(format!("unknown action: {}", other)),
        }
    }
}

/// Only the authoritative side (host or local) may switch step mode
pub fn can_toggle_step_mode(role: Role) -> bool {
    role != Role::Client
}

pub fn can_request_step(mode: Mode, step_mode: bool) -> bool {
    mode == Mode::Playing && step_mode
}

/// The client steers p2; host and local keyboards steer p1
pub fn controlled_player(role: Role) -> PlayerId {
    match role {
        Role::Client => PlayerId::P2,
        Role::Host | Role::None => PlayerId::P1,
    }
}
