use serde::{Deserialize, Serialize};

use crate::network::{NetworkMessage, Phase, Role};

/// The two readiness flags. The host's copy is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyState {
    pub host_ready: bool,
    pub client_ready: bool,
}

impl ReadyState {
    pub fn both(&self) -> bool {
        self.host_ready && self.client_ready
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn message(&self) -> NetworkMessage {
        NetworkMessage::ReadyState {
            host_ready: self.host_ready,
            client_ready: self.client_ready,
        }
    }
}

/// What pressing "ready/start" means in the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartIntent {
    ToggleHostReady(bool),
    ToggleClientReady(bool),
    StartLocal,
    Noop,
}

pub fn compute_start_intent(role: Role, phase: Phase, ready: ReadyState) -> StartIntent {
    match role {
        Role::Host if phase == Phase::Connected => StartIntent::ToggleHostReady(!ready.host_ready),
        Role::Client if phase == Phase::Connected => {
            StartIntent::ToggleClientReady(!ready.client_ready)
        }
        Role::Host | Role::Client => StartIntent::Noop,
        Role::None => StartIntent::StartLocal,
    }
}
