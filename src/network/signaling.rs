// Signaling exchange
// Carries the two session descriptions (offer, answer) between peers through a
// room-keyed store. Knows nothing about the game.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::peer::SessionDescription;
use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store-and-poll transport for session descriptions.
/// Last write wins per (room, kind); `get` answers `None` when nothing is stored.
#[allow(async_fn_in_trait)]
pub trait SignalRelay {
    async fn put(&self, room: &str, kind: SignalKind, payload: &SessionDescription) -> Result<()>;

    async fn get(&self, room: &str, kind: SignalKind) -> Result<Option<SessionDescription>>;

    async fn clear(&self, room: &str, kind: SignalKind) -> Result<()>;
}

/// Polling cadence and deadline for one wait on the relay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalTimings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for SignalTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Retry `get` until a description shows up or the deadline passes
pub async fn poll_signal<R: SignalRelay>(
    relay: &R,
    room: &str,
    kind: SignalKind,
    timings: SignalTimings,
) -> Result<SessionDescription> {
    let deadline = tokio::time::Instant::now() + timings.timeout;
    loop {
        if let Some(payload) = relay.get(room, kind).await? {
            return Ok(payload);
        }
        if tokio::time::Instant::now() + timings.poll_interval > deadline {
            return Err(SyncError::SignalTimeout { kind });
        }
        debug!("No {} yet in room {}, retrying", kind, room);
        tokio::time::sleep(timings.poll_interval).await;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Room {
    pub offer: Option<Value>,
    pub answer: Option<Value>,
    /// Milliseconds since the unix epoch of the last write
    pub updated_at: u64,
}

impl Room {
    fn slot(&mut self, kind: SignalKind) -> &mut Option<Value> {
        match kind {
            SignalKind::Offer => &mut self.offer,
            SignalKind::Answer => &mut self.answer,
        }
    }
}

/// Rooms keyed by id, created lazily on first access and kept for the process lifetime
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Room>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn room(&mut self, id: &str) -> &mut Room {
        self.rooms.entry(id.to_string()).or_insert_with(|| Room {
            updated_at: now_millis(),
            ..Room::default()
        })
    }

    /// Stored payload and the room's last update time
    pub fn get(&mut self, id: &str, kind: SignalKind) -> Option<(Value, u64)> {
        let room = self.room(id);
        let updated_at = room.updated_at;
        room.slot(kind).clone().map(|payload| (payload, updated_at))
    }

    /// A null payload is stored as absent
    pub fn set(&mut self, id: &str, kind: SignalKind, payload: Option<Value>) {
        let room = self.room(id);
        *room.slot(kind) = payload.filter(|p| !p.is_null());
        room.updated_at = now_millis();
    }

    pub fn clear(&mut self, id: &str, kind: SignalKind) {
        self.set(id, kind, None);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// In-process relay over a shared `RoomStore`
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    store: Arc<Mutex<RoomStore>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut RoomStore) -> T) -> Result<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| SyncError::Transport("room store lock poisoned".to_string()))?;
        Ok(f(&mut store))
    }
}

impl SignalRelay for MemoryRelay {
    async fn put(&self, room: &str, kind: SignalKind, payload: &SessionDescription) -> Result<()> {
        let value = serde_json::to_value(payload)
            .map_err(|e| SyncError::InvalidDescription(e.to_string()))?;
        self.with_store(|store| store.set(room, kind, Some(value)))
    }

    async fn get(&self, room: &str, kind: SignalKind) -> Result<Option<SessionDescription>> {
        let stored = self.with_store(|store| store.get(room, kind))?;
        stored
            .map(|(value, _)| {
                serde_json::from_value(value)
                    .map_err(|e| SyncError::InvalidDescription(e.to_string()))
            })
            .transpose()
    }

    async fn clear(&self, room: &str, kind: SignalKind) -> Result<()> {
        self.with_store(|store| store.clear(room, kind))
    }
}
