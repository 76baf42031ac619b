// Peer session lifecycle
// Owns the transport and the phase machine: idle -> waiting-answer -> connecting -> connected

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::channel::{ChannelEvent, MessageChannel};
use super::negotiate::{JoinGuard, TaggedOutcome, Ticket};
use super::protocol::NetworkMessage;
use crate::error::{Result, SyncError};

pub const CONNECTION_CLOSED: &str = "connection closed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    None,
    Host,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    WaitingAnswer,
    Connecting,
    Connected,
}

/// What the session surfaced while draining its queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    Message(String),
    /// Negotiation failed; the session is already back to idle
    Failed(String),
    /// The channel went away; the session is already back to idle
    Closed,
}

pub struct Session {
    role: Role,
    phase: Phase,
    transport: Option<Box<dyn MessageChannel>>,
    last_error: Option<String>,
    join_in_flight: Arc<AtomicU64>,
    epoch: u64,
    outcome_tx: mpsc::Sender<TaggedOutcome>,
    outcome_rx: mpsc::Receiver<TaggedOutcome>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel();
        Self {
            role: Role::None,
            phase: Phase::Idle,
            transport: None,
            last_error: None,
            join_in_flight: Arc::new(AtomicU64::new(0)),
            epoch: 0,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn join_in_flight(&self) -> bool {
        self.join_in_flight.load(Ordering::Acquire) != 0
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// Start hosting: the returned ticket belongs to the new attempt
    pub fn begin_host(&mut self, room: &str) -> Result<Ticket> {
        validate_room(room)?;
        self.cleanup();
        self.epoch += 1;
        self.role = Role::Host;
        self.phase = Phase::WaitingAnswer;
        self.last_error = None;
        info!("Hosting room {} (attempt {})", room.trim(), self.epoch);
        Ok(self.ticket(None))
    }

    /// Start joining. `Ok(None)` while another join is still in flight.
    pub fn begin_join(&mut self, room: &str) -> Result<Option<Ticket>> {
        validate_room(room)?;
        if self.join_in_flight() {
            debug!("Join already in flight, ignoring");
            return Ok(None);
        }
        self.cleanup();
        self.epoch += 1;
        self.role = Role::Client;
        self.phase = Phase::Connecting;
        self.last_error = None;
        info!("Joining room {} (attempt {})", room.trim(), self.epoch);
        let guard = JoinGuard::acquire(&self.join_in_flight, self.epoch);
        Ok(Some(self.ticket(Some(guard))))
    }

    fn ticket(&self, join: Option<JoinGuard>) -> Ticket {
        Ticket {
            epoch: self.epoch,
            tx: self.outcome_tx.clone(),
            join,
        }
    }

    /// Tear everything down. Safe from any phase, any number of times.
    pub fn cleanup(&mut self) {
        if self.role != Role::None || self.transport.is_some() {
            // Outstanding attempts become stale
            self.epoch += 1;
            debug!("Session cleanup, epoch now {}", self.epoch);
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.role = Role::None;
        self.phase = Phase::Idle;
        self.join_in_flight.store(0, Ordering::Release);
    }

    /// Record a failure and return to idle
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("Session failed: {}", message);
        self.cleanup();
        self.last_error = Some(message);
    }

    /// Drain negotiation outcomes, then channel events, in arrival order
    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        while let Ok(tagged) = self.outcome_rx.try_recv() {
            if tagged.epoch != self.epoch {
                debug!(
                    "Dropping stale negotiation outcome (attempt {}, current {})",
                    tagged.epoch, self.epoch
                );
                continue;
            }
            match tagged.outcome {
                Ok(transport) => {
                    info!("Negotiation complete, waiting for channel to open");
                    self.transport = Some(transport);
                    self.phase = Phase::Connecting;
                }
                Err(e) => {
                    self.fail(e.to_string());
                    events.push(SessionEvent::Failed(e.to_string()));
                }
            }
        }

        while let Some(event) = self.transport.as_mut().and_then(|t| t.try_recv()) {
            match event {
                ChannelEvent::Open => {
                    info!("Channel open, connected as {:?}", self.role);
                    self.phase = Phase::Connected;
                    self.last_error = None;
                    events.push(SessionEvent::Opened);
                }
                ChannelEvent::Message(text) => events.push(SessionEvent::Message(text)),
                ChannelEvent::Closed => {
                    self.fail(CONNECTION_CLOSED);
                    events.push(SessionEvent::Closed);
                }
                ChannelEvent::Error(e) => {
                    self.fail(format!("{}: {}", CONNECTION_CLOSED, e));
                    events.push(SessionEvent::Closed);
                }
            }
        }

        events
    }

    /// Send when connected, otherwise drop silently
    pub fn send(&mut self, msg: &NetworkMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if !transport.is_open() {
            return;
        }
        match msg.to_text() {
            Ok(text) => transport.send(&text),
            Err(e) => warn!("Failed to encode {} message: {}", msg.kind(), e),
        }
    }
}

fn validate_room(room: &str) -> Result<()> {
    if room.trim().is_empty() {
        Err(SyncError::InvalidRoomInput)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryChannel;

    fn connected_host() -> (Session, MemoryChannel) {
        let mut session = Session::new();
        let ticket = session.begin_host("room").unwrap();
        let (local, remote) = MemoryChannel::pair();
        ticket.finish(Ok(Box::new(local)));
        assert_eq!(session.poll(), vec![SessionEvent::Opened]);
        (session, remote)
    }

    #[test]
    fn test_blank_room_is_rejected_before_anything_happens() {
        let mut session = Session::new();
        assert!(matches!(session.begin_host("  "), Err(SyncError::InvalidRoomInput)));
        assert!(matches!(session.begin_join(""), Err(SyncError::InvalidRoomInput)));
        assert_eq!(session.role(), Role::None);
        assert_eq!(session.epoch(), 0);
    }

    #[test]
    fn test_host_phases() {
        let mut session = Session::new();
        let ticket = session.begin_host("room").unwrap();
        assert_eq!(session.role(), Role::Host);
        assert_eq!(session.phase(), Phase::WaitingAnswer);

        let (local, _remote) = MemoryChannel::pair();
        ticket.finish(Ok(Box::new(local)));
        let events = session.poll();

        assert_eq!(events, vec![SessionEvent::Opened]);
        assert_eq!(session.phase(), Phase::Connected);
        assert!(session.has_transport());
    }

    #[test]
    fn test_join_is_connecting_immediately_and_guarded() {
        let mut session = Session::new();
        let ticket = session.begin_join("room").unwrap().unwrap();
        assert_eq!(session.phase(), Phase::Connecting);
        assert!(session.join_in_flight());

        assert!(session.begin_join("room").unwrap().is_none());
        assert_eq!(session.epoch(), ticket.epoch());

        ticket.finish(Err(SyncError::OfferTimeout));
        assert!(!session.join_in_flight());
        assert_eq!(session.poll(), vec![SessionEvent::Failed(SyncError::OfferTimeout.to_string())]);
        assert_eq!(session.role(), Role::None);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.last_error(), Some("Timed out waiting for the host offer"));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let (mut session, _remote) = connected_host();

        session.cleanup();
        let once = (session.role(), session.phase(), session.has_transport(), session.epoch());
        session.cleanup();
        let twice = (session.role(), session.phase(), session.has_transport(), session.epoch());

        assert_eq!(once, (Role::None, Phase::Idle, false, once.3));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_outcome_after_cleanup_is_stale() {
        let mut session = Session::new();
        let ticket = session.begin_host("room").unwrap();
        session.cleanup();

        let (local, mut remote) = MemoryChannel::pair();
        ticket.finish(Ok(Box::new(local)));

        assert!(session.poll().is_empty());
        assert!(!session.has_transport());
        // the stale transport was dropped, which closed it
        assert_eq!(remote.try_recv(), Some(ChannelEvent::Open));
        assert_eq!(remote.try_recv(), Some(ChannelEvent::Closed));
    }

    #[test]
    fn test_cleanup_releases_join_guard() {
        let mut session = Session::new();
        let stale = session.begin_join("room").unwrap().unwrap();
        session.cleanup();
        assert!(!session.join_in_flight());

        let fresh = session.begin_join("room").unwrap().unwrap();
        drop(stale);
        assert!(session.join_in_flight());
        drop(fresh);
        assert!(!session.join_in_flight());
    }

    #[test]
    fn test_remote_close_returns_to_idle() {
        let (mut session, mut remote) = connected_host();
        remote.close();

        assert_eq!(session.poll(), vec![SessionEvent::Closed]);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.role(), Role::None);
        assert_eq!(session.last_error(), Some(CONNECTION_CLOSED));
    }

    #[test]
    fn test_send_is_dropped_when_not_connected() {
        let mut session = Session::new();
        session.send(&NetworkMessage::Start);

        let (mut session, mut remote) = connected_host();
        remote.try_recv();
        session.send(&NetworkMessage::Start);
        assert_eq!(
            remote.try_recv(),
            Some(ChannelEvent::Message(r#"{"type":"start"}"#.to_string()))
        );
    }
}
