// In-process loopback transport
// Lets two peers in one process negotiate and talk without sockets

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::channel::{ChannelEvent, MessageChannel};
use super::peer::{
    require_state, ConnectorFactory, NegotiationState, PeerConnector, SessionDescription,
};
use super::signaling::SignalKind;
use crate::error::{Result, SyncError};

const OFFER_PREFIX: &str = "memory-offer:";
const ANSWER_PREFIX: &str = "memory-answer:";

type Queue = Arc<Mutex<VecDeque<ChannelEvent>>>;

fn push(queue: &Queue, event: ChannelEvent) {
    if let Ok(mut q) = queue.lock() {
        q.push_back(event);
    }
}

/// One end of an in-memory link. Both ends start with `Open` queued.
#[derive(Debug)]
pub struct MemoryChannel {
    inbox: Queue,
    outbox: Queue,
    link_open: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryChannel {
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let a: Queue = Arc::new(Mutex::new(VecDeque::from([ChannelEvent::Open])));
        let b: Queue = Arc::new(Mutex::new(VecDeque::from([ChannelEvent::Open])));
        let link_open = Arc::new(AtomicBool::new(true));
        (
            MemoryChannel {
                inbox: a.clone(),
                outbox: b.clone(),
                link_open: link_open.clone(),
                closed: false,
            },
            MemoryChannel {
                inbox: b,
                outbox: a,
                link_open,
                closed: false,
            },
        )
    }

    /// Queue raw text for the other end, bypassing the protocol encoder
    pub fn inject(&self, text: &str) {
        push(&self.outbox, ChannelEvent::Message(text.to_string()));
    }
}

impl MessageChannel for MemoryChannel {
    fn is_open(&self) -> bool {
        !self.closed && self.link_open.load(Ordering::Acquire)
    }

    fn send(&mut self, text: &str) {
        if self.is_open() {
            push(&self.outbox, ChannelEvent::Message(text.to_string()));
        }
    }

    fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.inbox.lock().ok()?.pop_front()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.link_open.swap(false, Ordering::AcqRel) {
            push(&self.outbox, ChannelEvent::Closed);
        }
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rendezvous point for memory connectors: offers park the client end here
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    pending: Arc<Mutex<HashMap<u64, MemoryChannel>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectorFactory for MemoryNetwork {
    type Connector = MemoryConnector;

    fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            network: self.clone(),
            state: NegotiationState::Stable,
            link: None,
            channel: None,
        }
    }
}

#[derive(Debug)]
pub struct MemoryConnector {
    network: MemoryNetwork,
    state: NegotiationState,
    link: Option<u64>,
    channel: Option<MemoryChannel>,
}

impl Drop for MemoryConnector {
    fn drop(&mut self) {
        // An offer nobody accepted would park its client end forever
        if self.state != NegotiationState::HaveLocalOffer {
            return;
        }
        if let (Some(id), Ok(mut pending)) = (self.link, self.network.pending.lock()) {
            pending.remove(&id);
        }
    }
}

fn parse_link(desc: &SessionDescription, prefix: &str) -> Result<u64> {
    desc.sdp
        .strip_prefix(prefix)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SyncError::InvalidDescription(format!("not a memory link: {}", desc.sdp)))
}

impl PeerConnector for MemoryConnector {
    fn negotiation_state(&self) -> NegotiationState {
        self.state
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        require_state(self.state, NegotiationState::Stable)?;

        let id = self.network.next_id.fetch_add(1, Ordering::Relaxed);
        let (host_end, client_end) = MemoryChannel::pair();
        self.network
            .pending
            .lock()
            .map_err(|_| SyncError::Transport("memory network lock poisoned".to_string()))?
            .insert(id, client_end);

        self.channel = Some(host_end);
        self.link = Some(id);
        self.state = NegotiationState::HaveLocalOffer;
        Ok(SessionDescription::new(
            SignalKind::Offer,
            format!("{}{}", OFFER_PREFIX, id),
        ))
    }

    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        require_state(self.state, NegotiationState::Stable)?;
        let offer = offer.expect_kind(SignalKind::Offer)?;
        let id = parse_link(&offer, OFFER_PREFIX)?;

        let client_end = self
            .network
            .pending
            .lock()
            .map_err(|_| SyncError::Transport("memory network lock poisoned".to_string()))?
            .remove(&id)
            .ok_or_else(|| SyncError::InvalidDescription(format!("unknown offer {}", id)))?;

        self.channel = Some(client_end);
        self.link = Some(id);
        Ok(SessionDescription::new(
            SignalKind::Answer,
            format!("{}{}", ANSWER_PREFIX, id),
        ))
    }

    fn accept_answer(&mut self, answer: SessionDescription) -> Result<()> {
        require_state(self.state, NegotiationState::HaveLocalOffer)?;
        let answer = answer.expect_kind(SignalKind::Answer)?;
        let id = parse_link(&answer, ANSWER_PREFIX)?;
        if Some(id) != self.link {
            return Err(SyncError::InvalidDescription(format!(
                "answer {} does not match this offer",
                id
            )));
        }
        self.state = NegotiationState::Stable;
        Ok(())
    }

    fn into_channel(mut self) -> Result<Box<dyn MessageChannel>> {
        require_state(self.state, NegotiationState::Stable)?;
        let channel = self
            .channel
            .take()
            .ok_or_else(|| SyncError::Transport("no negotiated channel".to_string()))?;
        Ok(Box::new(channel))
    }
}
