// Peer connection negotiation seam
// A connector produces and applies session descriptions, then yields the open channel

use std::fmt;

use serde::{Deserialize, Serialize};

use super::channel::MessageChannel;
use super::signaling::SignalKind;
use crate::error::{Result, SyncError};

/// Opaque connection description, shaped like a browser `RTCSessionDescription`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(kind: SignalKind, sdp: impl Into<String>) -> Self {
        Self {
            kind,
            sdp: sdp.into(),
        }
    }

    /// Reject a description of the wrong type
    pub fn expect_kind(self, kind: SignalKind) -> Result<Self> {
        if self.kind == kind {
            Ok(self)
        } else {
            Err(SyncError::InvalidDescription(format!(
                "expected {}, got {}",
                kind, self.kind
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Stable => "stable",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Fail unless the connector is where the next step expects it
pub fn require_state(found: NegotiationState, expected: NegotiationState) -> Result<()> {
    if found == expected {
        Ok(())
    } else {
        Err(SyncError::NegotiationState { expected, found })
    }
}

/// One side of a peer connection, before the channel opens.
///
/// `create_offer` and `accept_offer` finish candidate gathering before they
/// return, so the descriptions they produce are complete.
#[allow(async_fn_in_trait)]
pub trait PeerConnector {
    fn negotiation_state(&self) -> NegotiationState;

    /// Host: create the data channel and the local offer
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Client: apply the remote offer and produce the local answer
    async fn accept_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Host: apply the remote answer
    fn accept_answer(&mut self, answer: SessionDescription) -> Result<()>;

    /// Hand the negotiated connection over as a channel. Its `Open` event follows.
    fn into_channel(self) -> Result<Box<dyn MessageChannel>>;
}

/// Makes a fresh connector for each negotiation attempt
pub trait ConnectorFactory: Send + Sync + 'static {
    type Connector: PeerConnector + Send + 'static;

    fn connector(&self) -> Self::Connector;
}
