// Error taxonomy for session establishment and the peer protocol

use crate::network::peer::NegotiationState;
use crate::network::signaling::SignalKind;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Timeout waiting for signal {kind}")]
    SignalTimeout { kind: SignalKind },

    #[error("Timed out waiting for the host offer")]
    OfferTimeout,

    #[error("Timed out waiting for the client answer")]
    AnswerTimeout,

    #[error("Unexpected negotiation state: expected {expected}, found {found}")]
    NegotiationState {
        expected: NegotiationState,
        found: NegotiationState,
    },

    #[error("Room id must not be empty")]
    InvalidRoomInput,

    #[error("Failed to parse peer message: {0}")]
    ProtocolParse(String),

    #[error("Signal relay request failed ({status})")]
    Relay { status: u16 },

    #[error("Signal relay unreachable: {0}")]
    RelayUnreachable(#[from] reqwest::Error),

    #[error("Invalid session description: {0}")]
    InvalidDescription(String),

    #[error("Invalid connection code: {0}")]
    InvalidCode(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
