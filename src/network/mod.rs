// Peer networking for P2Snake
// Signaling, negotiation, the session lifecycle and the typed message protocol

pub mod channel;
pub mod http_relay;
pub mod memory;
pub mod negotiate;
pub mod offline;
pub mod peer;
pub mod protocol;
pub mod relay_server;
pub mod session;
pub mod signaling;
pub mod webrtc_runtime;

pub use channel::{ChannelEvent, MessageChannel};
pub use http_relay::HttpRelay;
pub use offline::ManualRelay;
pub use peer::{ConnectorFactory, PeerConnector, SessionDescription};
pub use protocol::{NetworkMessage, Snapshot};
pub use session::{Phase, Role, Session, SessionEvent};
pub use signaling::{MemoryRelay, SignalKind, SignalRelay, SignalTimings};
pub use webrtc_runtime::Str0mFactory;
