// Peer synchronisation
// Ties the session, the ready handshake and the simulation together

mod controller;
pub mod ready;
mod router;

pub use controller::{PeerSettings, SnakePeer};
pub use ready::{compute_start_intent, ReadyState, StartIntent};
