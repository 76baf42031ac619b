pub mod common;
mod local;
mod network;

pub use local::run_game_local;
pub use network::{run_game_network_client, run_game_network_host, Rendezvous};
