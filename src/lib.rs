//! P2Snake: two-player snake over a peer-to-peer data channel.
//!
//! The host runs the simulation and streams snapshots; the client mirrors them
//! and forwards its steering. Peers find each other through a small HTTP room
//! relay or by exchanging copy/paste codes.

pub mod config;
pub mod debug;
pub mod error;
pub mod game;
pub mod game_modes;
pub mod network;
pub mod sync;

pub use error::{Result, SyncError};
