use tracing::info;

use crate::config::Config;
use crate::error::Result;

use super::common::{build_peer, run_frames, spawn_command_reader};

/// Run a two-snake game on one machine (no networking).
/// p1 takes plain directions, p2 takes `p2 <direction>`.
pub fn run_game_local(config: &Config) -> Result<()> {
    info!("Local 2-player mode");

    let mut peer = build_peer(config)?;
    let commands = spawn_command_reader();

    println!("Local game. Commands: ready | up/down/left/right | p2 <dir> | mode | step | state | quit");
    peer.start_local();

    run_frames(&mut peer, &config.game, &commands, |_| {});
    Ok(())
}
