use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;

use super::common::{build_peer, run_frames, spawn_command_reader};

/// How the two peers find each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendezvous {
    /// Through the room relay
    Room(String),
    /// Copy/paste codes, no relay
    Offline,
}

const NETWORK_HELP: &str =
    "Commands: ready | up/down/left/right | mode | step | paste <code> | state | quit";

/// Run a networked game as host
pub fn run_game_network_host(config: &Config, rendezvous: Rendezvous) -> Result<()> {
    let mut peer = build_peer(config)?;
    let commands = spawn_command_reader();

    match &rendezvous {
        Rendezvous::Room(room) => {
            info!("Network host mode, room {}", room);
            peer.host_room(room)?;
            println!("Hosting room '{}'. Waiting for the other player...", room.trim());
        }
        Rendezvous::Offline => {
            info!("Network host mode, offline codes");
            peer.host_offline()?;
            println!("Preparing invite...");
        }
    }
    println!("{}", NETWORK_HELP);

    let mut invite_shown = false;
    run_frames(&mut peer, &config.game, &commands, |peer| {
        if invite_shown {
            return;
        }
        if let Some(link) = peer.invite_link() {
            invite_shown = true;
            show_invite(&link);
        }
    });
    peer.cleanup_net();
    Ok(())
}

/// Run a networked game as client
pub fn run_game_network_client(
    config: &Config,
    rendezvous: Rendezvous,
    invite: Option<&str>,
) -> Result<()> {
    let mut peer = build_peer(config)?;
    let commands = spawn_command_reader();

    match (&rendezvous, invite) {
        (Rendezvous::Room(room), _) => {
            info!("Network client mode, room {}", room);
            peer.join_room(room)?;
            println!("Joining room '{}'...", room.trim());
        }
        (Rendezvous::Offline, Some(invite)) => {
            info!("Network client mode, offline invite");
            peer.join_offline(invite)?;
            println!("Invite accepted, preparing answer...");
        }
        (Rendezvous::Offline, None) => {
            println!("Paste the host's invite with: paste <code-or-link>");
        }
    }
    println!("{}", NETWORK_HELP);

    let mut answer_shown = false;
    run_frames(&mut peer, &config.game, &commands, |peer| {
        if answer_shown {
            return;
        }
        if let Some(code) = peer.answer_code() {
            answer_shown = true;
            println!("Send this answer code to the host:\n{}", code);
        }
    });
    peer.cleanup_net();
    Ok(())
}

/// Print the invite and put it on the clipboard when one is available
fn show_invite(link: &str) {
    println!("Invite for the other player:\n{}", link);
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(link.to_string())) {
        Ok(()) => println!("(copied to clipboard)"),
        Err(e) => warn!("Clipboard unavailable: {}", e),
    }
    println!("Then paste their answer with: paste <code>");
}
