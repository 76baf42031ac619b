use anyhow::{bail, Context};
use tracing::info;

use p2snake::config::load_config;
use p2snake::debug;
use p2snake::game_modes::{
    run_game_local, run_game_network_client, run_game_network_host, Rendezvous,
};

/// What the command line asked for
#[derive(Debug, Clone, PartialEq, Eq)]
enum Launch {
    Local,
    Host(Rendezvous),
    Join(Rendezvous, Option<String>),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    launch: Launch,
    relay_url: Option<String>,
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let program = argv.first().map(String::as_str).unwrap_or("p2snake");
    let args = match parse_args(argv.get(1..).unwrap_or_default()) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(program);
            std::process::exit(1);
        }
    };

    if args.launch == Launch::Help {
        print_usage(program);
        return Ok(());
    }

    debug::init(args.debug).context("failed to open the debug log")?;
    if args.debug {
        eprintln!("Debug logging to {}", debug::LOG_FILE_PATH);
    }

    let mut config = load_config().context("failed to load configuration")?;
    if let Some(url) = args.relay_url {
        config.network.relay_url = url;
    }
    info!("Relay: {}", config.network.relay_url);

    match args.launch {
        Launch::Local => run_game_local(&config)?,
        Launch::Host(rendezvous) => run_game_network_host(&config, rendezvous)?,
        Launch::Join(rendezvous, invite) => {
            run_game_network_client(&config, rendezvous, invite.as_deref())?
        }
        Launch::Help => {}
    }
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut launch = None;
    let mut relay_url = None;
    let mut debug = false;

    let mut it = args.iter().peekable();
    while let Some(arg) = it.next() {
        let next = match arg.as_str() {
            "--local" => Some(Launch::Local),
            "--host" | "-l" => {
                let room = it.next().context("--host requires a room id")?;
                Some(Launch::Host(Rendezvous::Room(room.clone())))
            }
            "--join" | "-c" => {
                let room = it.next().context("--join requires a room id")?;
                Some(Launch::Join(Rendezvous::Room(room.clone()), None))
            }
            "--offer" => Some(Launch::Host(Rendezvous::Offline)),
            "--answer" => {
                let invite = it.next_if(|a| !a.starts_with("--")).cloned();
                Some(Launch::Join(Rendezvous::Offline, invite))
            }
            "--relay" => {
                relay_url = Some(it.next().context("--relay requires a url")?.clone());
                None
            }
            "--debug" => {
                debug = true;
                None
            }
            "--help" | "-h" => Some(Launch::Help),
            other => bail!("unknown argument: {}", other),
        };
        if let Some(next) = next {
            if launch.is_some() && next != Launch::Help {
                bail!("choose one of --local, --host, --join, --offer, --answer");
            }
            launch = Some(next);
        }
    }

    Ok(Args {
        launch: launch.unwrap_or(Launch::Local),
        relay_url,
        debug,
    })
}

fn print_usage(program: &str) {
    println!("P2Snake - two-player snake over WebRTC");
    println!();
    println!("Usage:");
    println!("  {}                         # Local game, both snakes on this machine", program);
    println!("  {} --host <room>           # Host through the room relay", program);
    println!("  {} --join <room>           # Join a hosted room", program);
    println!("  {} --offer                 # Host without a relay (prints an invite)", program);
    println!("  {} --answer [invite]       # Join from an invite code or link", program);
    println!();
    println!("Options:");
    println!("  --relay <url>   Room relay root (default from config)");
    println!("  --debug         Verbose logging to {}", debug::LOG_FILE_PATH);
    println!();
    println!("While running, type commands on stdin:");
    println!("  ready | up | down | left | right | mode | step | paste <code> | state | quit");
}
