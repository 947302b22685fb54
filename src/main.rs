//! Arena Replica
//!
//! ```text
//! arena-replica keygen <name> [--relay]   generate keys/<name>/ (and publish as relay key)
//! arena-replica relay                      run the frame relay
//! arena-replica peer <name>                run a headless peer reading commands from stdin
//! ```
//!
//! Peer commands: `w` `a` `s` `d`, `join`, `start`, `shoot X Y`, `status`, `quit`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use arena_replica::{
    VERSION,
    crypto::keys::{identity_exists, short_identity, KeyPair},
    game::{Action, Direction},
    network::{PeerClient, PeerConfig, PeerSession, RelayConfig, RelayServer},
};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["keygen", name] => keygen(name, false),
        ["keygen", name, "--relay"] => keygen(name, true),
        ["relay"] => run_relay().await,
        ["peer", name] => run_peer(name).await,
        _ => {
            eprintln!("usage: arena-replica keygen <name> [--relay] | relay | peer <name>");
            bail!("invalid arguments")
        }
    }
}

fn key_dir() -> PathBuf {
    std::env::var("ARENA_KEY_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("keys"))
}

/// Generate a named identity.
fn keygen(name: &str, relay: bool) -> Result<()> {
    let key_dir = key_dir();
    if identity_exists(&key_dir, name) {
        bail!("identity '{}' already exists in {}", name, key_dir.display());
    }

    info!("generating 2048-bit RSA key pair for '{}'", name);
    let keys = KeyPair::generate()?;
    let dir = keys.save_named(&key_dir, name)?;
    info!("keys written to {}", dir.display());

    if relay {
        let path = keys.save_as_relay_key(&key_dir)?;
        info!("relay public key published at {}", path.display());
    }
    info!("identity {}", short_identity(keys.public_key_pem()));
    Ok(())
}

async fn run_relay() -> Result<()> {
    let config = RelayConfig::from_env();
    info!("Arena Replica relay v{}", VERSION);

    let server = RelayServer::from_config(config.clone())
        .with_context(|| format!("loading relay identity '{}'", config.name))?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            server.shutdown();
        }
    }
    Ok(())
}

async fn run_peer(name: &str) -> Result<()> {
    let config = PeerConfig {
        name: name.to_string(),
        ..PeerConfig::from_env()
    };
    info!("Arena Replica peer v{} ({:?} world)", VERSION, config.world.topology);

    let client = PeerClient::from_config(config.clone())
        .with_context(|| format!("loading identity '{}' from {}", name, config.key_dir.display()))?;
    let session = client.session();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut client_task = tokio::spawn(client.run(shutdown_rx));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Some(Command::Act(action)) => {
                        if !session.queue_action(action) {
                            warn!("connection gone; action dropped");
                        }
                    }
                    Some(Command::Status) => print_status(&session).await,
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => warn!("unknown command {:?}", line.trim()),
                }
            }
            result = &mut client_task => {
                result??;
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = shutdown_tx.send(());
    client_task.await??;
    Ok(())
}

async fn print_status(session: &PeerSession) {
    let world = session.snapshot().await;
    let stats = session.stats().await;
    info!(
        phase = %world.phase,
        players = world.join_order.len(),
        alive = world.alive_count(),
        projectiles = world.projectiles.len(),
        frames = stats.frames_applied,
        gaps = stats.frame_gaps,
        hash = %hex::encode(world.compute_hash()),
        "status"
    );
    if let Some(winner) = &world.winner {
        info!("winner: {}", winner);
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Act(Action),
    Status,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "join" => Command::Act(Action::Join),
        "start" => Command::Act(Action::StartMatch),
        "shoot" => {
            let x = words.next()?.parse().ok()?;
            let y = words.next()?.parse().ok()?;
            Command::Act(Action::shoot(x, y))
        }
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        key => Command::Act(Action::moving(Direction::from_key(key)?)),
    };
    // Trailing words mean a typo; refuse rather than guess
    match words.next() {
        Some(_) => None,
        None => Some(command),
    }
}
