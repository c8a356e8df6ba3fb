// CLI entry point: headless LAN Play node.
//
// Runs one node of a LAN session without a game attached. Useful as a
// dedicated host, for checking that discovery works on a network, or as a
// second player while testing the game.
//
// Usage:
//   lanplay [OPTIONS] [MODE]
//     --config <PATH>    JSON session config (default: built-in defaults)
//     --name <NAME>      Player name (overrides config and LANPLAY_PLAYER_NAME)
//   MODE:
//     auto               Join an advertised host or become one (default)
//     host               Host without looking for other hosts
//     join <ADDR>        Join the host at ip:port
//     browse             Print advertised hosts once a second
//
// Logging is controlled by RUST_LOG (default: info).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use lanplay_protocol::PlayerState;
use lanplay_session::{
    Arbitrator, ContentCatalog, DiscoveryListener, SessionConfig, SessionContext, SessionMode,
};
use tracing::{error, info};

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

enum Mode {
    Auto,
    Host,
    Join(SocketAddr),
    Browse,
}

struct Args {
    config_path: Option<PathBuf>,
    player_name: Option<String>,
    mode: Mode,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    match args.mode {
        Mode::Browse => browse(&config),
        mode => play(config, mode),
    }
}

fn load_config(args: &Args) -> lanplay_session::Result<SessionConfig> {
    let mut config = match &args.config_path {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(name) = &args.player_name {
        config.player_name = name.clone();
    }
    config.validate()?;
    Ok(config)
}

fn browse(config: &SessionConfig) {
    let listener = match DiscoveryListener::start(config) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to listen for hosts: {e}");
            process::exit(1);
        }
    };
    println!("Listening for hosts on {}", listener.local_addr());
    loop {
        thread::sleep(Duration::from_secs(1));
        let hosts = listener.snapshot();
        if hosts.is_empty() {
            println!("(no hosts)");
        }
        for host in hosts {
            println!("{}", host.display_line());
        }
    }
}

fn play(config: SessionConfig, mode: Mode) {
    let catalog = ContentCatalog::from_config(&config.content);
    let arbitrator = Arbitrator::new(config.clone(), catalog);
    let mut session = SessionContext::new(config.clone());

    let started = match mode {
        Mode::Host => session.host(&arbitrator),
        Mode::Join(addr) => session.join(&arbitrator, addr),
        Mode::Auto | Mode::Browse => session.go_online(&arbitrator),
    };
    if let Err(e) = started {
        eprintln!("Failed to go online: {e}");
        process::exit(1);
    }

    let me = PlayerState::new(config.player_name.clone(), 0.0, 0.0);
    let mut last_status = Instant::now();
    while session.mode() != SessionMode::Offline {
        session.tick(&me);
        for chat in session.drain_chat() {
            println!("<{}> {}", chat.from, chat.text);
        }
        if last_status.elapsed() >= STATUS_INTERVAL {
            let status = session.status();
            info!(
                mode = ?status.mode,
                clients = ?status.client_count,
                players = status.remote_players.len(),
                "status"
            );
            last_status = Instant::now();
        }
        thread::sleep(TICK_INTERVAL);
    }
    error!("session ended");
    process::exit(1);
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> Args {
    let mut parsed = Args {
        config_path: None,
        player_name: None,
        mode: Mode::Auto,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config_path = Some(args.get(i).map(PathBuf::from).unwrap_or_else(|| {
                    eprintln!("--config requires a path");
                    process::exit(1);
                }));
            }
            "--name" => {
                i += 1;
                parsed.player_name = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--name requires a value");
                    process::exit(1);
                }));
            }
            "auto" => parsed.mode = Mode::Auto,
            "host" => parsed.mode = Mode::Host,
            "browse" => parsed.mode = Mode::Browse,
            "join" => {
                i += 1;
                let addr = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("join requires a host address (ip:port)");
                    process::exit(1);
                });
                parsed.mode = Mode::Join(addr);
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_usage() {
    println!("Usage: lanplay [OPTIONS] [MODE]");
    println!();
    println!("Options:");
    println!("  --config <PATH>    JSON session config");
    println!("  --name <NAME>      Player name");
    println!("  --help, -h         Show this help");
    println!();
    println!("Modes:");
    println!("  auto               Join an advertised host or become one (default)");
    println!("  host               Host without looking for other hosts");
    println!("  join <ADDR>        Join the host at ip:port");
    println!("  browse             Print advertised hosts once a second");
}
