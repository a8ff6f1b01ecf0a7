//! `desp` command-line host.
//!
//! A thin line-oriented front end over the library:
//!
//! - `desp chat` joins a multicast group, prints every inbound message and
//!   sends each stdin line to the group.  `/quit`, end of input or Ctrl-C
//!   closes the session; the program exits once the session reports its
//!   terminal event.
//! - `desp scan` sweeps the /24 around a base address for peers answering a
//!   unicast ping, printing progress and discovered peers.  Ctrl-C cancels.
//! - `desp init` writes a default config file to edit.
//!
//! Settings come from the TOML config file (see
//! [`desp_node::infrastructure::storage::config`]), overridden by
//! command-line flags and their environment variables.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use desp_core::{InboundMessage, ScanEvent, SessionEvent, Transport};
use desp_node::infrastructure::network::{
    interface, MulticastSession, RangeScan, ScanConfig, SessionConfig,
};
use desp_node::infrastructure::storage::config::{self, AppConfig};

/// Input line that closes a chat session.
const QUIT_COMMAND: &str = "/quit";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LAN peer discovery and messaging over UDP multicast.
#[derive(Debug, Parser)]
#[command(name = "desp", version)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, global = true, env = "DESP_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `debug`).
    #[arg(long, global = true, env = "DESP_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Join a multicast group and exchange messages with its members.
    Chat(ChatArgs),
    /// Sweep a /24 for peers answering a unicast ping.
    Scan(ScanArgs),
    /// Write a default config file.
    Init(InitArgs),
}

#[derive(Debug, Args)]
struct ChatArgs {
    /// Multicast group as `ip` or `ip:port`.
    #[arg(long, env = "DESP_GROUP")]
    group: Option<String>,

    /// Local address to send from and join the group on.
    #[arg(long, env = "DESP_SOURCE")]
    source: Option<String>,

    /// Address to bind the receive socket to instead of the group address.
    #[arg(long, env = "DESP_BIND")]
    bind: Option<String>,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Any address in the /24 to sweep; defaults to this host's first
    /// non-loopback IPv4 address.
    #[arg(long)]
    base: Option<Ipv4Addr>,

    /// Port to probe on every candidate.
    #[arg(long)]
    port: Option<u16>,

    /// Per-probe timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Probe over TCP instead of UDP.
    #[arg(long)]
    tcp: bool,
}

#[derive(Debug, Args)]
struct InitArgs {
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

impl ChatArgs {
    /// Overlays the flags that were given onto `[session]`.
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(group) = &self.group {
            cfg.session.group = group.clone();
        }
        if let Some(source) = &self.source {
            cfg.session.source_address = Some(source.clone());
        }
        if let Some(bind) = &self.bind {
            cfg.session.bind_address = Some(bind.clone());
        }
    }
}

impl ScanArgs {
    /// Overlays the flags that were given onto `[scan]`.
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(port) = self.port {
            cfg.scan.port = port;
        }
        if let Some(ms) = self.timeout_ms {
            cfg.scan.probe_timeout_ms = ms;
        }
        if self.tcp {
            cfg.scan.transport = Transport::Tcp;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Init must work even when the existing file no longer parses.
    if let Command::Init(args) = &cli.command {
        let path = run_init(cli.config.as_deref(), args.force)?;
        println!("wrote default config to {}", path.display());
        return Ok(());
    }

    let mut cfg = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => config::load_config().context("failed to load config")?,
    };

    // RUST_LOG wins, then --log-level, then the config file.
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| cfg.general.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Chat(args) => {
            args.apply(&mut cfg);
            let session = cfg.session_config().context("invalid [session] settings")?;
            run_chat(session).await
        }
        Command::Scan(args) => {
            args.apply(&mut cfg);
            let base = match args.base {
                Some(base) => base,
                None => interface::primary_ipv4()
                    .context("failed to enumerate network interfaces")?
                    .ok_or_else(|| anyhow!("no non-loopback IPv4 address found; pass --base"))?,
            };
            run_scan(cfg.scan_config(base)).await
        }
        Command::Init(_) => Ok(()),
    }
}

// ── init ──────────────────────────────────────────────────────────────────────

/// Writes `AppConfig::default()` to `path` (or the platform config file) and
/// returns where it went.
fn run_init(path: Option<&Path>, force: bool) -> anyhow::Result<PathBuf> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config::config_file_path().context("failed to locate config file")?,
    };
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    config::save_config_to(&path, &AppConfig::default())
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    Ok(path)
}

// ── chat ──────────────────────────────────────────────────────────────────────

async fn run_chat(config: SessionConfig) -> anyhow::Result<()> {
    let (mut session, mut events) =
        MulticastSession::open(config).context("failed to open multicast session")?;
    let own_addr = session.send_addr();
    println!(
        "joined {} as {} (type {QUIT_COMMAND} to leave)",
        session.group(),
        own_addr
    );

    let mut lines = spawn_stdin_reader();
    let mut input_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::Message(msg)) => println!("{}", render_message(&msg, own_addr)),
                Some(SessionEvent::Closed) | None => {
                    info!("session closed");
                    return Ok(());
                }
                Some(SessionEvent::Failed { reason }) => {
                    error!("session failed: {reason}");
                    bail!("multicast session failed: {reason}");
                }
            },
            line = lines.recv(), if input_open => match line {
                Some(line) if line.trim() == QUIT_COMMAND => session.close(),
                Some(line) if line.is_empty() => {}
                Some(line) => {
                    if let Err(e) = session.send(line.as_bytes()) {
                        warn!("send failed: {e}");
                    }
                }
                None => {
                    debug!("stdin closed");
                    input_open = false;
                    session.close();
                }
            },
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                session.close();
            }
        }
    }
}

/// Formats an inbound message, marking our own echo.
fn render_message(msg: &InboundMessage, own_addr: SocketAddr) -> String {
    let text = String::from_utf8_lossy(&msg.payload);
    if msg.source == own_addr {
        format!("[me] {text}")
    } else {
        format!("[{}] {text}", msg.source)
    }
}

/// Reads stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("desp-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        // The sender was moved into the failed closure and dropped, so the
        // receiver reports end of input.
        warn!("failed to start stdin reader: {e}");
    }
    rx
}

// ── scan ──────────────────────────────────────────────────────────────────────

async fn run_scan(config: ScanConfig) -> anyhow::Result<()> {
    let port = config.port;
    let (scan, mut events) = RangeScan::start(config).context("failed to start scan")?;
    println!("scanning {} on port {port}", scan.subnet());

    let mut peers = Vec::new();
    let mut cancelled = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ScanEvent::Step { index, transport }) => {
                    eprint!("\r[{}] {index:>3}/254", transport.tag());
                    let _ = std::io::stderr().flush();
                }
                Some(ScanEvent::Peer { addr, transport }) => {
                    eprint!("\r");
                    println!("peer {addr} ({})", transport.tag());
                    peers.push(addr);
                }
                Some(ScanEvent::Done) | None => break,
            },
            result = tokio::signal::ctrl_c(), if !cancelled => {
                if let Err(e) = result {
                    warn!("failed to listen for Ctrl+C: {e}");
                }
                scan.close();
                cancelled = true;
            }
        }
    }

    eprintln!();
    let outcome = if cancelled { "cancelled" } else { "finished" };
    println!("scan {outcome}: {} peer(s) found", peers.len());
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("desp").chain(args.iter().copied()))
    }

    #[test]
    fn test_chat_flags_override_config() {
        // Arrange
        let cli = parse(&["chat", "--group", "239.1.1.1:5000", "--source", "10.0.0.7"]);
        let mut cfg = AppConfig::default();

        // Act
        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        args.apply(&mut cfg);

        // Assert
        assert_eq!(cfg.session.group, "239.1.1.1:5000");
        assert_eq!(cfg.session.source_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(cfg.session.bind_address, None);
    }

    #[test]
    fn test_empty_source_flag_means_automatic() {
        let cli = parse(&["chat", "--source", ""]);
        let mut cfg = AppConfig::default();

        let Command::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        args.apply(&mut cfg);
        let session = cfg.session_config().expect("valid");

        assert_eq!(session.source, None);
    }

    #[test]
    fn test_init_writes_defaults_and_keeps_existing_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("desp-init-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = std::fs::remove_dir_all(&dir);

        // Act
        let written = run_init(Some(&path), false).expect("first init");
        let again = run_init(Some(&path), false);
        let forced = run_init(Some(&path), true);

        // Assert
        assert_eq!(written, path);
        assert_eq!(config::load_config_from(&path).unwrap(), AppConfig::default());
        assert!(again.is_err(), "existing file must not be overwritten");
        assert!(forced.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_scan_flags_override_config() {
        let cli = parse(&["scan", "--base", "192.168.1.9", "--timeout-ms", "40", "--tcp"]);
        let mut cfg = AppConfig::default();

        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        args.apply(&mut cfg);
        let scan = cfg.scan_config(args.base.unwrap());

        assert_eq!(scan.base, Ipv4Addr::new(192, 168, 1, 9));
        assert_eq!(scan.port, 11332);
        assert_eq!(scan.probe_timeout.as_millis(), 40);
        assert_eq!(scan.transport, Transport::Tcp);
    }

    #[test]
    fn test_scan_without_flags_keeps_config() {
        let cli = parse(&["scan"]);
        let mut cfg = AppConfig::default();
        cfg.scan.port = 4000;

        let Command::Scan(args) = cli.command else {
            panic!("expected scan");
        };
        args.apply(&mut cfg);

        assert_eq!(cfg.scan.port, 4000);
        assert_eq!(cfg.scan.transport, Transport::Udp);
    }

    #[test]
    fn test_global_flags_accepted_after_subcommand() {
        let cli = parse(&["scan", "--log-level", "debug", "--config", "/tmp/desp.toml"]);

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/desp.toml")));
    }

    #[test]
    fn test_render_marks_own_echo() {
        let own: SocketAddr = "192.168.1.20:50000".parse().unwrap();
        let mine = InboundMessage {
            source: own,
            payload: b"hello".to_vec(),
        };
        let theirs = InboundMessage {
            source: "192.168.1.30:40000".parse().unwrap(),
            payload: b"hi".to_vec(),
        };

        assert_eq!(render_message(&mine, own), "[me] hello");
        assert_eq!(render_message(&theirs, own), "[192.168.1.30:40000] hi");
    }
}
