use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use tethys_control::depth::{run_depth_loop, DepthHold};
use tethys_control::router::{run_event_loop, InputRouter, Key};
use tethys_control::{failsafe, DepthHoldConfig, InputConfig};
use tethys_link::dispatch::Dispatcher;
use tethys_link::link::LinkManager;
use tethys_link::telemetry_rx::TelemetryReceiver;
use tethys_link::LinkConfig;
use tethys_proto::{ControlChannels, ModeTable, StatusEvent, TelemetrySample};

#[derive(Debug, Parser)]
#[command(name = "tethys", version, about = "tethys - ROV ground control")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration without opening the link.
    Doctor,
    /// Connect and run the control session.
    Run,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    link: LinkConfig,
    depth_hold: DepthHoldConfig,
    input: InputConfig,

    /// Optional mode-name overrides; when present they take precedence
    /// over the built-in table.
    modes: Option<HashMap<String, u32>>,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg),
        Command::Run => run(&cfg).await,
    }
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    anyhow::ensure!(!cfg.link.endpoint.is_empty(), "link.endpoint missing");
    let known_scheme = ["udpin:", "udpout:", "tcpin:", "tcpout:", "serial:"]
        .iter()
        .any(|s| cfg.link.endpoint.starts_with(s));
    anyhow::ensure!(known_scheme, "link.endpoint scheme not recognized: {}", cfg.link.endpoint);

    anyhow::ensure!(!cfg.depth_hold.tick().is_zero(), "depth_hold.tick_ms must be > 0");
    anyhow::ensure!(cfg.input.channel_step() > 0, "input.channel_step must be > 0");

    if let Some(path) = &cfg.link.heartbeat_log {
        let parent = std::path::Path::new(path).parent().unwrap_or(std::path::Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.exists() {
            warn!("doctor: heartbeat log directory {} missing (logging will be disabled)", parent.display());
        }
    }

    if let Some(modes) = &cfg.modes {
        anyhow::ensure!(!modes.is_empty(), "modes override table is empty");
    }

    info!("doctor: OK");
    Ok(())
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");

    let running = Arc::new(AtomicBool::new(true));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StatusEvent>();

    // Connect (blocks up to the configured heartbeat timeout).
    let link_cfg = cfg.link.clone();
    let timeout = link_cfg.heartbeat_timeout();
    let link = tokio::task::spawn_blocking(move || LinkManager::connect(&link_cfg, timeout))
        .await?
        .context("link connect")?;
    let identity = link.identity().context("no vehicle identity after connect")?;
    let _ = event_tx.send(StatusEvent::ConnectionChanged(format!(
        "Connected to SYSID:{}",
        identity.system_id
    )));

    let link = Arc::new(Mutex::new(link));

    let modes = match cfg.modes.clone() {
        Some(table) => ModeTable::with_vehicle_table(table),
        None => ModeTable::default(),
    };
    let dispatcher = Arc::new(Mutex::new(Dispatcher::new(link.clone(), modes)));

    let sample = Arc::new(Mutex::new(TelemetrySample::default()));
    let channels = Arc::new(Mutex::new(ControlChannels::neutral()));
    let depth = Arc::new(Mutex::new(DepthHold::new()));

    // Telemetry receive loop on a blocking thread.
    let receiver = TelemetryReceiver::new(
        &cfg.link,
        link.clone(),
        sample.clone(),
        event_tx.clone(),
        running.clone(),
    );
    let telemetry_handle = tokio::task::spawn_blocking(move || receiver.run());

    // Depth-hold tick loop.
    let depth_handle = tokio::spawn(run_depth_loop(
        depth.clone(),
        dispatcher.clone(),
        sample.clone(),
        channels.clone(),
        cfg.depth_hold.tick(),
        running.clone(),
    ));

    // Keyboard input: blocking stdin reader feeding the router.
    let (key_tx, key_rx) = mpsc::unbounded_channel::<Key>();
    let stdin_running = running.clone();
    let stdin_handle = tokio::task::spawn_blocking(move || read_keys(key_tx, stdin_running));

    let router = InputRouter::new(
        &cfg.input,
        cfg.depth_hold.target_depth(),
        dispatcher.clone(),
        channels.clone(),
        depth.clone(),
        running.clone(),
    );
    let input_handle = tokio::spawn(run_event_loop(router, key_rx));

    // Status events are the UI push contract; here they go to the log.
    let status_handle = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match ev {
                StatusEvent::ConnectionChanged(s) => info!("status: {}", s),
                StatusEvent::TelemetryUpdated { roll, pitch, yaw, depth } => {
                    info!(
                        "telemetry: roll={:.2} pitch={:.2} yaw={:.2} depth={:.2}",
                        roll, pitch, yaw, depth
                    );
                }
            }
        }
    });

    // The exit key runs the fail-safe itself; ctrl-c goes through the same
    // sequence here. Either way every loop observes the cleared flag.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("run: interrupt received");
            depth.lock().unwrap().disable();
            failsafe::run(&dispatcher, &channels);
            running.store(false, Ordering::Relaxed);
        }
        _ = input_handle => {}
    }

    running.store(false, Ordering::Relaxed);
    depth_handle.await.ok();
    telemetry_handle.await.ok();
    status_handle.abort();
    stdin_handle.abort();

    info!("run: stopped");
    Ok(())
}

/// Blocking stdin byte reader. Arrow keys arrive as ESC [ A..D sequences;
/// a bare ESC is the exit key. Depending on the terminal's mode, input may
/// be line-buffered.
fn read_keys(tx: mpsc::UnboundedSender<Key>, running: Arc<AtomicBool>) {
    let stdin = std::io::stdin();
    let mut bytes = stdin.lock().bytes();

    while running.load(Ordering::Relaxed) {
        let Some(Ok(b)) = bytes.next() else { break };
        let key = match b {
            0x1b => match (bytes.next(), bytes.next()) {
                (Some(Ok(b'[')), Some(Ok(code))) => match code {
                    b'A' => Key::Up,
                    b'B' => Key::Down,
                    b'C' => Key::Right,
                    b'D' => Key::Left,
                    _ => continue,
                },
                _ => Key::Esc,
            },
            b'\n' | b'\r' => continue,
            c if c.is_ascii() => Key::Char((c as char).to_ascii_lowercase()),
            _ => continue,
        };
        if tx.send(key).is_err() {
            break;
        }
        if key == Key::Esc {
            break;
        }
    }
}
