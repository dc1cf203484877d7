//! Tally sync CLI
//!
//! Runs a workday timer whose elapsed seconds are shared with every other
//! installation that holds the same key.
//!
//! ## Usage
//!
//! ```bash
//! # Start with the settings in ./tally.json (created if missing)
//! tally-sync
//!
//! # Use another relay for this run
//! tally-sync --relay wss://relay.example.com
//! ```
//!
//! Then type commands on stdin:
//!
//! ```text
//! set 1500     set the elapsed seconds
//! start        start the timer
//! pause        pause the timer
//! rotate       switch to a fresh sync key
//! wake         force a reconnect
//! quit
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tally::sync::DEFAULT_MAX_COUNTER;
use tally::{ConnectionHealth, Engine, EngineHandle, Settings, SyncObserver, WsConnector};

/// Private cross-device work timer sync over a public relay
#[derive(Parser)]
#[command(name = "tally-sync")]
#[command(version)]
#[command(about = "Private cross-device work timer sync over a public relay")]
struct Cli {
    /// Settings file (created with fresh keys if missing)
    #[arg(short, long, default_value = "tally.json")]
    config: PathBuf,

    /// Relay to use for this run instead of the configured one
    #[arg(short, long)]
    relay: Option<String>,
}

/// Commands read from stdin, one per line.
#[derive(Parser)]
#[command(no_binary_name = true)]
struct Line {
    #[command(subcommand)]
    command: LineCommand,
}

#[derive(Subcommand)]
enum LineCommand {
    /// Set the elapsed seconds
    Set { seconds: u64 },
    /// Start the timer
    Start,
    /// Pause the timer
    Pause,
    /// Switch to a fresh sync key
    Rotate,
    /// Force a reconnect
    Wake,
    /// Exit
    Quit,
}

/// Shared between the observer (engine task) and the stdin loop.
#[derive(Default)]
struct Timer {
    seconds: AtomicU64,
    running: AtomicBool,
    /// Held while another installation's update settles.
    locked: AtomicBool,
}

impl Timer {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

struct CliObserver {
    timer: Arc<Timer>,
    settings: Mutex<Settings>,
    path: PathBuf,
}

impl SyncObserver for CliObserver {
    fn on_state_applied(&self, value: u64) {
        self.timer.seconds.store(value, Ordering::SeqCst);
        println!("synced: {}", format_seconds(value));
    }

    fn on_connection_health_changed(&self, health: ConnectionHealth) {
        match health {
            ConnectionHealth::Success => println!("relay: connected"),
            ConnectionHealth::Error => println!("relay: unreachable"),
        }
    }

    fn on_ui_should_lock(&self, duration: Duration) {
        self.timer.locked.store(true, Ordering::SeqCst);
        println!("editing locked for {}s", duration.as_secs());
    }

    fn on_ui_unlocked(&self) {
        self.timer.locked.store(false, Ordering::SeqCst);
        println!("editing unlocked");
    }

    fn on_identity_changed(&self, secret_hex: &str) {
        let Ok(mut settings) = self.settings.lock() else {
            warn!("settings lock poisoned, new key not saved");
            return;
        };
        settings.private_key = secret_hex.to_string();
        match settings.save(&self.path) {
            Ok(()) => println!("new sync key saved to {}", self.path.display()),
            Err(e) => warn!(error = %e, "could not save the new sync key"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load_or_init(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    let mut config = settings.sync_config();
    if let Some(relay) = &cli.relay {
        config.relay_url = tally::sync::relay_url_or_default(relay);
    }

    let timer = Arc::new(Timer::default());
    let observer = Arc::new(CliObserver {
        timer: Arc::clone(&timer),
        settings: Mutex::new(settings.clone()),
        path: cli.config.clone(),
    });

    println!("relay: {}", config.relay_url);
    let (handle, task) = Engine::spawn(
        settings.identity()?,
        settings.client_id()?,
        config,
        Arc::new(WsConnector),
        observer,
    )
    .context("starting sync engine")?;

    run(&handle, &timer).await?;

    handle.shutdown()?;
    task.await.context("sync engine task failed")?;
    Ok(())
}

async fn run(handle: &EngineHandle, timer: &Timer) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    return Ok(());
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Line::try_parse_from(line.split_whitespace()) {
                    Ok(Line { command: LineCommand::Quit }) => return Ok(()),
                    Ok(Line { command }) => apply(handle, timer, command)?,
                    Err(e) => println!("{e}"),
                }
            }
            _ = tick.tick() => {
                if !timer.running.load(Ordering::SeqCst) {
                    continue;
                }
                let seconds = timer.seconds.load(Ordering::SeqCst).saturating_add(1).min(DEFAULT_MAX_COUNTER);
                timer.seconds.store(seconds, Ordering::SeqCst);
                let running = seconds < DEFAULT_MAX_COUNTER;
                if !running {
                    timer.running.store(false, Ordering::SeqCst);
                    println!("workday is over");
                }
                handle.counter_changed(seconds, running)?;
            }
        }
    }
}

fn apply(handle: &EngineHandle, timer: &Timer, command: LineCommand) -> Result<()> {
    match command {
        LineCommand::Set { .. } | LineCommand::Start | LineCommand::Pause if timer.is_locked() => {
            println!("editing is locked until the synced update settles");
            return Ok(());
        }
        LineCommand::Set { seconds } if seconds >= DEFAULT_MAX_COUNTER => {
            println!("seconds must be below {DEFAULT_MAX_COUNTER}");
            return Ok(());
        }
        LineCommand::Set { seconds } => {
            timer.running.store(false, Ordering::SeqCst);
            timer.seconds.store(seconds, Ordering::SeqCst);
            println!("set: {}", format_seconds(seconds));
        }
        LineCommand::Start => {
            timer.running.store(true, Ordering::SeqCst);
            println!("running");
        }
        LineCommand::Pause => {
            timer.running.store(false, Ordering::SeqCst);
            println!("paused at {}", format_seconds(timer.seconds.load(Ordering::SeqCst)));
        }
        LineCommand::Rotate => return Ok(handle.rotate_identity()?),
        LineCommand::Wake => return Ok(handle.wake()?),
        LineCommand::Quit => return Ok(()),
    }
    handle.counter_changed(
        timer.seconds.load(Ordering::SeqCst),
        timer.running.load(Ordering::SeqCst),
    )?;
    Ok(())
}

fn format_seconds(seconds: u64) -> String {
    format!("{:02}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}
