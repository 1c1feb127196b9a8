//! Soundbite - console clip player
//!
//! Loads a clip catalog, opens the audio output, and reads line commands
//! from stdin. Playback notifications are printed as they arrive.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use soundbite_common::config::TomlConfig;
use soundbite_common::PlaybackEvent;
use soundbite_player::audio::{open_output, AudioDevice, CpalDevice, SymphoniaDecoder};
use soundbite_player::config::{ConfigOverrides, PlayerConfig};
use soundbite_player::playback::{BufferStore, PlaybackController, SequencePlayer, SharedFilter};
use soundbite_player::{ClipCatalog, FileFilter};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for soundbite
#[derive(Parser, Debug)]
#[command(name = "soundbite")]
#[command(about = "Play short named clips from longer recordings")]
#[command(version)]
struct Args {
    /// Bootstrap TOML configuration file
    #[arg(short, long, env = "SOUNDBITE_CONFIG")]
    config: Option<PathBuf>,

    /// Clip catalog document (path or http(s) URL)
    #[arg(long, env = "SOUNDBITE_CATALOG")]
    catalog: Option<String>,

    /// Folder containing the clip source files
    #[arg(long, env = "SOUNDBITE_AUDIO_ROOT")]
    audio_root: Option<PathBuf>,

    /// Base URL the clip source files are fetched from
    #[arg(long, env = "SOUNDBITE_BASE_URL")]
    base_url: Option<String>,

    /// Initial file filter ("all" or a file name)
    #[arg(short, long)]
    filter: Option<String>,

    /// Pause between clips in sequence mode, in milliseconds
    #[arg(long)]
    pause_ms: Option<u64>,

    /// Skip decoding every catalog file at startup
    #[arg(long)]
    no_preload: bool,

    /// Output device name (default device when omitted)
    #[arg(long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            catalog: self.catalog.clone(),
            audio_root: self.audio_root.clone(),
            base_url: self.base_url.clone(),
            filter: self.filter.clone(),
            sequence_pause_ms: self.pause_ms,
            no_preload: self.no_preload,
        }
    }
}

/// One console command
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Play(String),
    Stop,
    Random,
    Filter(FileFilter),
    Clips,
    Files,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        match (word.to_ascii_lowercase().as_str(), rest) {
            ("play", "") => Err("usage: play <clip>".to_string()),
            ("play", clip) => Ok(Command::Play(clip.to_string())),
            ("stop", _) => Ok(Command::Stop),
            ("random", _) => Ok(Command::Random),
            ("filter", value) => Ok(Command::Filter(FileFilter::parse(value))),
            ("clips", _) => Ok(Command::Clips),
            ("files", _) => Ok(Command::Files),
            ("status", _) => Ok(Command::Status),
            ("help", _) | ("?", _) => Ok(Command::Help),
            ("quit", _) | ("exit", _) => Ok(Command::Quit),
            (other, _) => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_devices {
        for name in CpalDevice::list_devices().context("Failed to list audio devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml.logging.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PlayerConfig::resolve(args.overrides(), &toml)
        .context("Invalid configuration")?;

    info!("Starting soundbite");
    info!("Catalog: {}", config.catalog);
    info!("Audio source: {}", config.source);

    let catalog = Arc::new(ClipCatalog::load_or_empty(&config.catalog).await);

    let device = open_output(args.device.clone()).await;
    let decoder = Arc::new(SymphoniaDecoder::new(device.sample_rate()));
    let buffers = Arc::new(BufferStore::new(config.source.fetcher(), decoder));

    let controller = PlaybackController::new(
        Arc::clone(&catalog),
        Arc::clone(&buffers),
        device,
        SharedFilter::new(config.initial_filter.clone()),
    );
    let sequence = SequencePlayer::new(controller.clone(), config.sequence_pause);

    tokio::spawn(print_events(controller.subscribe()));

    if config.preload {
        let files = catalog.all_files();
        let buffers = Arc::clone(&buffers);
        tokio::spawn(async move {
            buffers.preload_all(files).await;
        });
    }

    println!(
        "{} clips loaded, filter: {}. Type 'help' for commands.",
        catalog.len(),
        controller.filter()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => run_command(command, &sequence),
                    Err(message) => println!("{}", message),
                }
            }
        }
    }

    sequence.stop();
    info!("Shutdown complete");
    Ok(())
}

fn run_command(command: Command, sequence: &SequencePlayer) {
    let controller = sequence.controller();

    match command {
        Command::Play(clip) => {
            let controller = controller.clone();
            tokio::spawn(async move {
                let outcome = controller.play(&clip).await;
                debug!("play '{}': {:?}", clip, outcome);
            });
        }
        Command::Stop => sequence.stop(),
        Command::Random => {
            if sequence.is_running() {
                println!("sequence already running");
            } else {
                let handle = sequence.spawn(controller.shared_filter());
                tokio::spawn(async move {
                    match handle.await {
                        Ok(exit) => debug!("sequence exit: {:?}", exit),
                        Err(e) => warn!("Sequence task failed: {}", e),
                    }
                });
            }
        }
        Command::Filter(filter) => {
            controller.set_filter(filter);
            println!("filter: {}", controller.filter());
        }
        Command::Clips => {
            let names = controller.catalog().names(&controller.filter());
            println!("{} clips: {}", names.len(), names.join(", "));
        }
        Command::Files => {
            for file in controller.catalog().all_files() {
                let marker = if controller.buffers().cached(&file).is_some() {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, file);
            }
        }
        Command::Status => {
            println!(
                "playing: {}, filter: {}, sequence: {}, cached files: {}",
                controller.current_clip().as_deref().unwrap_or("-"),
                controller.filter(),
                if controller.is_sequence_running() { "running" } else { "stopped" },
                controller.buffers().cached_count()
            );
        }
        Command::Help => {
            println!("play <clip> | stop | random | filter <file|all> | clips | files | status | quit");
        }
        Command::Quit => {}
    }
}

/// Print notifications until the controller goes away
async fn print_events(mut events: broadcast::Receiver<PlaybackEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match event {
                PlaybackEvent::Started { clip } => println!("> {}", clip),
                PlaybackEvent::Ended { clip } => println!("  {} (ended)", clip),
                PlaybackEvent::Interrupted { clip } => println!("  {} (interrupted)", clip),
                PlaybackEvent::Stopped => println!("  (stopped)"),
                PlaybackEvent::DeviceUnavailable { reason } => {
                    println!("! audio unavailable: {}", reason)
                }
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Missed {} playback notifications", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
