use raw_sound_player::audio::{CpalDeviceFactory, RawSoundPlayer};
use raw_sound_player::cli::{self, CliApp, Commands, ConfigAction, PlaybackPlan, MAX_QUEUED_CHUNKS};
use raw_sound_player::config::ConfigManager;
use raw_sound_player::logging::PlayerLogger;
use raw_sound_player::models::PlayerEvent;
use raw_sound_player::{AudioError, ConfigError, PlayerError};

use log::{debug, info, log, warn};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tone amplitude, leaving headroom below full scale
const TONE_AMPLITUDE: f32 = 0.5;

/// Main application controller: owns the configuration and runs one command
pub struct AppController {
    config_manager: ConfigManager,
    logger: PlayerLogger,
}

impl AppController {
    pub fn new() -> Result<Self, PlayerError> {
        let config_manager = ConfigManager::new()?;
        info!("Configuration loaded from {}", config_manager.config_path().display());

        Ok(Self {
            config_manager,
            logger: PlayerLogger::new(),
        })
    }

    pub async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Play { input, stream } => {
                let plan = stream.resolve(self.config_manager.get_config())?;
                let reader = cli::open_input(&input)?;
                println!("Playing: {} ({})", input.display(), plan.options.format.format_string());
                self.stream_to_player(reader, plan).await
            }
            Commands::Tone { frequency, seconds, stream } => {
                let plan = stream.resolve(self.config_manager.get_config())?;
                let pcm = cli::sine_tone(plan.options.format, frequency, seconds, TONE_AMPLITUDE);
                println!(
                    "Playing {:.0} Hz tone for {} ({})",
                    frequency,
                    cli::format_duration(cli::playback_duration(plan.options.format, pcm.len())),
                    plan.options.format.format_string()
                );
                self.stream_to_player(Box::new(std::io::Cursor::new(pcm)), plan).await
            }
            Commands::Devices => {
                let devices = CpalDeviceFactory::list_devices()?;
                if devices.is_empty() {
                    println!("No output devices found");
                }
                for device in &devices {
                    println!("{}", cli::describe_device(device));
                }
                Ok(())
            }
            Commands::Config { action } => self.execute_config(action),
        }
    }

    fn execute_config(&mut self, action: ConfigAction) -> Result<(), PlayerError> {
        match action {
            ConfigAction::Show => {
                println!("# {}", self.config_manager.config_path().display());
                let rendered = toml::to_string_pretty(self.config_manager.get_config())
                    .map_err(ConfigError::SerializationError)?;
                print!("{}", rendered);
            }
            ConfigAction::Reset => {
                self.config_manager.reset_to_defaults()?;
                println!("OK: Configuration reset");
            }
            ConfigAction::Volume { level } => {
                self.config_manager.set_volume(cli::volume_from_percent(level))?;
                println!("OK: Default volume {}%", level);
            }
            ConfigAction::Buffer { size } => {
                self.config_manager.set_buffer_size(size)?;
                println!("OK: Buffer size {}", size);
            }
        }
        Ok(())
    }

    /// Feed `reader` through a fresh player until it has all been accepted by the
    /// device, or until Ctrl-C.
    async fn stream_to_player(&self, reader: Box<dyn Read + Send>, plan: PlaybackPlan) -> Result<(), PlayerError> {
        let factory = CpalDeviceFactory::new(plan.device.clone());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let format = plan.options.format;

        let player = Arc::new(RawSoundPlayer::initialize_with_logger(
            &factory,
            plan.options,
            Some(event_tx),
            self.logger.clone(),
        )?);
        info!("Player {} ready with a {} byte buffer", player.id(), player.buffer_size());

        player.set_volume(plan.volume)?;
        player.play()?;

        let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
        if let Err(e) = ctrlc::set_handler(move || {
            let _ = interrupt_tx.send(());
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let mut feeder = {
            let player = Arc::clone(&player);
            let cancelled = Arc::clone(&cancelled);
            let chunk_bytes = plan.chunk_bytes;
            tokio::task::spawn_blocking(move || {
                cli::feed_from_reader(&player, reader, chunk_bytes, MAX_QUEUED_CHUNKS, &cancelled)
            })
        };

        let mut feeding_done = false;
        let mut interrupted = false;

        loop {
            if feeding_done && player.outstanding_frames() == 0 {
                break;
            }

            tokio::select! {
                result = &mut feeder, if !feeding_done => {
                    feeding_done = true;
                    let fed = result.map_err(|e| AudioError::StreamError(format!("feeder task failed: {}", e)))??;
                    debug!("Input exhausted after {} chunk(s)", fed);
                }
                Some(event) = event_rx.recv() => match event {
                    PlayerEvent::FeedCompleted { .. } => debug!("Player {} drained its backlog", player.id()),
                    PlayerEvent::FrameDropped { bytes, .. } => warn!("Dropped {} bytes after repeated write failures", bytes),
                },
                Some(()) = interrupt_rx.recv() => {
                    println!("\nReceived interrupt signal. Stopping...");
                    interrupted = true;
                    cancelled.store(true, Ordering::Relaxed);
                    player.stop()?;
                    break;
                }
                else => break,
            }
        }

        if !interrupted {
            // Let the device play out what it has already accepted
            tokio::time::sleep(cli::playback_duration(format, player.buffer_size()) + Duration::from_millis(50)).await;
        }

        let stats = player.stats();
        player.release()?;
        if !feeding_done {
            let _ = feeder.await;
        }

        println!(
            "Played {} chunk(s), {} bytes ({} dropped)",
            stats.frames_written, stats.bytes_written, stats.frames_dropped
        );
        Ok(())
    }
}

fn report_error(error: &PlayerError) {
    let severity = error.severity();
    log!(severity.log_level(), "{}", error);
    eprintln!("Error: {}", error.user_message());
}

#[tokio::main]
async fn main() {
    if let Err(e) = PlayerLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let args = CliApp::parse();

    let mut app = match AppController::new() {
        Ok(app) => app,
        Err(e) => {
            report_error(&e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.execute_command(args.command).await {
        report_error(&e);
        std::process::exit(1);
    }
}
