use crate::audio::{DeviceInfo, RawSoundPlayer};
use crate::config::PlayerConfig;
use crate::error::PlayerError;
use crate::models::{BufferSize, PlayerOptions, SampleFormat, StreamFormat};
use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Frames allowed to wait in a player's queue before the reader backs off
pub const MAX_QUEUED_CHUNKS: usize = 32;

/// Raw PCM player CLI
#[derive(Parser)]
#[command(name = "rawplay")]
#[command(about = "Stream raw PCM audio to an output device")]
#[command(version = "0.1.0")]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a raw PCM file, or standard input when the path is "-"
    Play {
        input: PathBuf,
        #[command(flatten)]
        stream: StreamArgs,
    },
    /// Play a generated sine tone
    Tone {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
        /// Tone length in seconds
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
        #[command(flatten)]
        stream: StreamArgs,
    },
    /// List available audio output devices
    Devices,
    /// Show or change the saved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Stream settings. Anything left out comes from the saved configuration.
#[derive(Debug, Clone, Default, Args)]
pub struct StreamArgs {
    /// Sample format: int8, int16 or float32
    #[arg(long)]
    pub format: Option<SampleFormat>,
    /// Channel count (1 or 2)
    #[arg(long)]
    pub channels: Option<u16>,
    /// Sample rate in Hz
    #[arg(long)]
    pub rate: Option<u32>,
    /// Device buffer in bytes, or "min" for the device minimum
    #[arg(long)]
    pub buffer_size: Option<BufferSize>,
    /// Bytes handed to the player per feed
    #[arg(long)]
    pub chunk_bytes: Option<usize>,
    /// Volume (0-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub volume: Option<u8>,
    /// Output device name
    #[arg(long)]
    pub device: Option<String>,
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Restore the defaults
    Reset,
    /// Set the default volume (0-100)
    Volume {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },
    /// Set the device buffer in bytes, or "min" for the device minimum
    Buffer { size: BufferSize },
}

/// Everything needed to run one player from the command line
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPlan {
    pub options: PlayerOptions,
    pub device: Option<String>,
    pub volume: f32,
    pub chunk_bytes: usize,
}

impl StreamArgs {
    /// Overlay these arguments on the saved configuration
    pub fn resolve(&self, config: &PlayerConfig) -> Result<PlaybackPlan, PlayerError> {
        let format = StreamFormat::new(
            self.format.unwrap_or(config.sample_format),
            self.channels.unwrap_or(config.channels),
            self.rate.unwrap_or(config.sample_rate),
        );
        format.validate().map_err(PlayerError::Construction)?;

        let buffer_size = self
            .buffer_size
            .unwrap_or_else(|| BufferSize::from(config.buffer_size));

        let chunk_bytes = self.chunk_bytes.unwrap_or(config.chunk_bytes);
        if chunk_bytes == 0 {
            return Err(PlayerError::InvalidFrame("chunk size must be positive".to_string()));
        }

        Ok(PlaybackPlan {
            options: PlayerOptions::new(format)
                .with_buffer_size(buffer_size)
                .with_write_retry_limit(config.write_retry_limit),
            device: self.device.clone().or_else(|| config.preferred_device.clone()),
            volume: self
                .volume
                .map(volume_from_percent)
                .unwrap_or(config.default_volume),
            // Chunks never split a PCM frame
            chunk_bytes: format.align_to_frame(chunk_bytes),
        })
    }
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }
}

pub fn volume_from_percent(level: u8) -> f32 {
    level.min(100) as f32 / 100.0
}

/// Open the input for `play`: a file, or stdin for "-"
pub fn open_input(path: &Path) -> Result<Box<dyn Read + Send>, PlayerError> {
    if path == Path::new("-") {
        Ok(Box::new(std::io::stdin()))
    } else {
        Ok(Box::new(std::fs::File::open(path)?))
    }
}

/// Read `reader` in `chunk_bytes` pieces and feed them to `player`.
///
/// Backs off while more than `max_queued` chunks are waiting, and stops early once
/// `cancelled` is set. Returns the number of chunks fed.
pub fn feed_from_reader<R: Read>(
    player: &RawSoundPlayer,
    mut reader: R,
    chunk_bytes: usize,
    max_queued: usize,
    cancelled: &AtomicBool,
) -> Result<u64, PlayerError> {
    let mut fed = 0u64;
    let mut chunk = vec![0u8; chunk_bytes];

    loop {
        while player.queued_frames() >= max_queued {
            if cancelled.load(Ordering::Relaxed) {
                return Ok(fed);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        if cancelled.load(Ordering::Relaxed) {
            return Ok(fed);
        }

        let n = read_full(&mut reader, &mut chunk)?;
        if n == 0 {
            return Ok(fed);
        }
        player.feed(&chunk[..n])?;
        fed += 1;
    }
}

/// Fill `buf` as far as the reader allows. Short only at end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Render a sine tone as little-endian PCM in `format`
pub fn sine_tone(format: StreamFormat, frequency: f32, seconds: f32, amplitude: f32) -> Vec<u8> {
    let frames = (seconds.max(0.0) * format.sample_rate as f32) as usize;
    let mut out = Vec::with_capacity(frames * format.bytes_per_frame());
    let step = 2.0 * std::f32::consts::PI * frequency / format.sample_rate as f32;

    for i in 0..frames {
        let value = (i as f32 * step).sin() * amplitude.clamp(0.0, 1.0);
        for _ in 0..format.channels {
            match format.sample_format {
                SampleFormat::Int8 => out.push((value * i8::MAX as f32) as i8 as u8),
                SampleFormat::Int16 => out.extend_from_slice(&((value * i16::MAX as f32) as i16).to_le_bytes()),
                SampleFormat::Float32 => out.extend_from_slice(&value.to_le_bytes()),
            }
        }
    }
    out
}

/// Time taken to play `bytes` of audio in `format`
pub fn playback_duration(format: StreamFormat, bytes: usize) -> Duration {
    let frames = bytes / format.bytes_per_frame();
    Duration::from_secs_f64(frames as f64 / format.sample_rate as f64)
}

/// Format duration for display
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}

/// One line per device for `devices`
pub fn describe_device(info: &DeviceInfo) -> String {
    let marker = if info.is_default { "*" } else { " " };
    let rates = if info.max_sample_rate > 0 {
        format!("{}-{} Hz", info.min_sample_rate, info.max_sample_rate)
    } else {
        "rates unknown".to_string()
    };
    format!(
        "{} {} (up to {} ch, {}, {})",
        marker,
        info.name,
        info.max_channels,
        rates,
        info.sample_formats.join("/")
    )
}

#[cfg(test)]
mod tests;
