use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::AudioError;

/// Process-wide source of engine-assigned player ids. Never rewinds.
static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one player, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(u64);

impl PlayerId {
    /// Allocate a fresh id from the process-wide counter
    pub fn next() -> Self {
        Self(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a caller-assigned id
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Mark a caller-assigned id as taken: later `next` calls allocate above it.
    ///
    /// Ids handed out before the claim are not checked. Callers mixing their own ids
    /// with engine-assigned ones are responsible for those.
    pub fn claim(&self) {
        NEXT_PLAYER_ID.fetch_max(self.0.saturating_add(1), Ordering::Relaxed);
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            PlaybackState::Stopped => "Stopped",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
        };
        write!(f, "{}", state_str)
    }
}

/// Linear PCM sample encoding accepted by `feed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Int8,
    Int16,
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::Int8 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Float32 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::Int8 => "int8",
            SampleFormat::Int16 => "int16",
            SampleFormat::Float32 => "float32",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SampleFormat {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "i8" | "int8" | "pcm8" => Ok(SampleFormat::Int8),
            "i16" | "int16" | "pcm16" => Ok(SampleFormat::Int16),
            "f32" | "float" | "float32" => Ok(SampleFormat::Float32),
            other => Err(AudioError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Device-side stream parameters, fixed when a player is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn new(sample_format: SampleFormat, channels: u16, sample_rate: u32) -> Self {
        Self {
            sample_format,
            channels,
            sample_rate,
        }
    }

    /// Reject channel counts other than mono/stereo and a zero rate
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.channels != 1 && self.channels != 2 {
            return Err(AudioError::UnsupportedChannelCount {
                channels: self.channels,
            });
        }
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate {
                rate: self.sample_rate,
            });
        }
        Ok(())
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Round `bytes` down to a whole number of PCM frames, never below one frame
    pub fn align_to_frame(&self, bytes: usize) -> usize {
        let frame = self.bytes_per_frame();
        (bytes / frame).max(1) * frame
    }

    pub fn format_string(&self) -> String {
        let channels = match self.channels {
            1 => "mono".to_string(),
            2 => "stereo".to_string(),
            n => format!("{}ch", n),
        };
        format!(
            "{} {:.1}kHz {}",
            self.sample_format,
            self.sample_rate as f32 / 1000.0,
            channels
        )
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::new(SampleFormat::Int16, 2, 44_100)
    }
}

/// Requested device buffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferSize {
    /// Ask the device factory for its minimum and use that
    #[default]
    DeviceMinimum,
    Bytes(usize),
}

impl BufferSize {
    /// Substitute the device minimum where the sentinel was requested
    pub fn resolve(&self, device_minimum: usize) -> Result<usize, AudioError> {
        match *self {
            BufferSize::DeviceMinimum => Ok(device_minimum),
            BufferSize::Bytes(0) => Err(AudioError::InvalidBufferSize { size: 0 }),
            BufferSize::Bytes(n) => Ok(n),
        }
    }
}

impl From<Option<usize>> for BufferSize {
    fn from(value: Option<usize>) -> Self {
        match value {
            Some(n) => BufferSize::Bytes(n),
            None => BufferSize::DeviceMinimum,
        }
    }
}

impl FromStr for BufferSize {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("min") || s.eq_ignore_ascii_case("minimum") {
            return Ok(BufferSize::DeviceMinimum);
        }
        match s.parse::<usize>() {
            Ok(0) => Err(AudioError::InvalidBufferSize { size: 0 }),
            Ok(n) => Ok(BufferSize::Bytes(n)),
            Err(_) => Err(AudioError::InitializationFailed(format!(
                "buffer size must be a positive integer or 'min', got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for BufferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferSize::DeviceMinimum => write!(f, "device minimum"),
            BufferSize::Bytes(n) => write!(f, "{} bytes", n),
        }
    }
}

/// Everything needed to initialize one player
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    /// Caller-assigned id. `None` allocates one. A caller id is claimed at
    /// initialization so engine-assigned ids never reuse it afterwards.
    pub id: Option<PlayerId>,
    pub format: StreamFormat,
    pub buffer_size: BufferSize,
    /// Degraded writes tolerated on one frame before it is dropped
    pub write_retry_limit: u32,
}

impl PlayerOptions {
    pub fn new(format: StreamFormat) -> Self {
        Self {
            id: None,
            format,
            buffer_size: BufferSize::DeviceMinimum,
            write_retry_limit: 3,
        }
    }

    pub fn with_id(mut self, id: PlayerId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_write_retry_limit(mut self, limit: u32) -> Self {
        self.write_retry_limit = limit;
        self
    }
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self::new(StreamFormat::default())
    }
}

/// One caller-submitted chunk of raw PCM bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Box<[u8]>,
}

impl Frame {
    pub fn new(data: impl Into<Box<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for Frame {
    fn from(data: &[u8]) -> Self {
        Self::new(data)
    }
}

/// Asynchronous notifications pushed to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Every frame fed so far has been accepted by the device
    FeedCompleted { player_id: PlayerId },
    /// A frame was abandoned after repeated degraded writes
    FrameDropped { player_id: PlayerId, bytes: usize },
}

impl PlayerEvent {
    pub fn player_id(&self) -> PlayerId {
        match self {
            PlayerEvent::FeedCompleted { player_id } => *player_id,
            PlayerEvent::FrameDropped { player_id, .. } => *player_id,
        }
    }
}
