use serde::Serialize;
use thiserror::Error;

use crate::models::PlayerId;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player could not be created. No player exists afterwards.
    #[error("Player construction failed: {0}")]
    Construction(#[source] AudioError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Player {id} has been released")]
    Released { id: PlayerId },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),

    /// The sink failed to stop or release. Engine bookkeeping was still torn down.
    #[error("Teardown error: {0}")]
    Teardown(#[source] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),
}

impl PlayerError {
    /// Coarse classification reported across the caller boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlayerError::Construction(_) => ErrorKind::Construction,
            PlayerError::Audio(_) => ErrorKind::Device,
            PlayerError::Released { .. } => ErrorKind::InvalidState,
            PlayerError::InvalidFrame(_) | PlayerError::InvalidVolume(_) => ErrorKind::InvalidArgument,
            PlayerError::Teardown(_) => ErrorKind::Teardown,
            PlayerError::Config(_) => ErrorKind::Config,
            PlayerError::File(_) => ErrorKind::Io,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Construction(err) => format!("Could not create player: {}", err.user_message()),
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::Released { id } => format!("Player {} was already released", id),
            PlayerError::InvalidFrame(msg) => format!("Audio chunk rejected: {}", msg),
            PlayerError::InvalidVolume(gain) => format!("Volume {} is not a valid gain", gain),
            PlayerError::Teardown(err) => format!("Audio device did not shut down cleanly: {}", err.user_message()),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
        }
    }

    /// Check if retrying the same operation can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Construction(err) => err.is_recoverable(),
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::Released { .. } => false, // A released player never comes back
            PlayerError::InvalidFrame(_) | PlayerError::InvalidVolume(_) => false,
            PlayerError::Teardown(_) => false,
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Construction(_) => ErrorSeverity::Critical,
            PlayerError::Audio(AudioError::WriteFailed(_)) => ErrorSeverity::Warning,
            PlayerError::Audio(_) => ErrorSeverity::Error,
            PlayerError::Released { .. } => ErrorSeverity::Warning,
            PlayerError::InvalidFrame(_) | PlayerError::InvalidVolume(_) => ErrorSeverity::Info,
            PlayerError::Teardown(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::File(_) => ErrorSeverity::Error,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "Input ended unexpectedly".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Classification of failures surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Construction,
    Device,
    InvalidState,
    InvalidArgument,
    Teardown,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Construction => "construction",
            ErrorKind::Device => "device",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Teardown => "teardown",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

/// Structured failure payload handed back across the caller boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&PlayerError> for Failure {
    fn from(err: &PlayerError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<PlayerError> for Failure {
    fn from(err: PlayerError) -> Self {
        Failure::from(&err)
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Audio device and sink errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannelCount { channels: u16 },

    #[error("Invalid sample rate: {rate}")]
    InvalidSampleRate { rate: u32 },

    #[error("Invalid buffer size: {size}")]
    InvalidBufferSize { size: usize },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Stream closed")]
    StreamClosed,
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::UnsupportedChannelCount { channels } => {
                format!("{} channels requested - only mono (1) and stereo (2) are supported", channels)
            }
            AudioError::InvalidSampleRate { rate } => {
                format!("Sample rate {} Hz is not valid", rate)
            }
            AudioError::InvalidBufferSize { size } => {
                format!("Buffer size {} bytes is not valid", size)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("Sample format '{}' is not supported", format)
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio output: {}", msg)
            }
            AudioError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            AudioError::WriteFailed(msg) => {
                format!("Audio device rejected data: {}", msg)
            }
            AudioError::StreamClosed => "Audio output has been closed".to_string(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // Can fall back to default device
            AudioError::UnsupportedChannelCount { .. } => false,
            AudioError::InvalidSampleRate { .. } => false,
            AudioError::InvalidBufferSize { .. } => false,
            AudioError::UnsupportedFormat { .. } => false,
            AudioError::InitializationFailed(_) => true,
            AudioError::StreamError(_) => true,
            AudioError::WriteFailed(_) => true, // Driver retries on its own
            AudioError::StreamClosed => false,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        // Every config failure can fall back to defaults
        true
    }
}
