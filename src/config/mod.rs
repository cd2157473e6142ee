use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::models::{BufferSize, PlayerOptions, SampleFormat, StreamFormat};

/// Player configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Device buffer in bytes. Absent means the device minimum.
    pub buffer_size: Option<usize>,
    pub default_volume: f32,
    pub preferred_device: Option<String>,
    /// Bytes per `feed` call when streaming from the CLI
    pub chunk_bytes: usize,
    pub write_retry_limit: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_format: SampleFormat::Int16,
            channels: 2,
            sample_rate: 44_100,
            buffer_size: None,
            default_volume: 0.8,
            preferred_device: None,
            chunk_bytes: 4096,
            write_retry_limit: 3,
        }
    }
}

impl PlayerConfig {
    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat::new(self.sample_format, self.channels, self.sample_rate)
    }

    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions::new(self.stream_format())
            .with_buffer_size(BufferSize::from(self.buffer_size))
            .with_write_retry_limit(self.write_retry_limit)
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Load from an explicit file. A missing file yields the defaults.
    pub fn with_path(config_path: PathBuf) -> Result<Self, ConfigError> {
        let config = Self::load_config(&config_path)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = volume.clamp(0.0, 1.0);
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn set_buffer_size(&mut self, buffer_size: BufferSize) -> Result<(), ConfigError> {
        self.config.buffer_size = match buffer_size {
            BufferSize::DeviceMinimum => None,
            BufferSize::Bytes(n) => Some(n),
        };
        self.save_config()
    }

    pub fn set_stream_format(&mut self, format: StreamFormat) -> Result<(), ConfigError> {
        self.config.sample_format = format.sample_format;
        self.config.channels = format.channels;
        self.config.sample_rate = format.sample_rate;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("raw-sound-player");

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path)
            .map_err(ConfigError::IoError)?;

        let config: PlayerConfig = toml::from_str(&config_content)
            .map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config)
            .map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content)
            .map_err(ConfigError::IoError)?;

        Ok(())
    }
}
