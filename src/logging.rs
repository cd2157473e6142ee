use log::{info, warn, error, debug};
use std::time::Duration;
use std::sync::{Arc, Mutex};
use std::collections::VecDeque;
use chrono::{DateTime, Utc};

use crate::models::{PlaybackState, PlayerId};

/// Running counters for one player
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_fed: u64,
    pub bytes_fed: u64,
    pub frames_written: u64,
    pub bytes_written: u64,
    pub degraded_writes: u64,
    pub frames_dropped: u64,
    pub completions: u64,
}

impl PlaybackStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Player event for logging and debugging
#[derive(Debug, Clone)]
pub struct PlayerLogEvent {
    pub timestamp: DateTime<Utc>,
    pub player_id: PlayerId,
    pub event_type: PlayerEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEventType {
    PlayerCreated,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackResumed,
    PlaybackStopped,
    FeedCompleted,
    DegradedWrite,
    FrameDropped,
    VolumeChanged,
    PlayerReleased,
    DeviceError,
}

impl PlayerEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerEventType::PlayerCreated => "PLAYER_CREATED",
            PlayerEventType::PlaybackStarted => "PLAYBACK_STARTED",
            PlayerEventType::PlaybackPaused => "PLAYBACK_PAUSED",
            PlayerEventType::PlaybackResumed => "PLAYBACK_RESUMED",
            PlayerEventType::PlaybackStopped => "PLAYBACK_STOPPED",
            PlayerEventType::FeedCompleted => "FEED_COMPLETED",
            PlayerEventType::DegradedWrite => "DEGRADED_WRITE",
            PlayerEventType::FrameDropped => "FRAME_DROPPED",
            PlayerEventType::VolumeChanged => "VOLUME_CHANGED",
            PlayerEventType::PlayerReleased => "PLAYER_RELEASED",
            PlayerEventType::DeviceError => "DEVICE_ERROR",
        }
    }
}

/// Logger for player operations and debugging
#[derive(Clone)]
pub struct PlayerLogger {
    events: Arc<Mutex<VecDeque<PlayerLogEvent>>>,
    max_events: usize,
    stats: Arc<Mutex<PlaybackStats>>,
}

impl PlayerLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 1000, // Keep last 1000 events
            stats: Arc::new(Mutex::new(PlaybackStats::new())),
        }
    }

    /// Initialize logging system with appropriate log level
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var("RAW_PLAYER_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        match log_level.to_lowercase().as_str() {
            "trace" => builder.filter_level(log::LevelFilter::Trace),
            "debug" => builder.filter_level(log::LevelFilter::Debug),
            "info" => builder.filter_level(log::LevelFilter::Info),
            "warn" => builder.filter_level(log::LevelFilter::Warn),
            "error" => builder.filter_level(log::LevelFilter::Error),
            _ => builder.filter_level(log::LevelFilter::Info),
        };

        builder.try_init()?;

        info!("Raw sound player logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Log a player event
    pub fn log_event(&self, player_id: PlayerId, event_type: PlayerEventType, details: String, duration: Option<Duration>) {
        let event = PlayerLogEvent {
            timestamp: Utc::now(),
            player_id,
            event_type,
            duration,
            details: details.clone(),
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }

        match event_type {
            PlayerEventType::PlayerCreated
            | PlayerEventType::PlaybackStarted
            | PlayerEventType::PlaybackPaused
            | PlayerEventType::PlaybackResumed
            | PlayerEventType::PlaybackStopped
            | PlayerEventType::PlayerReleased => {
                info!("[{}] player {}: {}", event_type.as_str(), player_id, details);
            }
            PlayerEventType::FeedCompleted | PlayerEventType::VolumeChanged => {
                debug!("[{}] player {}: {}", event_type.as_str(), player_id, details);
            }
            PlayerEventType::DegradedWrite | PlayerEventType::FrameDropped => {
                warn!("[{}] player {}: {}", event_type.as_str(), player_id, details);
            }
            PlayerEventType::DeviceError => {
                error!("[{}] player {}: {}", event_type.as_str(), player_id, details);
            }
        }
    }

    pub fn log_player_created(&self, player_id: PlayerId, format_info: &str, buffer_bytes: usize) {
        self.log_event(
            player_id,
            PlayerEventType::PlayerCreated,
            format!("Created ({}, {} byte buffer)", format_info, buffer_bytes),
            None,
        );
    }

    pub fn log_state_change(&self, player_id: PlayerId, from: PlaybackState, to: PlaybackState) {
        let event_type = match (from, to) {
            (PlaybackState::Paused, PlaybackState::Playing) => PlayerEventType::PlaybackResumed,
            (_, PlaybackState::Playing) => PlayerEventType::PlaybackStarted,
            (_, PlaybackState::Paused) => PlayerEventType::PlaybackPaused,
            (_, PlaybackState::Stopped) => PlayerEventType::PlaybackStopped,
        };
        self.log_event(player_id, event_type, format!("{} -> {}", from, to), None);
    }

    pub fn log_volume_changed(&self, player_id: PlayerId, gain: f32) {
        self.log_event(
            player_id,
            PlayerEventType::VolumeChanged,
            format!("Gain set to {:.2}", gain),
            None,
        );
    }

    pub fn log_feed_completed(&self, player_id: PlayerId, frames: u64) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.completions += 1;
        }
        self.log_event(
            player_id,
            PlayerEventType::FeedCompleted,
            format!("Backlog of {} frame(s) drained", frames),
            None,
        );
    }

    pub fn log_degraded_write(&self, player_id: PlayerId, attempt: u32, reason: &str) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.degraded_writes += 1;
        }
        self.log_event(
            player_id,
            PlayerEventType::DegradedWrite,
            format!("Write attempt {} degraded: {}", attempt, reason),
            None,
        );
    }

    pub fn log_frame_dropped(&self, player_id: PlayerId, bytes: usize, attempts: u32) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.frames_dropped += 1;
        }
        self.log_event(
            player_id,
            PlayerEventType::FrameDropped,
            format!("Dropped {} byte frame after {} degraded writes", bytes, attempts),
            None,
        );
    }

    pub fn log_device_error(&self, player_id: PlayerId, operation: &str, error: &str) {
        self.log_event(
            player_id,
            PlayerEventType::DeviceError,
            format!("{} failed: {}", operation, error),
            None,
        );
    }

    pub fn log_released(&self, player_id: PlayerId, teardown_time: Duration) {
        self.log_event(
            player_id,
            PlayerEventType::PlayerReleased,
            format!("Released in {:.2}ms", teardown_time.as_secs_f64() * 1000.0),
            Some(teardown_time),
        );
    }

    /// Count a frame accepted by `feed`
    pub fn record_fed(&self, bytes: usize) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.frames_fed += 1;
            stats.bytes_fed += bytes as u64;
        }
    }

    /// Count a frame fully written to the sink
    pub fn record_written(&self, bytes: usize) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.frames_written += 1;
            stats.bytes_written += bytes as u64;
        }
    }

    /// Get recent events for debugging
    pub fn get_recent_events(&self, count: usize) -> Vec<PlayerLogEvent> {
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(_) => return Vec::new(),
        };
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn get_stats(&self) -> PlaybackStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Clear event history
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    /// Get event statistics
    pub fn get_event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::new();
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(_) => return stats,
        };

        for event in events.iter() {
            match event.event_type {
                PlayerEventType::DegradedWrite => stats.degraded_writes += 1,
                PlayerEventType::FrameDropped => stats.frames_dropped += 1,
                PlayerEventType::DeviceError => stats.device_errors += 1,
                PlayerEventType::FeedCompleted => stats.completions += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

impl Default for PlayerLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default)]
pub struct EventStatistics {
    pub total_events: usize,
    pub degraded_writes: usize,
    pub frames_dropped: usize,
    pub device_errors: usize,
    pub completions: usize,
}

impl EventStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}
