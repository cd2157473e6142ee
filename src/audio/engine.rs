use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::driver::{Control, PlaybackDriver, PlayerCore};
use crate::audio::DeviceFactory;
use crate::error::{AudioError, PlayerError};
use crate::logging::{PlaybackStats, PlayerLogger};
use crate::models::{BufferSize, Frame, PlaybackState, PlayerEvent, PlayerId, PlayerOptions, StreamFormat};

/// One independent raw PCM stream.
///
/// Caller-facing operations never wait on a device write: `feed` only enqueues and the
/// per-player driver thread does the blocking I/O. All operations take `&self`, so a
/// player can be shared between the feeding thread and a control thread.
pub struct RawSoundPlayer {
    core: Arc<PlayerCore>,
    driver: PlaybackDriver,
    buffer_bytes: usize,
}

impl RawSoundPlayer {
    /// Create a player: validate the format, open the sink and start the driver thread.
    ///
    /// `FeedCompleted` (and `FrameDropped`) events are pushed to `events` when given.
    pub fn initialize(
        factory: &dyn DeviceFactory,
        options: PlayerOptions,
        events: Option<UnboundedSender<PlayerEvent>>,
    ) -> Result<Self, PlayerError> {
        Self::initialize_with_logger(factory, options, events, PlayerLogger::new())
    }

    pub fn initialize_with_logger(
        factory: &dyn DeviceFactory,
        options: PlayerOptions,
        events: Option<UnboundedSender<PlayerEvent>>,
        logger: PlayerLogger,
    ) -> Result<Self, PlayerError> {
        let format = options.format;
        format.validate().map_err(PlayerError::Construction)?;

        let device_minimum = match options.buffer_size {
            BufferSize::DeviceMinimum => factory.min_buffer_size(&format).map_err(PlayerError::Construction)?,
            BufferSize::Bytes(_) => 0,
        };
        let buffer_bytes = options
            .buffer_size
            .resolve(device_minimum)
            .map_err(PlayerError::Construction)?;
        if buffer_bytes == 0 {
            return Err(PlayerError::Construction(AudioError::InvalidBufferSize { size: 0 }));
        }

        let sink = factory
            .open(&format, buffer_bytes)
            .map_err(PlayerError::Construction)?;

        let id = match options.id {
            Some(id) => {
                id.claim();
                id
            }
            None => PlayerId::next(),
        };
        let core = Arc::new(PlayerCore::new(
            id,
            format,
            sink,
            events,
            logger,
            options.write_retry_limit,
        ));

        let driver = match PlaybackDriver::spawn(Arc::clone(&core)) {
            Ok(driver) => driver,
            Err(e) => {
                if let Err(release_err) = core.sink.release() {
                    warn!("player {}: sink release after failed start: {}", id, release_err);
                }
                return Err(PlayerError::Construction(e));
            }
        };

        core.logger.log_player_created(id, &format.format_string(), buffer_bytes);

        Ok(Self {
            core,
            driver,
            buffer_bytes,
        })
    }

    pub fn id(&self) -> PlayerId {
        self.core.id
    }

    pub fn format(&self) -> StreamFormat {
        self.core.format
    }

    /// Device buffer size actually used, after substituting the device minimum
    pub fn buffer_size(&self) -> usize {
        self.buffer_bytes
    }

    pub fn logger(&self) -> &PlayerLogger {
        &self.core.logger
    }

    pub fn stats(&self) -> PlaybackStats {
        self.core.logger.get_stats()
    }

    /// Frames fed but not yet taken by the driver
    pub fn queued_frames(&self) -> usize {
        self.core.queue.len()
    }

    /// Frames fed but not yet confirmed written
    pub fn outstanding_frames(&self) -> u64 {
        self.core.tracker.outstanding()
    }

    fn ensure_live(&self, control: &Control) -> Result<(), PlayerError> {
        if control.released {
            return Err(PlayerError::Released { id: self.core.id });
        }
        Ok(())
    }

    /// Start or continue output. Idempotent while already playing.
    pub fn play(&self) -> Result<PlaybackState, PlayerError> {
        self.start_output()
    }

    /// Continue after `pause`. From `Stopped` this behaves exactly like `play`.
    pub fn resume(&self) -> Result<PlaybackState, PlayerError> {
        self.start_output()
    }

    fn start_output(&self) -> Result<PlaybackState, PlayerError> {
        let mut control = self.core.lock_control();
        self.ensure_live(&control)?;

        let previous = control.state;
        if previous != PlaybackState::Playing {
            if let Err(e) = self.core.sink.play() {
                self.core.logger.log_device_error(self.core.id, "play", &e.to_string());
                return Err(e.into());
            }
            control.state = PlaybackState::Playing;
            self.core.logger.log_state_change(self.core.id, previous, PlaybackState::Playing);
        }

        self.core.request_drain(&mut control);
        Ok(PlaybackState::Playing)
    }

    /// Halt output, keeping queued frames for `resume`.
    ///
    /// Outside of `Playing` this changes nothing and reports the current state.
    pub fn pause(&self) -> Result<PlaybackState, PlayerError> {
        let mut control = self.core.lock_control();
        self.ensure_live(&control)?;

        if control.state != PlaybackState::Playing {
            return Ok(control.state);
        }

        if let Err(e) = self.core.sink.pause() {
            self.core.logger.log_device_error(self.core.id, "pause", &e.to_string());
            return Err(e.into());
        }
        control.state = PlaybackState::Paused;
        self.core.logger.log_state_change(self.core.id, PlaybackState::Playing, PlaybackState::Paused);
        Ok(PlaybackState::Paused)
    }

    /// Halt output and discard every queued and device-buffered frame.
    ///
    /// The player ends up `Stopped` even if the sink reports a failure.
    pub fn stop(&self) -> Result<PlaybackState, PlayerError> {
        let mut control = self.core.lock_control();
        self.ensure_live(&control)?;

        let previous = control.state;
        let dropped = self.core.queue.clear();
        self.core.tracker.reset();
        control.state = PlaybackState::Stopped;

        let result = self.core.sink.stop().and_then(|_| self.core.sink.flush());
        drop(control);

        if dropped > 0 {
            info!("player {}: discarded {} queued frame(s)", self.core.id, dropped);
        }
        if previous != PlaybackState::Stopped {
            self.core.logger.log_state_change(self.core.id, previous, PlaybackState::Stopped);
        }

        match result {
            Ok(()) => Ok(PlaybackState::Stopped),
            Err(e) => {
                self.core.logger.log_device_error(self.core.id, "stop", &e.to_string());
                Err(PlayerError::Teardown(e))
            }
        }
    }

    /// Queue one chunk of PCM bytes. Never blocks on device I/O.
    pub fn feed(&self, frame: impl Into<Frame>) -> Result<(), PlayerError> {
        let frame = frame.into();
        let mut control = self.core.lock_control();
        self.ensure_live(&control)?;

        if frame.is_empty() {
            return Err(PlayerError::InvalidFrame("frame contains no bytes".to_string()));
        }

        let bytes = frame.len();
        // Count before the frame becomes visible to the driver, so rendered never
        // overtakes submitted.
        self.core.tracker.submit();
        self.core.queue.enqueue(frame);
        self.core.logger.record_fed(bytes);

        if control.state == PlaybackState::Playing {
            self.core.request_drain(&mut control);
        }
        Ok(())
    }

    /// Apply `gain` to the sink immediately. Values are clamped to `[0.0, 1.0]`.
    ///
    /// Returns the gain the device reports afterwards.
    pub fn set_volume(&self, gain: f32) -> Result<f32, PlayerError> {
        let control = self.core.lock_control();
        self.ensure_live(&control)?;

        if gain.is_nan() {
            return Err(PlayerError::InvalidVolume(gain));
        }
        let clamped = gain.clamp(0.0, 1.0);

        if let Err(e) = self.core.sink.set_volume(clamped) {
            self.core.logger.log_device_error(self.core.id, "set volume", &e.to_string());
            return Err(e.into());
        }
        self.core.logger.log_volume_changed(self.core.id, clamped);
        Ok(self.core.sink.volume())
    }

    pub fn volume(&self) -> Result<f32, PlayerError> {
        let control = self.core.lock_control();
        self.ensure_live(&control)?;
        Ok(self.core.sink.volume())
    }

    /// Device-reported state where available, otherwise the last commanded state
    pub fn state(&self) -> Result<PlaybackState, PlayerError> {
        let control = self.core.lock_control();
        self.ensure_live(&control)?;
        Ok(self.core.sink.state().unwrap_or(control.state))
    }

    pub fn is_released(&self) -> bool {
        self.core.lock_control().released
    }

    /// Tear the player down: stop output, discard the queue, retire the driver thread
    /// and free the sink.
    ///
    /// Only the first call does anything; later calls report `Released`. Sink
    /// failures are reported as `Teardown` after the engine's own state is gone.
    pub fn release(&self) -> Result<(), PlayerError> {
        let started = Instant::now();
        {
            let mut control = self.core.lock_control();
            self.ensure_live(&control)?;
            control.released = true;
            control.state = PlaybackState::Stopped;
            self.core.queue.clear();
            self.core.tracker.reset();
            self.core.notify_shutdown();
        }

        let mut teardown_error: Option<AudioError> = None;

        // Kicks a write that is blocked in the sink so the driver can exit
        if let Err(e) = self.core.sink.stop() {
            self.core.logger.log_device_error(self.core.id, "stop", &e.to_string());
            teardown_error = Some(e);
        }

        if let Err(e) = self.driver.join() {
            self.core.logger.log_device_error(self.core.id, "driver shutdown", &e.to_string());
            teardown_error.get_or_insert(e);
        }

        if let Err(e) = self.core.sink.release() {
            self.core.logger.log_device_error(self.core.id, "release", &e.to_string());
            teardown_error.get_or_insert(e);
        }

        self.core.logger.log_released(self.core.id, started.elapsed());

        match teardown_error {
            Some(e) => Err(PlayerError::Teardown(e)),
            None => Ok(()),
        }
    }
}

impl Drop for RawSoundPlayer {
    fn drop(&mut self) {
        if !self.is_released() {
            if let Err(e) = self.release() {
                warn!("player {}: release on drop failed: {}", self.core.id, e);
            }
        }
    }
}
