pub mod buffer;
pub mod completion;
pub mod device;
pub mod driver;
pub mod engine;
pub mod queue;
pub mod sink;

#[cfg(test)]
pub mod testing;

use crate::error::AudioError;
use crate::models::{PlaybackState, StreamFormat};

pub use buffer::ByteRing;
pub use completion::{CompletionTracker, Rendered};
pub use device::{CpalDeviceFactory, DeviceInfo};
pub use engine::RawSoundPlayer;
pub use queue::FrameQueue;
pub use sink::CpalSink;

/// Blocking, device-backed stream that accepts raw PCM bytes.
///
/// Only `write` may block for a meaningful time (device backpressure). Everything else
/// is expected to return promptly. `stop` discards device-buffered audio and must
/// unblock an in-flight `write`, which then returns a short count, zero or an error.
pub trait OutputSink: Send + Sync {
    /// Hand `data` to the device, blocking until it is accepted.
    ///
    /// Returns the number of bytes accepted. `Ok(0)` and `Err(_)` are degraded writes.
    fn write(&self, data: &[u8]) -> Result<usize, AudioError>;

    fn play(&self) -> Result<(), AudioError>;

    fn pause(&self) -> Result<(), AudioError>;

    /// Halt output and discard whatever the device still holds
    fn stop(&self) -> Result<(), AudioError>;

    /// Discard data accepted but not yet rendered
    fn flush(&self) -> Result<(), AudioError>;

    fn set_volume(&self, gain: f32) -> Result<(), AudioError>;

    /// Gain currently applied by the device
    fn volume(&self) -> f32;

    /// State as reported by the device, when it can tell
    fn state(&self) -> Option<PlaybackState>;

    fn release(&self) -> Result<(), AudioError>;
}

/// Opens output sinks for a given stream format.
pub trait DeviceFactory: Send + Sync {
    /// Smallest buffer (in bytes) the device accepts for `format`
    fn min_buffer_size(&self, format: &StreamFormat) -> Result<usize, AudioError>;

    fn open(&self, format: &StreamFormat, buffer_bytes: usize) -> Result<Box<dyn OutputSink>, AudioError>;
}
