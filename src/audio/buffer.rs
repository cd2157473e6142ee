use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::AudioError;
use crate::models::StreamFormat;

/// Bounded byte FIFO between the playback driver and the device callback.
///
/// `write_blocking` is the backpressure point: it parks the writer while the ring is
/// full. The callback side never blocks.
#[derive(Debug)]
pub struct ByteRing {
    inner: Mutex<RingState>,
    space: Condvar,
    capacity: usize,
    format: StreamFormat,
    underruns: AtomicUsize,
}

#[derive(Debug)]
struct RingState {
    data: VecDeque<u8>,
    closed: bool,
    waiting_writers: usize,
    /// Bumped by `clear`, so writers parked on a full ring give up
    generation: u64,
}

impl ByteRing {
    /// Create a ring holding `capacity` bytes, rounded down to whole PCM frames
    pub fn new(capacity: usize, format: StreamFormat) -> Self {
        let capacity = format.align_to_frame(capacity);
        Self {
            inner: Mutex::new(RingState {
                data: VecDeque::with_capacity(capacity),
                closed: false,
                waiting_writers: 0,
                generation: 0,
            }),
            space: Condvar::new(),
            capacity,
            format,
            underruns: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting for the device
    pub fn available_read(&self) -> usize {
        self.lock().data.len()
    }

    pub fn available_write(&self) -> usize {
        self.capacity - self.available_read()
    }

    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    pub fn is_full(&self) -> bool {
        self.available_write() == 0
    }

    pub fn fill_level(&self) -> f32 {
        self.available_read() as f32 / self.capacity as f32
    }

    /// Playback time held in the ring
    pub fn buffered_duration(&self) -> Duration {
        let frames = self.available_read() / self.format.bytes_per_frame();
        Duration::from_secs_f64(frames as f64 / self.format.sample_rate as f64)
    }

    /// Copy `data` into the ring, waiting for room as needed.
    ///
    /// Returns early with the bytes accepted so far when the ring is cleared
    /// underneath the writer. Fails with `StreamClosed` once the ring is closed and
    /// nothing was accepted.
    pub fn write_blocking(&self, data: &[u8]) -> Result<usize, AudioError> {
        let mut state = self.lock();
        let generation = state.generation;
        let mut written = 0;

        while written < data.len() {
            if state.closed {
                return if written > 0 { Ok(written) } else { Err(AudioError::StreamClosed) };
            }
            if state.generation != generation {
                return Ok(written);
            }

            let room = self.capacity - state.data.len();
            if room == 0 {
                state.waiting_writers += 1;
                state = self
                    .space
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state.waiting_writers -= 1;
                continue;
            }

            let n = room.min(data.len() - written);
            state.data.extend(&data[written..written + n]);
            written += n;
        }

        Ok(written)
    }

    /// Move whole PCM frames into `out` without blocking. Returns the bytes copied.
    ///
    /// A trailing partial frame stays in the ring until the rest of it arrives, so the
    /// callback never starts a channel cycle mid-frame.
    pub fn read_into(&self, out: &mut [u8]) -> usize {
        let frame = self.format.bytes_per_frame();
        let mut state = self.lock();

        let n = state.data.len().min(out.len());
        let n = n - n % frame;
        for (dst, src) in out.iter_mut().zip(state.data.drain(..n)) {
            *dst = src;
        }

        if n > 0 {
            self.space.notify_all();
        }
        n
    }

    /// Record a callback that ran short of data
    pub fn note_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn underrun_count(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Drop everything buffered and release writers waiting for room
    pub fn clear(&self) {
        let mut state = self.lock();
        state.data.clear();
        state.generation += 1;
        self.space.notify_all();
    }

    /// Refuse further writes. Pending data can still be read.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.space.notify_all();
    }

    /// Writers parked on a full ring
    pub fn waiting_writers(&self) -> usize {
        self.lock().waiting_writers
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
