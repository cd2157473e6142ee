//! In-memory sink and device factory for exercising the engine without hardware.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{DeviceFactory, OutputSink};
use crate::error::AudioError;
use crate::models::{PlaybackState, StreamFormat};

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Sink operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
    Play,
    Pause,
    Stop,
    SetVolume,
    Release,
}

#[derive(Default)]
struct Gate {
    closed: bool,
    /// Writes wait here even across `stop`, then complete normally
    held: bool,
    blocked: usize,
    /// Bumped by `stop`/`release` to kick blocked writers out
    interrupts: u64,
}

struct Shared {
    writes: Mutex<Vec<Vec<u8>>>,
    /// Accepted bytes the "device" has not played yet. Cleared by `stop` and `flush`.
    buffered: Mutex<Vec<u8>>,
    calls: Mutex<Vec<&'static str>>,
    state: Mutex<PlaybackState>,
    volume: Mutex<f32>,
    gate: Mutex<Gate>,
    gate_cv: Condvar,
    failing: Mutex<Vec<SinkOp>>,
    degraded_writes: AtomicU32,
    max_write: AtomicUsize,
    active_writes: AtomicUsize,
    max_concurrent_writes: AtomicUsize,
    released: AtomicBool,
}

/// Inspection and fault-injection handle onto a [`MockSink`]
#[derive(Clone)]
pub struct SinkMonitor {
    shared: Arc<Shared>,
}

pub struct MockSink {
    shared: Arc<Shared>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                writes: Mutex::new(Vec::new()),
                buffered: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                state: Mutex::new(PlaybackState::Stopped),
                volume: Mutex::new(1.0),
                gate: Mutex::new(Gate::default()),
                gate_cv: Condvar::new(),
                failing: Mutex::new(Vec::new()),
                degraded_writes: AtomicU32::new(0),
                max_write: AtomicUsize::new(0),
                active_writes: AtomicUsize::new(0),
                max_concurrent_writes: AtomicUsize::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn monitor(&self) -> SinkMonitor {
        SinkMonitor {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record(&self, call: &'static str) {
        self.shared.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: SinkOp) -> Result<(), AudioError> {
        let mut failing = self.shared.failing.lock().unwrap();
        if let Some(pos) = failing.iter().position(|f| *f == op) {
            failing.remove(pos);
            return Err(AudioError::StreamError(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn interrupt_writers(&self) {
        let mut gate = self.shared.gate.lock().unwrap();
        gate.interrupts += 1;
        self.shared.gate_cv.notify_all();
    }
}

impl OutputSink for MockSink {
    fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        self.record("write");
        let active = self.shared.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_concurrent_writes.fetch_max(active, Ordering::SeqCst);

        let result = (|| {
            {
                let mut gate = self.shared.gate.lock().unwrap();
                gate.blocked += 1;
                while gate.held {
                    gate = self.shared.gate_cv.wait(gate).unwrap();
                }
                let interrupts = gate.interrupts;
                while gate.closed && gate.interrupts == interrupts {
                    gate = self.shared.gate_cv.wait(gate).unwrap();
                }
                gate.blocked -= 1;
                if gate.interrupts != interrupts {
                    return Ok(0);
                }
            }

            if self.shared.released.load(Ordering::SeqCst) {
                return Err(AudioError::StreamClosed);
            }

            let degraded = self.shared.degraded_writes.load(Ordering::SeqCst);
            if degraded > 0 {
                self.shared.degraded_writes.store(degraded - 1, Ordering::SeqCst);
                return Ok(0);
            }

            let limit = self.shared.max_write.load(Ordering::SeqCst);
            let n = if limit == 0 { data.len() } else { data.len().min(limit) };
            self.shared.buffered.lock().unwrap().extend_from_slice(&data[..n]);
            self.shared.writes.lock().unwrap().push(data[..n].to_vec());
            Ok(n)
        })();

        self.shared.active_writes.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn play(&self) -> Result<(), AudioError> {
        self.record("play");
        self.check(SinkOp::Play)?;
        *self.shared.state.lock().unwrap() = PlaybackState::Playing;
        Ok(())
    }

    fn pause(&self) -> Result<(), AudioError> {
        self.record("pause");
        self.check(SinkOp::Pause)?;
        *self.shared.state.lock().unwrap() = PlaybackState::Paused;
        Ok(())
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.record("stop");
        self.interrupt_writers();
        self.shared.buffered.lock().unwrap().clear();
        self.check(SinkOp::Stop)?;
        *self.shared.state.lock().unwrap() = PlaybackState::Stopped;
        Ok(())
    }

    fn flush(&self) -> Result<(), AudioError> {
        self.record("flush");
        self.shared.buffered.lock().unwrap().clear();
        Ok(())
    }

    fn set_volume(&self, gain: f32) -> Result<(), AudioError> {
        self.record("set_volume");
        self.check(SinkOp::SetVolume)?;
        *self.shared.volume.lock().unwrap() = gain;
        Ok(())
    }

    fn volume(&self) -> f32 {
        *self.shared.volume.lock().unwrap()
    }

    fn state(&self) -> Option<PlaybackState> {
        Some(*self.shared.state.lock().unwrap())
    }

    fn release(&self) -> Result<(), AudioError> {
        self.record("release");
        self.shared.released.store(true, Ordering::SeqCst);
        self.shared.gate.lock().unwrap().held = false;
        self.interrupt_writers();
        self.check(SinkOp::Release)
    }
}

impl SinkMonitor {
    /// Every accepted write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.writes.lock().unwrap().clone()
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.writes().concat()
    }

    /// Every sink call made so far, including writes
    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.shared.calls.lock().unwrap().len()
    }

    /// Make writes block until `open_gate` (or a stop) releases them
    pub fn close_gate(&self) {
        self.shared.gate.lock().unwrap().closed = true;
    }

    pub fn open_gate(&self) {
        let mut gate = self.shared.gate.lock().unwrap();
        gate.closed = false;
        self.shared.gate_cv.notify_all();
    }

    /// Hold writes like a slow device. Unlike the gate, `stop` does not kick them
    /// out: once `release_writes` runs they complete as if nothing happened.
    pub fn hold_writes(&self) {
        self.shared.gate.lock().unwrap().held = true;
    }

    pub fn release_writes(&self) {
        let mut gate = self.shared.gate.lock().unwrap();
        gate.held = false;
        self.shared.gate_cv.notify_all();
    }

    /// Bytes accepted since the last `stop` or `flush`
    pub fn buffered_bytes(&self) -> Vec<u8> {
        self.shared.buffered.lock().unwrap().clone()
    }

    /// Writers currently parked on the gate or a hold
    pub fn blocked_writers(&self) -> usize {
        self.shared.gate.lock().unwrap().blocked
    }

    /// The next `n` writes accept zero bytes
    pub fn degrade_next_writes(&self, n: u32) {
        self.shared.degraded_writes.store(n, Ordering::SeqCst);
    }

    /// Accept at most `n` bytes per write
    pub fn limit_write_size(&self, n: usize) {
        self.shared.max_write.store(n, Ordering::SeqCst);
    }

    /// Fail the next call of `op`
    pub fn fail_next(&self, op: SinkOp) {
        self.shared.failing.lock().unwrap().push(op);
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.shared.max_concurrent_writes.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.shared.released.load(Ordering::SeqCst)
    }
}

/// Factory handing out [`MockSink`]s and remembering how it was asked
pub struct MockDeviceFactory {
    min_buffer: usize,
    fail_open: bool,
    opened: Mutex<Vec<(StreamFormat, usize)>>,
    monitors: Mutex<Vec<SinkMonitor>>,
}

impl MockDeviceFactory {
    pub fn new(min_buffer: usize) -> Self {
        Self {
            min_buffer,
            fail_open: false,
            opened: Mutex::new(Vec::new()),
            monitors: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(4096)
        }
    }

    /// Monitor of the most recently opened sink
    pub fn last_monitor(&self) -> SinkMonitor {
        self.monitors
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no sink opened yet")
    }

    /// Buffer size passed to the most recent `open`
    pub fn last_buffer_size(&self) -> Option<usize> {
        self.opened.lock().unwrap().last().map(|(_, size)| *size)
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl DeviceFactory for MockDeviceFactory {
    fn min_buffer_size(&self, format: &StreamFormat) -> Result<usize, AudioError> {
        Ok(format.align_to_frame(self.min_buffer))
    }

    fn open(&self, format: &StreamFormat, buffer_bytes: usize) -> Result<Box<dyn OutputSink>, AudioError> {
        if self.fail_open {
            return Err(AudioError::InitializationFailed("no output device".to_string()));
        }
        let sink = MockSink::new();
        self.opened.lock().unwrap().push((*format, buffer_bytes));
        self.monitors.lock().unwrap().push(sink.monitor());
        Ok(Box::new(sink))
    }
}
