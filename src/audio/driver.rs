//! Playback driver: the single worker thread per player that drains the frame queue
//! into the output sink while the player is `Playing`.

use log::{debug, error, trace};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::audio::completion::{CompletionTracker, Generation, Rendered};
use crate::audio::queue::FrameQueue;
use crate::audio::OutputSink;
use crate::error::AudioError;
use crate::logging::PlayerLogger;
use crate::models::{Frame, PlaybackState, PlayerEvent, PlayerId, StreamFormat};

/// Pause between degraded writes, multiplied by the attempt number
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Control block guarded by the player's mutex
pub(crate) struct Control {
    /// Last commanded state
    pub state: PlaybackState,
    pub released: bool,
    /// A wake was requested and the worker has not picked it up yet
    pub wake_pending: bool,
    /// A drain pass is running. Set and cleared only under the control mutex.
    pub draining: bool,
}

/// State shared between the public player handle and its driver thread
pub(crate) struct PlayerCore {
    pub id: PlayerId,
    pub format: StreamFormat,
    pub sink: Box<dyn OutputSink>,
    pub queue: FrameQueue,
    pub tracker: CompletionTracker,
    pub logger: PlayerLogger,
    control: Mutex<Control>,
    wake: Condvar,
    events: Option<UnboundedSender<PlayerEvent>>,
    write_retry_limit: u32,
}

impl PlayerCore {
    pub fn new(
        id: PlayerId,
        format: StreamFormat,
        sink: Box<dyn OutputSink>,
        events: Option<UnboundedSender<PlayerEvent>>,
        logger: PlayerLogger,
        write_retry_limit: u32,
    ) -> Self {
        Self {
            id,
            format,
            sink,
            queue: FrameQueue::new(),
            tracker: CompletionTracker::new(),
            logger,
            control: Mutex::new(Control {
                state: PlaybackState::Stopped,
                released: false,
                wake_pending: false,
                draining: false,
            }),
            wake: Condvar::new(),
            events,
            write_retry_limit,
        }
    }

    pub fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask the worker to start a drain pass.
    ///
    /// A request that finds a pass already running is a no-op: the running pass
    /// re-checks the queue under this same mutex before it goes idle.
    pub fn request_drain(&self, control: &mut Control) -> bool {
        if control.draining || control.released {
            return false;
        }
        control.wake_pending = true;
        self.wake.notify_one();
        true
    }

    /// Wake the worker so it can observe `released` and exit
    pub fn notify_shutdown(&self) {
        self.wake.notify_all();
    }

    pub fn is_draining(&self) -> bool {
        self.lock_control().draining
    }

    fn emit(&self, event: PlayerEvent) {
        if let Some(tx) = &self.events {
            if tx.send(event).is_err() {
                trace!("player {}: event receiver dropped", self.id);
            }
        }
    }

    /// May bytes from `generation` go to the sink right now?
    fn write_gate(&self, generation: Generation) -> WriteGate {
        let control = self.lock_control();
        if control.released || self.tracker.generation() != generation {
            WriteGate::Stale
        } else if control.state != PlaybackState::Playing {
            WriteGate::Paused
        } else {
            WriteGate::Open
        }
    }

    /// Put the unwritten tail of a paused frame back at the head of the queue.
    ///
    /// Does nothing if the player was stopped or released in the meantime.
    fn requeue(&self, frame: Frame, generation: Generation) {
        let control = self.lock_control();
        if !control.released && self.tracker.generation() == generation {
            self.queue.push_front(frame);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteGate {
    Open,
    /// Left `Playing`: keep the rest of the frame for later
    Paused,
    /// Stopped or released since the frame was dequeued
    Stale,
}

/// Handle to the player's worker thread
pub(crate) struct PlaybackDriver {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackDriver {
    /// Start the worker. It idles until the first wake.
    pub fn spawn(core: Arc<PlayerCore>) -> Result<Self, AudioError> {
        let name = format!("raw-player-{}", core.id);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(core))
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create driver thread: {}", e)))?;

        Ok(Self {
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Wait for the worker to retire. The caller must have set `released` first.
    pub fn join(&self) -> Result<(), AudioError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| AudioError::StreamError("playback driver panicked".to_string())),
            None => Ok(()),
        }
    }
}

fn run(core: Arc<PlayerCore>) {
    debug!("player {}: driver started", core.id);

    loop {
        {
            let mut control = core.lock_control();
            while !control.wake_pending && !control.released {
                control = core
                    .wake
                    .wait(control)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if control.released {
                break;
            }
            control.wake_pending = false;
            control.draining = true;
        }

        drain(&core);
    }

    debug!("player {}: driver exited", core.id);
}

/// Write queued frames until the queue is empty or the player leaves `Playing`.
fn drain(core: &PlayerCore) {
    loop {
        let (frame, generation) = {
            let mut control = core.lock_control();
            if control.released || control.state != PlaybackState::Playing {
                control.draining = false;
                return;
            }
            match core.queue.dequeue() {
                Some(frame) => (frame, core.tracker.generation()),
                None => {
                    control.draining = false;
                    return;
                }
            }
        };

        // The control mutex is not held here: feed/pause/stop stay responsive
        // while the sink blocks.
        match write_frame(core, &frame, generation) {
            WriteOutcome::Written if core.write_gate(generation) == WriteGate::Stale => {
                // Landed after a stop had already cleared the device
                if let Err(e) = core.sink.flush() {
                    debug!("player {}: flush after stop failed: {}", core.id, e);
                }
                trace!("player {}: discarded frame written across a stop", core.id);
            }
            WriteOutcome::Written => {
                core.logger.record_written(frame.len());
                credit(core, generation);
            }
            WriteOutcome::Paused { offset } => {
                core.requeue(Frame::new(&frame.as_bytes()[offset..]), generation);
            }
            WriteOutcome::Dropped { attempts } => {
                core.logger.log_frame_dropped(core.id, frame.len(), attempts);
                core.emit(PlayerEvent::FrameDropped {
                    player_id: core.id,
                    bytes: frame.len(),
                });
                credit(core, generation);
            }
            WriteOutcome::Abandoned => {
                trace!("player {}: frame abandoned after stop", core.id);
            }
        }
    }
}

fn credit(core: &PlayerCore, generation: Generation) {
    match core.tracker.mark_rendered(generation) {
        Rendered::Drained { frames } => {
            core.logger.log_feed_completed(core.id, frames);
            core.emit(PlayerEvent::FeedCompleted { player_id: core.id });
        }
        Rendered::Pending { outstanding } => {
            trace!("player {}: {} frame(s) outstanding", core.id, outstanding);
        }
        Rendered::Stale => {}
    }
}

enum WriteOutcome {
    Written,
    /// Gave up after repeated degraded writes
    Dropped { attempts: u32 },
    /// The player was paused before `offset` bytes had been written
    Paused { offset: usize },
    /// The player was stopped or released mid-frame
    Abandoned,
}

fn write_frame(core: &PlayerCore, frame: &Frame, generation: Generation) -> WriteOutcome {
    let data = frame.as_bytes();
    let mut offset = 0;
    let mut failures = 0u32;

    while offset < data.len() {
        match core.write_gate(generation) {
            WriteGate::Open => {}
            WriteGate::Paused => return WriteOutcome::Paused { offset },
            WriteGate::Stale => return WriteOutcome::Abandoned,
        }

        let reason = match core.sink.write(&data[offset..]) {
            Ok(n) if n > 0 => {
                offset += n.min(data.len() - offset);
                failures = 0;
                continue;
            }
            Ok(_) => "device accepted 0 bytes".to_string(),
            Err(e) => e.to_string(),
        };

        // Interrupted by pause or stop rather than degraded
        if core.write_gate(generation) != WriteGate::Open {
            continue;
        }

        failures += 1;
        core.logger.log_degraded_write(core.id, failures, &reason);
        if failures > core.write_retry_limit {
            error!(
                "player {}: giving up on {} byte frame at offset {}",
                core.id,
                data.len(),
                offset
            );
            return WriteOutcome::Dropped { attempts: failures };
        }
        thread::sleep(RETRY_BACKOFF * failures);
    }

    WriteOutcome::Written
}
