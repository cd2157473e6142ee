//! FIFO of PCM frames waiting to be written to the output sink.
//!
//! One producer (the caller path inside `feed`) appends at the tail, one consumer
//! (the playback driver) takes from the head. The queue is unbounded: the device
//! applies backpressure through its blocking `write`, not the queue.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::models::Frame;

pub struct FrameQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    frames: VecDeque<Frame>,
    pending_bytes: usize,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::new(),
                pending_bytes: 0,
            }),
        }
    }

    // A poisoned queue still holds consistent data: every mutation is a single
    // push/pop/clear that cannot panic halfway.
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `frame` at the tail. Never blocks on playback.
    pub fn enqueue(&self, frame: Frame) {
        let mut g = self.lock();
        g.pending_bytes += frame.len();
        g.frames.push_back(frame);
    }

    /// Put `frame` back at the head, ahead of everything still pending.
    pub fn push_front(&self, frame: Frame) {
        let mut g = self.lock();
        g.pending_bytes += frame.len();
        g.frames.push_front(frame);
    }

    /// Remove and return the head, or `None` when nothing is pending.
    pub fn dequeue(&self) -> Option<Frame> {
        let mut g = self.lock();
        let frame = g.frames.pop_front()?;
        g.pending_bytes -= frame.len();
        Some(frame)
    }

    /// Discard every pending frame, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut g = self.lock();
        let dropped = g.frames.len();
        g.frames.clear();
        g.pending_bytes = 0;
        dropped
    }

    /// Number of frames waiting (snapshot)
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Total bytes waiting (snapshot)
    pub fn pending_bytes(&self) -> usize {
        self.lock().pending_bytes
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}
