//! Count-based completion tracking.
//!
//! `submit` runs on the caller path for every accepted frame, `mark_rendered` on the
//! driver once a frame has been accepted by the device. Both take the same mutex, so
//! a drain-to-zero detection can never interleave with a concurrent submission.

use std::sync::{Mutex, MutexGuard};

/// Generation of the accounting window. Bumped by `reset`, so frames written after a
/// stop are not credited to the next batch.
pub type Generation = u64;

pub struct CompletionTracker {
    inner: Mutex<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    submitted: u64,
    rendered: u64,
    generation: Generation,
}

/// Result of crediting one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendered {
    /// Frames are still outstanding
    Pending { outstanding: u64 },
    /// The backlog just reached zero. Fires once per drained batch.
    Drained { frames: u64 },
    /// The frame belonged to a window discarded by `reset`
    Stale,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counts::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one frame accepted by `feed`. Returns the generation it belongs to.
    pub fn submit(&self) -> Generation {
        let mut g = self.lock();
        g.submitted += 1;
        g.generation
    }

    /// Credit one frame as fully written.
    pub fn mark_rendered(&self, generation: Generation) -> Rendered {
        let mut g = self.lock();
        if generation != g.generation || g.submitted == 0 {
            return Rendered::Stale;
        }

        g.rendered += 1;
        if g.rendered >= g.submitted {
            let frames = g.submitted;
            g.submitted = 0;
            g.rendered = 0;
            Rendered::Drained { frames }
        } else {
            Rendered::Pending {
                outstanding: g.submitted - g.rendered,
            }
        }
    }

    /// Zero the counters and open a new generation.
    pub fn reset(&self) -> Generation {
        let mut g = self.lock();
        g.submitted = 0;
        g.rendered = 0;
        g.generation += 1;
        g.generation
    }

    pub fn generation(&self) -> Generation {
        self.lock().generation
    }

    /// Frames submitted but not yet rendered
    pub fn outstanding(&self) -> u64 {
        let g = self.lock();
        g.submitted - g.rendered
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}
