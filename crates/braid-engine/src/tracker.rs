//! Sliding-window failure tracker for stat-based fallback.
//!
//! A fixed-length circular window records the outcome of recent primary
//! attempts. The fallback node asks [`good`](StatusTracker::good) before
//! each query: while the window holds fewer than `threshold` failures the
//! primary is trusted alone, otherwise primary and secondary race.

use parking_lot::Mutex;

struct Window {
    slots: Box<[bool]>,
    cursor: usize,
    filled: usize,
    fails: usize,
    successes: usize,
}

/// Circular window counting recent primary failures.
pub struct StatusTracker {
    threshold: usize,
    window: Mutex<Window>,
}

impl StatusTracker {
    /// Creates a tracker over the last `stat_length` attempts that turns
    /// bad at `threshold` windowed failures.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < threshold <= stat_length`.
    pub fn new(threshold: usize, stat_length: usize) -> Self {
        assert!(
            threshold > 0 && threshold <= stat_length,
            "threshold must be in 1..=stat_length"
        );
        Self {
            threshold,
            window: Mutex::new(Window {
                slots: vec![false; stat_length].into_boxed_slice(),
                cursor: 0,
                filled: 0,
                fails: 0,
                successes: 0,
            }),
        }
    }

    /// Records one primary attempt.
    pub fn update(&self, failed: bool) {
        let mut w = self.window.lock();
        if w.filled == w.slots.len() {
            // Evict the slot we are about to overwrite.
            if w.slots[w.cursor] {
                w.fails -= 1;
            } else {
                w.successes -= 1;
            }
        } else {
            w.filled += 1;
        }

        let cursor = w.cursor;
        w.slots[cursor] = failed;
        if failed {
            w.fails += 1;
        } else {
            w.successes += 1;
        }
        w.cursor = (cursor + 1) % w.slots.len();

        debug_assert!(w.fails + w.successes <= w.slots.len());
    }

    /// Returns whether the primary is currently trusted.
    pub fn good(&self) -> bool {
        self.window.lock().fails < self.threshold
    }
}
