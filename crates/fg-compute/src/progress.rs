//! Terminal progress reporting.
//!
//! A single-line stderr ticker for long row-wise computations. Rendering
//! is suppressed when stderr is not a terminal, so batch logs and test
//! output stay clean.

use std::io::{IsTerminal, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tracks completion of a fixed number of work items on stderr.
///
/// `tick()` is safe to call from worker threads; the line is redrawn at
/// whole-percent boundaries only, so contention on stderr stays low.
pub struct Progress {
    label: String,
    total: usize,
    done: AtomicUsize,
    enabled: bool,
}

impl Progress {
    /// Create a ticker for `total` items under the given label.
    pub fn new(label: &str, total: usize) -> Self {
        Self {
            label: label.to_string(),
            total,
            done: AtomicUsize::new(0),
            enabled: total > 0 && std::io::stderr().is_terminal(),
        }
    }

    /// Create a ticker that never renders, regardless of terminal state.
    pub fn hidden() -> Self {
        Self { label: String::new(), total: 0, done: AtomicUsize::new(0), enabled: false }
    }

    /// Record one completed item.
    pub fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.enabled {
            return;
        }
        // Redraw only when the displayed percentage changes.
        let pct = done * 100 / self.total;
        let prev_pct = (done - 1) * 100 / self.total;
        if pct != prev_pct || done == 1 {
            let mut err = std::io::stderr().lock();
            let _ = write!(err, "\r{}: {}/{} ({}%)", self.label, done, self.total, pct);
            let _ = err.flush();
        }
    }

    /// Finish the line. Call once after the last item.
    pub fn finish(&self) {
        if self.enabled {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err);
        }
    }

    /// Number of items recorded so far.
    pub fn completed(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts() {
        let p = Progress::new("test", 10);
        for _ in 0..7 {
            p.tick();
        }
        assert_eq!(p.completed(), 7);
        p.finish();
    }

    #[test]
    fn test_hidden_never_renders() {
        let p = Progress::hidden();
        p.tick();
        p.tick();
        assert_eq!(p.completed(), 2);
        p.finish();
    }

    #[test]
    fn test_tick_from_threads() {
        let p = std::sync::Arc::new(Progress::new("threads", 100));
        std::thread::scope(|s| {
            for _ in 0..4 {
                let p = p.clone();
                s.spawn(move || {
                    for _ in 0..25 {
                        p.tick();
                    }
                });
            }
        });
        assert_eq!(p.completed(), 100);
    }
}
