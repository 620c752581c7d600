//! Preemption signal lines.
//!
//! One cache-padded line per worker models the cross-core interrupt: the
//! dispatcher raises it at most once per dispatch, the executing task
//! consumes it at its next interrupt window and suspends. A line found
//! raised after the task already finished is stale and cleared without
//! effect.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::utils::CachePadded;

/// One worker's preemption line.
pub struct PreemptLine(CachePadded<AtomicBool>);

impl PreemptLine {
    fn new() -> Self {
        Self(CachePadded::new(AtomicBool::new(false)))
    }

    /// Raise the line. Dispatcher side.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the line if raised. Worker side; returns true when a signal
    /// was pending.
    pub fn consume(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Drop any pending signal without acting on it.
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Observe without consuming.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// All workers' preemption lines.
pub struct PreemptLines {
    lines: Box<[PreemptLine]>,
}

impl PreemptLines {
    /// Quiescent lines for `workers` workers.
    pub fn new(workers: usize) -> Self {
        Self {
            lines: (0..workers).map(|_| PreemptLine::new()).collect(),
        }
    }

    /// The line of one worker.
    pub fn line(&self, worker: usize) -> &PreemptLine {
        &self.lines[worker]
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when no lines exist.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_one_shot() {
        // Goal: a raised line fires exactly one consume.
        let lines = PreemptLines::new(1);
        assert!(!lines.line(0).consume());
        lines.line(0).raise();
        assert!(lines.line(0).is_raised());
        assert!(lines.line(0).consume());
        assert!(!lines.line(0).consume());
    }

    #[test]
    fn clear_drops_stale_signal() {
        let lines = PreemptLines::new(1);
        lines.line(0).raise();
        lines.line(0).clear();
        assert!(!lines.line(0).consume());
    }
}
