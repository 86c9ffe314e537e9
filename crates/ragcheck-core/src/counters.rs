//! Process-wide run counters.
//!
//! The executor bumps these as tasks and items finish; the CLI logs them
//! once on exit via [`Counters::flush`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub static COUNTERS: Counters = Counters::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    TasksStarted,
    TasksFailed,
    ItemsScored,
    ItemsFailed,
}

impl Counter {
    const ALL: [Counter; 4] = [
        Counter::TasksStarted,
        Counter::TasksFailed,
        Counter::ItemsScored,
        Counter::ItemsFailed,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::TasksStarted => "tasks_started",
            Counter::TasksFailed => "tasks_failed",
            Counter::ItemsScored => "items_scored",
            Counter::ItemsFailed => "items_failed",
        }
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub tasks_started: u64,
    pub tasks_failed: u64,
    pub items_scored: u64,
    pub items_failed: u64,
}

pub struct Counters {
    slots: [AtomicU64; 4],
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            slots: [
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
                AtomicU64::new(0),
            ],
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.slots[counter as usize].fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = counter.name(), "counter incremented");
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.slots[counter as usize].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            tasks_started: self.get(Counter::TasksStarted),
            tasks_failed: self.get(Counter::TasksFailed),
            items_scored: self.get(Counter::ItemsScored),
            items_failed: self.get(Counter::ItemsFailed),
        }
    }

    /// Log the current values as one event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            event = "counters",
            tasks_started = s.tasks_started,
            tasks_failed = s.tasks_failed,
            items_scored = s.items_scored,
            items_failed = s.items_failed,
        );
    }

    pub fn reset(&self) {
        for counter in Counter::ALL {
            self.slots[counter as usize].store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incr_touches_only_its_slot() {
        let c = Counters::new();
        c.incr(Counter::ItemsScored);
        c.incr(Counter::ItemsScored);
        c.incr(Counter::TasksFailed);

        assert_eq!(
            c.snapshot(),
            CounterSnapshot {
                tasks_started: 0,
                tasks_failed: 1,
                items_scored: 2,
                items_failed: 0,
            }
        );
    }

    #[test]
    fn reset_zeroes_all() {
        let c = Counters::new();
        for counter in Counter::ALL {
            c.incr(counter);
        }
        c.reset();
        assert_eq!(c.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn snapshot_serializes_by_name() {
        let c = Counters::new();
        c.incr(Counter::TasksStarted);
        let json = serde_json::to_value(c.snapshot()).unwrap();
        assert_eq!(json["tasks_started"], 1);
        assert_eq!(json["items_failed"], 0);
    }
}
