//! Virtual-clock scheduler.
//!
//! Nothing fires until the owner calls [`ManualScheduler::advance`] or
//! [`ManualScheduler::run_next`].  Tasks run on the caller's thread, outside
//! the scheduler's lock, so a firing task may schedule new timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::application::scheduler::{Scheduler, TimerHandle, TimerTask};

struct Entry {
    id: u64,
    delay: Duration,
    due: Duration,
    task: TimerTask,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    entries: Vec<Entry>,
}

impl ClockState {
    fn prune(&mut self) {
        self.entries.retain(|e| !e.cancelled.load(Ordering::SeqCst));
    }

    /// Index of the earliest live entry due at or before `limit`.
    fn earliest(&self, limit: Option<Duration>) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| limit.map_or(true, |limit| e.due <= limit))
            .min_by_key(|(_, e)| (e.due, e.id))
            .map(|(i, _)| i)
    }
}

/// A [`Scheduler`] driven by an explicit virtual clock.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Delays of every live timer, in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let mut state = self.lock();
        state.prune();
        state.entries.iter().map(|e| e.delay).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_delays().len()
    }

    /// Moves the clock forward by `by`, firing every timer that falls due in
    /// order, including timers scheduled by the tasks themselves.
    ///
    /// Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;
        while let Some(task) = self.take_due(Some(target)) {
            task();
            fired += 1;
        }
        let mut state = self.lock();
        if state.now < target {
            state.now = target;
        }
        fired
    }

    /// Jumps to the earliest live timer and runs it. Returns `false` if none is pending.
    pub fn run_next(&self) -> bool {
        match self.take_due(None) {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    fn take_due(&self, limit: Option<Duration>) -> Option<TimerTask> {
        let mut state = self.lock();
        state.prune();
        let index = state.earliest(limit)?;
        let entry = state.entries.remove(index);
        state.now = state.now.max(entry.due);
        Some(entry.task)
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let due = state.now + delay;
        state.entries.push(Entry {
            id,
            delay,
            due,
            task,
            cancelled: Arc::clone(&cancelled),
        });
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
