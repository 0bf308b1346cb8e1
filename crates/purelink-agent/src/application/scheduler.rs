//! Timer-service contract used by device handles.

use std::fmt;
use std::time::Duration;

/// Work run once when a timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send>;

/// Runs tasks after a delay.
///
/// Implementations must never run `task` inline from `schedule`; callers may
/// hold locks while scheduling.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle;
}

/// Cancel handle for one scheduled task.
///
/// Dropping the handle does not cancel the task; call [`TimerHandle::cancel`].
pub struct TimerHandle {
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(canceller: impl FnOnce() + Send + 'static) -> Self {
        Self {
            canceller: Some(Box::new(canceller)),
        }
    }

    /// Prevents the task from starting if it has not started yet.
    pub fn cancel(mut self) {
        if let Some(canceller) = self.canceller.take() {
            canceller();
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.canceller.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_cancel_invokes_canceller_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handle = TimerHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handle.cancel();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_does_not_cancel() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handle = TimerHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(handle);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
