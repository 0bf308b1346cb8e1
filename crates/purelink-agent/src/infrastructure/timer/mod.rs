//! Timer services backing [`Scheduler`].
//!
//! - [`TokioScheduler`] – production; each timer is a spawned task that
//!   sleeps and then runs the callback on a runtime worker.
//! - [`manual::ManualScheduler`] – a virtual clock advanced explicitly, for
//!   deterministic tests of retry and refresh behaviour.

use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};

use crate::application::scheduler::{Scheduler, TimerHandle, TimerTask};

pub mod manual;

/// Schedules timers as tasks on a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`TryCurrentError`] when called outside a Tokio runtime.
    pub fn from_current() -> Result<Self, TryCurrentError> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        // Aborting only takes effect at the sleep; a task already running its
        // synchronous body finishes normally.
        TimerHandle::new(move || join.abort())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_task(counter: &Arc<AtomicU32>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        // Arrange
        let scheduler = TokioScheduler::from_current().expect("inside runtime");
        let fired = Arc::new(AtomicU32::new(0));

        // Act
        let _handle = scheduler.schedule(Duration::from_secs(30), counting_task(&fired));
        tokio::time::sleep(Duration::from_secs(29)).await;
        let before = fired.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;

        // Assert
        assert_eq!(before, 0, "task must not run before its delay");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_never_runs() {
        let scheduler = TokioScheduler::from_current().expect("inside runtime");
        let fired = Arc::new(AtomicU32::new(0));

        let handle = scheduler.schedule(Duration::from_secs(5), counting_task(&fired));
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_current_outside_runtime_is_an_error() {
        assert!(TokioScheduler::from_current().is_err());
    }
}
