//! DeviceHandle: one device's connection attempts, timeout retry, and
//! periodic environmental refresh.
//!
//! # Timers (for beginners)
//!
//! A handle owns at most two pending timers:
//!
//! ```text
//! retry   – one-shot, armed after a connect timeout, re-runs connect()
//! refresh – recurring, armed after a successful connect, asks the device
//!           for fresh environmental data and re-arms itself while connected
//! ```
//!
//! Each timer slot is an `Option<PendingTimer>`.  Arming a timer replaces the
//! slot's previous occupant and cancels it, so there is never more than one
//! timer of each kind.  Every armed timer carries a generation number:
//!
//! - When a timer fires, it first clears its slot, but only if the slot still
//!   holds *its* generation.  A concurrent [`DeviceHandle::disconnect`] then
//!   always observes "no timer pending" without waiting for the callback.
//! - A firing whose generation no longer matches was cancelled or replaced
//!   while it was already on its way, and does nothing.
//!
//! The slot mutex is held only while arming, claiming, or cancelling; never
//! across a call into the device client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use purelink_core::{ClientError, DeviceClient, DeviceIdentity, DeviceRecord};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::scheduler::{Scheduler, TimerHandle};

/// How often a connected device is asked for fresh environmental data.
pub const DEFAULT_ENVIRONMENT_REFRESH: Duration = Duration::from_secs(30);

/// Delay between connect attempts after a timeout.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Error type for device lifecycle operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A connect attempt failed for a reason other than a timeout.
    #[error("failed to connect to {serial} at {address}: {source}")]
    ConnectFailed {
        serial: String,
        address: String,
        #[source]
        source: ClientError,
    },
    /// The protocol client for a record could not be created.
    #[error("no client available for {serial}: {source}")]
    ClientUnavailable {
        serial: String,
        #[source]
        source: ClientError,
    },
    /// Another record with the same serial was already configured.
    #[error("duplicate device serial {serial}")]
    DuplicateSerial { serial: String },
}

/// Result of a successful [`DeviceHandle::connect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The client was already connected; nothing was done.
    AlreadyConnected,
    /// The client connected and the refresh timer is running.
    Connected,
    /// The attempt timed out and a retry timer is pending.
    RetryScheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Refresh,
    Retry,
}

struct PendingTimer {
    generation: u64,
    handle: TimerHandle,
}

#[derive(Default)]
struct TimerSlots {
    refresh: Option<PendingTimer>,
    retry: Option<PendingTimer>,
}

impl TimerSlots {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<PendingTimer> {
        match kind {
            TimerKind::Refresh => &mut self.refresh,
            TimerKind::Retry => &mut self.retry,
        }
    }
}

/// Live connection wrapper around one [`DeviceRecord`].
pub struct DeviceHandle {
    record: DeviceRecord,
    client: Arc<dyn DeviceClient>,
    scheduler: Arc<dyn Scheduler>,
    environment_refresh: Duration,
    timers: Mutex<TimerSlots>,
    next_generation: AtomicU64,
}

impl DeviceHandle {
    pub fn new(
        record: DeviceRecord,
        client: Arc<dyn DeviceClient>,
        scheduler: Arc<dyn Scheduler>,
        environment_refresh: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            record,
            client,
            scheduler,
            environment_refresh,
            timers: Mutex::new(TimerSlots::default()),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Device name, e.g. `"Living Room"`.
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Device serial number, e.g. `"AB1-UK-0001A"`.
    pub fn serial(&self) -> &str {
        &self.record.serial
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.record.identity()
    }

    pub fn client(&self) -> &Arc<dyn DeviceClient> {
        &self.client
    }

    /// Live status from the client; never a cached flag.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn has_refresh_timer(&self) -> bool {
        self.timers().refresh.is_some()
    }

    pub fn has_retry_timer(&self) -> bool {
        self.timers().retry.is_some()
    }

    /// Connects to the device and starts the environmental refresh timer.
    ///
    /// A connect timeout arms a retry timer that calls `connect` again after
    /// `retry_delay`, indefinitely, until success or [`disconnect`](Self::disconnect).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ConnectFailed`] for any non-timeout failure.
    /// The handle stays disconnected and nothing is retried.
    pub fn connect(
        self: &Arc<Self>,
        address: &str,
        retry_delay: Duration,
    ) -> Result<ConnectOutcome, DeviceError> {
        if self.is_connected() {
            info!(
                "already connected to {address} ({}); no need to reconnect",
                self.serial()
            );
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        match self.client.connect(address) {
            Ok(()) => {
                info!("connected to {} ({}) at {address}", self.name(), self.serial());
                self.cancel(TimerKind::Retry);
                self.start_refresh_timer();
                Ok(ConnectOutcome::Connected)
            }
            Err(e) if e.is_timeout() => {
                error!(
                    "timeout connecting to {address} ({}); will retry in {retry_delay:?}",
                    self.serial()
                );
                let address = address.to_string();
                self.arm(TimerKind::Retry, retry_delay, move |this| {
                    this.retry_connect(&address, retry_delay);
                });
                Ok(ConnectOutcome::RetryScheduled)
            }
            Err(source) => {
                // A pending retry for an earlier address must not revive the handle.
                self.cancel(TimerKind::Retry);
                Err(DeviceError::ConnectFailed {
                    serial: self.serial().to_string(),
                    address: address.to_string(),
                    source,
                })
            }
        }
    }

    /// Cancels both timers and disconnects the client. Idempotent.
    pub fn disconnect(&self) {
        self.cancel(TimerKind::Refresh);
        self.cancel(TimerKind::Retry);
        debug!("disconnecting from {}", self.serial());
        self.client.disconnect();
    }

    fn retry_connect(self: &Arc<Self>, address: &str, retry_delay: Duration) {
        // Nobody is waiting on a retry, so a hard failure can only be logged.
        if let Err(e) = self.connect(address, retry_delay) {
            error!("giving up on {}: {e}", self.serial());
        }
    }

    fn start_refresh_timer(self: &Arc<Self>) {
        self.arm(TimerKind::Refresh, self.environment_refresh, |this| {
            this.refresh_environment();
        });
    }

    fn refresh_environment(self: &Arc<Self>) {
        if !self.is_connected() {
            debug!("device {} is disconnected; refresh stopped", self.serial());
            return;
        }

        debug!("requesting updated environmental data from {}", self.serial());
        match self.client.request_environmental_data() {
            Ok(()) => {}
            Err(ClientError::ConnectionGone) => {
                error!(
                    "race with a disconnect on {}? skipping an iteration",
                    self.serial()
                );
            }
            Err(e) => {
                warn!(
                    "environmental data request to {} failed: {e}; skipping an iteration",
                    self.serial()
                );
            }
        }
        self.start_refresh_timer();
    }

    /// Schedules `on_fire` after `delay` as the sole timer of `kind`.
    fn arm<F>(self: &Arc<Self>, kind: TimerKind, delay: Duration, on_fire: F)
    where
        F: FnOnce(&Arc<Self>) + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(self);

        // The lock is held across `schedule` so a timer that fires at once
        // still finds its own generation in the slot.
        let mut timers = self.timers();
        let handle = self.scheduler.schedule(
            delay,
            Box::new(move || {
                let Some(this) = weak.upgrade() else {
                    return;
                };
                if this.claim(kind, generation) {
                    on_fire(&this);
                }
            }),
        );
        let previous = timers.slot(kind).replace(PendingTimer { generation, handle });
        drop(timers);

        if let Some(previous) = previous {
            previous.handle.cancel();
        }
    }

    /// Clears the slot of `kind` if it still holds `generation`.
    fn claim(&self, kind: TimerKind, generation: u64) -> bool {
        let mut timers = self.timers();
        let slot = timers.slot(kind);
        if slot.as_ref().is_some_and(|p| p.generation == generation) {
            *slot = None;
            true
        } else {
            false
        }
    }

    fn cancel(&self, kind: TimerKind) {
        let pending = self.timers().slot(kind).take();
        if let Some(pending) = pending {
            pending.handle.cancel();
        }
    }

    fn timers(&self) -> MutexGuard<'_, TimerSlots> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
