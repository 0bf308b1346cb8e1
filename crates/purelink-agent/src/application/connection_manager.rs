//! ConnectionManager: owns every device handle and routes their traffic.
//!
//! # Responsibilities
//!
//! 1. Build one [`DeviceHandle`] per configured record.
//! 2. Reach each device either through a static address from the host
//!    overrides or through the discovery subsystem.
//! 3. Classify every client message and forward it to the [`UpdateSink`].
//! 4. When a message reveals that a device dropped its connection, restart
//!    discovery and register the device again (if reconnect is enabled).
//!
//! # Callbacks and ownership
//!
//! Message listeners live inside the clients, which the handles own, which
//! the manager owns.  Listeners and discovery callbacks therefore hold only
//! weak references back to the manager and the handle; once the manager is
//! gone they do nothing.
//!
//! ```text
//! client ──message──► dispatch ──connected?──► sink.update(..)
//!                          │ no, reconnect on
//!                          ▼
//!            handle.disconnect → discovery stop/start → add_device(.., false)
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use purelink_core::{
    ClientFactory, DeviceRecord, Discovery, DiscoveryError, HostOverrides, MessageType,
    UpdateSink,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::device_handle::{
    DeviceError, DeviceHandle, DEFAULT_ENVIRONMENT_REFRESH, DEFAULT_RETRY_DELAY,
};
use crate::application::scheduler::Scheduler;

/// Tunables shared by every handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Interval of the environmental refresh timer.
    pub environment_refresh: Duration,
    /// Delay before a connect is retried after a timeout.
    pub retry_delay: Duration,
    /// Whether a disconnect detected through a message triggers rediscovery.
    pub reconnect: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            environment_refresh: DEFAULT_ENVIRONMENT_REFRESH,
            retry_delay: DEFAULT_RETRY_DELAY,
            reconnect: true,
        }
    }
}

/// Error type for [`ConnectionManager::start`].
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("failed to start discovery: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// The services a manager drives.
#[derive(Clone)]
pub struct Collaborators {
    pub clients: Arc<dyn ClientFactory>,
    pub discovery: Arc<dyn Discovery>,
    pub sink: Arc<dyn UpdateSink>,
    pub scheduler: Arc<dyn Scheduler>,
}

struct Inner {
    devices: Vec<Arc<DeviceHandle>>,
    hosts: HostOverrides,
    discovery: Arc<dyn Discovery>,
    sink: Arc<dyn UpdateSink>,
    settings: ManagerSettings,
    restart_lock: Mutex<()>,
    stopped: AtomicBool,
}

/// Keeps a fleet of devices connected.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Builds the handles, starts discovery and adds every device.
    ///
    /// Per-device failures do not abort the start; they are returned next to
    /// the manager so the caller can report them.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Discovery`] if the discovery subsystem cannot
    /// be started.
    pub fn start(
        records: Vec<DeviceRecord>,
        hosts: HostOverrides,
        settings: ManagerSettings,
        collaborators: Collaborators,
    ) -> Result<(Self, Vec<DeviceError>), ManagerError> {
        let mut failures = Vec::new();
        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(records.len());

        for record in records {
            if !seen.insert(record.serial.to_uppercase()) {
                warn!("ignoring {} ({}): serial already configured", record.name, record.serial);
                failures.push(DeviceError::DuplicateSerial {
                    serial: record.serial,
                });
                continue;
            }
            match collaborators.clients.create(&record) {
                Ok(client) => devices.push(DeviceHandle::new(
                    record,
                    client,
                    Arc::clone(&collaborators.scheduler),
                    settings.environment_refresh,
                )),
                Err(source) => {
                    error!("no client for {} ({}): {source}", record.name, record.serial);
                    failures.push(DeviceError::ClientUnavailable {
                        serial: record.serial,
                        source,
                    });
                }
            }
        }

        let inner = Arc::new(Inner {
            devices,
            hosts,
            discovery: collaborators.discovery,
            sink: collaborators.sink,
            settings,
            restart_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
        });

        inner.discovery.start_discovery()?;
        info!("connection manager starting {} device(s)", inner.devices.len());

        for handle in &inner.devices {
            if let Err(e) = inner.add_device(handle, true) {
                error!("{e}");
                failures.push(e);
            }
        }

        Ok((Self { inner }, failures))
    }

    /// Connects `handle` directly or registers it with discovery.
    ///
    /// With `register_listener` set, a message listener routing into the
    /// manager is attached to the handle's client first.  Re-adding a device
    /// after a disconnect passes `false` so the client never carries two.
    pub fn add_device(
        &self,
        handle: &Arc<DeviceHandle>,
        register_listener: bool,
    ) -> Result<(), DeviceError> {
        self.inner.add_device(handle, register_listener)
    }

    /// Stops discovery and disconnects every device.
    ///
    /// Messages and discovery results arriving afterwards are ignored, and a
    /// rediscovery already in flight neither restarts discovery nor
    /// reconnects its device.  May be called from inside a discovery or
    /// client callback.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down connection manager");
        self.inner.discovery.stop_discovery();
        for handle in &self.inner.devices {
            handle.disconnect();
        }
    }

    pub fn devices(&self) -> &[Arc<DeviceHandle>] {
        &self.inner.devices
    }

    /// Looks a handle up by serial, case-insensitively.
    pub fn device(&self, serial: &str) -> Option<&Arc<DeviceHandle>> {
        self.inner
            .devices
            .iter()
            .find(|h| h.serial().eq_ignore_ascii_case(serial))
    }

    pub fn settings(&self) -> ManagerSettings {
        self.inner.settings
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn add_device(
        self: &Arc<Self>,
        handle: &Arc<DeviceHandle>,
        register_listener: bool,
    ) -> Result<(), DeviceError> {
        if register_listener {
            let manager = Arc::downgrade(self);
            let device = Arc::downgrade(handle);
            handle.client().add_message_listener(Box::new(move |message| {
                if let (Some(manager), Some(device)) = (manager.upgrade(), device.upgrade()) {
                    manager.dispatch(&device, message);
                }
            }));
        }

        if let Some(address) = self.hosts.get(handle.serial()) {
            info!("connecting to {} at configured address {address}", handle.serial());
            return self.connect_while_running(handle, address);
        }

        if self.is_stopped() {
            return Ok(());
        }
        debug!("no configured address for {}; waiting for discovery", handle.serial());
        let manager = Arc::downgrade(self);
        let device = Arc::downgrade(handle);
        self.discovery.register_device(
            &handle.identity(),
            Box::new(move |address| {
                let (Some(manager), Some(device)) = (manager.upgrade(), device.upgrade()) else {
                    return;
                };
                if manager.is_stopped() {
                    return;
                }
                info!("discovered {} at {address}", device.serial());
                if let Err(e) = manager.connect_while_running(&device, &address) {
                    error!("{e}");
                }
            }),
        );
        Ok(())
    }

    fn dispatch(self: &Arc<Self>, handle: &Arc<DeviceHandle>, message: MessageType) {
        if self.is_stopped() {
            return;
        }

        if !handle.is_connected() {
            if self.settings.reconnect {
                info!(
                    "{} ({}) disconnected; trying to rediscover it",
                    handle.name(),
                    handle.serial()
                );
                handle.disconnect();
                if !self.restart_discovery() {
                    return;
                }
                if let Err(e) = self.add_device(handle, false) {
                    error!("{e}");
                }
                return;
            }
            warn!(
                "{} ({}) disconnected and reconnect is off",
                handle.name(),
                handle.serial()
            );
        }

        debug!("{message:?} message from {}", handle.serial());
        self.sink.update(
            handle.name(),
            Arc::clone(handle.client()),
            message.is_state(),
            message.is_environmental(),
        );
    }

    /// Stops and starts discovery; concurrent restarts run one at a time.
    ///
    /// Returns `false` if the manager was shut down before or during the
    /// restart, in which case discovery is left stopped.
    fn restart_discovery(&self) -> bool {
        let _restart = self.restart_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_stopped() {
            return false;
        }
        self.discovery.stop_discovery();
        if self.is_stopped() {
            return false;
        }
        if let Err(e) = self.discovery.start_discovery() {
            error!("could not restart discovery: {e}");
        }
        // `shutdown` sets the flag before stopping discovery, so either it
        // stops this start or the check below sees the flag.
        if self.is_stopped() {
            self.discovery.stop_discovery();
            return false;
        }
        true
    }

    /// Connects `handle` unless the manager is stopped.
    ///
    /// A shutdown that lands while the attempt is in flight is honoured by
    /// disconnecting again, so no handle is left connected or timed afterwards.
    fn connect_while_running(
        &self,
        handle: &Arc<DeviceHandle>,
        address: &str,
    ) -> Result<(), DeviceError> {
        if self.is_stopped() {
            debug!("manager stopped; not connecting {}", handle.serial());
            return Ok(());
        }
        let result = handle.connect(address, self.settings.retry_delay);
        if self.is_stopped() {
            handle.disconnect();
        }
        result.map(|_| ())
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
