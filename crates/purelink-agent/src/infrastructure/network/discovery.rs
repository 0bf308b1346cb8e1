//! UDP announcement-based device discovery.
//!
//! The agent binds a UDP socket on the discovery port (default 24810) and
//! listens for announcement datagrams sent by appliances, or by a LAN bridge
//! relaying their mDNS adverts.  An announcement is a small JSON object:
//!
//! ```json
//! {"serial": "AB1-UK-0001A", "product_type": "438", "address": "10.0.0.5"}
//! ```
//!
//! `address` is optional; when absent, the source IP of the datagram is used.
//!
//! # Registration semantics
//!
//! - A registration is one-shot: the first matching announcement removes it
//!   and invokes its callback with the address.
//! - Announced addresses are cached, so registering a device that has
//!   already announced itself fires the callback straight away.
//! - [`Discovery::stop_discovery`] clears the cache; pending registrations
//!   survive a restart.
//! - Serials are matched case-insensitively.
//!
//! Callbacks run on the receive thread (or on the registering thread for a
//! cached address), never while an internal lock is held.
//!
//! # Read timeout
//!
//! The socket is configured with a 500 ms read timeout.  On each timeout the
//! loop checks its `running` flag, so `stop_discovery` returns within about
//! half a second.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::JoinHandle;
use std::time::Duration;

use purelink_core::{DeviceIdentity, Discovery, DiscoveryError, OnFound};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

/// Default UDP port for device announcements.
pub const DEFAULT_DISCOVERY_PORT: u16 = 24810;

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// A decoded announcement datagram.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Announcement {
    pub serial: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Announcement {
    /// Parses a datagram payload.
    pub fn parse(datagram: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(datagram)
    }

    /// The address to connect to: the advertised one, else the sender's IP.
    pub fn resolve_address(&self, source: SocketAddr) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| source.ip().to_string())
    }
}

/// State shared between the public handle and the receive thread.
#[derive(Default)]
struct Registry {
    pending: Mutex<HashMap<String, OnFound>>,
    discovered: Mutex<HashMap<String, String>>,
}

impl Registry {
    /// Records an announcement and returns the callback to run, if registered.
    fn announce(&self, serial: &str, address: &str) -> Option<OnFound> {
        let key = serial.to_uppercase();
        lock(&self.discovered).insert(key.clone(), address.to_string());
        lock(&self.pending).remove(&key)
    }

    fn register(&self, serial: &str, on_found: OnFound) -> Option<(OnFound, String)> {
        let key = serial.to_uppercase();
        // Hold the pending lock while checking the cache so an announcement
        // arriving concurrently cannot slip between the two.
        let mut pending = lock(&self.pending);
        let cached = lock(&self.discovered).get(&key).cloned();
        match cached {
            Some(address) => Some((on_found, address)),
            None => {
                pending.insert(key, on_found);
                None
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    running: Arc<AtomicBool>,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

/// LAN discovery over UDP announcements.
pub struct UdpDiscovery {
    port: u16,
    registry: Arc<Registry>,
    worker: Mutex<Option<Worker>>,
    /// Socket left bound by a stop issued from the receive thread; the next
    /// start listens on it instead of binding the port again.
    recycled: Mutex<Option<Arc<UdpSocket>>>,
}

impl UdpDiscovery {
    /// Creates a stopped discovery service for `port` (`0` picks a free port).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            registry: Arc::new(Registry::default()),
            worker: Mutex::new(None),
            recycled: Mutex::new(None),
        }
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.worker).as_ref().map(|w| w.local_addr)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker).is_some()
    }

    fn bind(&self) -> Result<Arc<UdpSocket>, DiscoveryError> {
        if let Some(socket) = lock(&self.recycled).take() {
            debug!("reusing the discovery socket");
            return Ok(socket);
        }
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let socket =
            UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        if let Err(e) = socket.set_read_timeout(Some(READ_TIMEOUT)) {
            warn!("could not set discovery read timeout: {e}");
        }
        Ok(Arc::new(socket))
    }
}

impl Discovery for UdpDiscovery {
    fn start_discovery(&self) -> Result<(), DiscoveryError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            debug!("discovery already running");
            return Ok(());
        }

        let socket = self.bind()?;
        let local_addr = socket.local_addr().map_err(|source| DiscoveryError::BindFailed {
            addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            source,
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let thread = std::thread::Builder::new()
            .name("purelink-discovery".to_string())
            .spawn({
                let running = Arc::clone(&running);
                let registry = Arc::clone(&self.registry);
                let socket = Arc::clone(&socket);
                move || discovery_loop(&socket, &registry, &running)
            })
            .map_err(DiscoveryError::Spawn)?;

        info!("discovery listening on UDP {local_addr}");
        *worker = Some(Worker {
            running,
            socket,
            local_addr,
            thread,
        });
        Ok(())
    }

    fn stop_discovery(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        worker.running.store(false, Ordering::Relaxed);

        // A callback running on the receive thread may restart discovery.
        // That thread exits once the callback returns, but it still owns the
        // socket, so keep it for the next start rather than rebinding.
        if worker.thread.thread().id() == std::thread::current().id() {
            *lock(&self.recycled) = Some(worker.socket);
        } else if worker.thread.join().is_err() {
            error!("discovery thread panicked");
        }

        lock(&self.registry.discovered).clear();
        info!("discovery stopped");
    }

    fn register_device(&self, identity: &DeviceIdentity, on_found: OnFound) {
        debug!("registering {} for discovery", identity.serial);
        if let Some((on_found, address)) = self.registry.register(&identity.serial, on_found) {
            debug!("{} already announced at {address}", identity.serial);
            on_found(address);
        }
    }
}

impl Drop for UdpDiscovery {
    fn drop(&mut self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.running.store(false, Ordering::Relaxed);
        }
    }
}

/// The main receive loop executed on the discovery thread.
fn discovery_loop(socket: &UdpSocket, registry: &Registry, running: &AtomicBool) {
    let mut buf = vec![0u8; 2048];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        let announcement = match Announcement::parse(&buf[..len]) {
            Ok(a) => a,
            Err(e) => {
                debug!("ignoring malformed announcement from {src}: {e}");
                continue;
            }
        };

        let address = announcement.resolve_address(src);
        debug!("announcement from {src}: {} at {address}", announcement.serial);
        if let Some(on_found) = registry.announce(&announcement.serial, &address) {
            on_found(address);
        }
    }

    debug!("discovery loop exited");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
