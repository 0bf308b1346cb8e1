//! The discovery subsystem contract.
//!
//! Discovery resolves a device's address from its serial number.  Callbacks
//! are delivered asynchronously on a context the implementation controls.

use std::net::SocketAddr;

use thiserror::Error;

use crate::domain::device::DeviceIdentity;

/// One-shot callback receiving the discovered address of a registered device.
pub type OnFound = Box<dyn FnOnce(String) + Send>;

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The listening socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The background worker could not be started.
    #[error("failed to spawn discovery worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Dynamic address resolution shared by every device in the fleet.
pub trait Discovery: Send + Sync {
    /// Starts listening. Calling it on a running instance is a no-op.
    fn start_discovery(&self) -> Result<(), DiscoveryError>;

    /// Stops listening. Later announcements are not delivered until restarted.
    fn stop_discovery(&self);

    /// Asks to be told, once, where `identity` lives.
    fn register_device(&self, identity: &DeviceIdentity, on_found: OnFound);
}
