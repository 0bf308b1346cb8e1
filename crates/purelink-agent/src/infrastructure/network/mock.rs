//! Mock discovery for tests.
//!
//! Records every call in order and lets tests deliver an address to a
//! registered device with [`MockDiscovery::announce`], as if the network had
//! answered.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use purelink_core::{DeviceIdentity, Discovery, DiscoveryError, OnFound};

/// One observed call on [`MockDiscovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryCall {
    Start,
    Stop,
    Register(String),
}

#[derive(Default)]
struct MockState {
    calls: Vec<DiscoveryCall>,
    pending: HashMap<String, OnFound>,
    fail_start: bool,
}

/// A [`Discovery`] that never touches the network.
#[derive(Default)]
pub struct MockDiscovery {
    state: Mutex<MockState>,
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `start_discovery` fail as if the port were taken.
    pub fn fail_start(&self) {
        self.lock().fail_start = true;
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<DiscoveryCall> {
        self.lock().calls.clone()
    }

    pub fn start_count(&self) -> usize {
        self.count(|c| *c == DiscoveryCall::Start)
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| *c == DiscoveryCall::Stop)
    }

    /// How many times `serial` was registered.
    pub fn registration_count(&self, serial: &str) -> usize {
        self.count(|c| matches!(c, DiscoveryCall::Register(s) if s == serial))
    }

    pub fn is_pending(&self, serial: &str) -> bool {
        self.lock().pending.contains_key(serial)
    }

    /// Delivers `address` to the registration for `serial`.
    ///
    /// Returns `false` when nothing is registered for it.  The callback runs
    /// on the calling thread.
    pub fn announce(&self, serial: &str, address: &str) -> bool {
        let on_found = self.lock().pending.remove(serial);
        match on_found {
            Some(on_found) => {
                on_found(address.to_string());
                true
            }
            None => false,
        }
    }

    fn count(&self, predicate: impl Fn(&DiscoveryCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Discovery for MockDiscovery {
    fn start_discovery(&self) -> Result<(), DiscoveryError> {
        let mut state = self.lock();
        state.calls.push(DiscoveryCall::Start);
        if state.fail_start {
            let addr = SocketAddr::from(([0, 0, 0, 0], 0));
            return Err(DiscoveryError::BindFailed {
                addr,
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
            });
        }
        Ok(())
    }

    fn stop_discovery(&self) {
        self.lock().calls.push(DiscoveryCall::Stop);
    }

    fn register_device(&self, identity: &DeviceIdentity, on_found: OnFound) {
        let mut state = self.lock();
        state
            .calls
            .push(DiscoveryCall::Register(identity.serial.clone()));
        state.pending.insert(identity.serial.clone(), on_found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purelink_core::ProductType;
    use std::sync::Arc;

    #[test]
    fn test_mock_discovery_records_calls_in_order() {
        let discovery = MockDiscovery::new();
        let identity = DeviceIdentity {
            serial: "AB1-UK-0001A".to_string(),
            product_type: ProductType::new("438"),
        };

        discovery.start_discovery().unwrap();
        discovery.register_device(&identity, Box::new(|_| {}));
        discovery.stop_discovery();

        assert_eq!(
            discovery.calls(),
            vec![
                DiscoveryCall::Start,
                DiscoveryCall::Register("AB1-UK-0001A".to_string()),
                DiscoveryCall::Stop,
            ]
        );
    }

    #[test]
    fn test_mock_discovery_announce_fires_once() {
        let discovery = MockDiscovery::new();
        let identity = DeviceIdentity {
            serial: "AB1-UK-0001A".to_string(),
            product_type: ProductType::new("438"),
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        discovery.register_device(
            &identity,
            Box::new(move |addr| sink.lock().unwrap().push(addr)),
        );

        assert!(discovery.announce("AB1-UK-0001A", "10.0.0.9"));
        assert!(!discovery.announce("AB1-UK-0001A", "10.0.0.9"));
        assert_eq!(*seen.lock().unwrap(), vec!["10.0.0.9".to_string()]);
    }

    #[test]
    fn test_mock_discovery_fail_start() {
        let discovery = MockDiscovery::new();
        discovery.fail_start();
        assert!(discovery.start_discovery().is_err());
        assert_eq!(discovery.start_count(), 1);
    }
}
