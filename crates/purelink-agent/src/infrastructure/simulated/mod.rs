//! In-process simulated appliances.
//!
//! A [`SimulatedClient`] behaves like a device that is reachable on the LAN:
//!
//! - a successful `connect` publishes the current state (a
//!   [`MessageType::State`] message), as a real device does on subscribe;
//! - `request_environmental_data` is answered with a
//!   [`MessageType::Environmental`] message;
//! - [`SimulatedClient::drop_connection`] models a link loss: the session
//!   goes down and listeners are told with a `State` message.
//!
//! Connect outcomes can be scripted to exercise timeout retry and hard
//! failures.  Messages are delivered on the thread that caused them, and no
//! internal lock is held while listeners run.
//!
//! The binary uses these clients because the appliance wire protocol is not
//! part of this workspace.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use purelink_core::{
    ClientError, ClientFactory, DeviceClient, DeviceRecord, MessageListener, MessageType,
    ProductType,
};
use tracing::debug;

/// Scripted result of one `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectScript {
    Succeed,
    Timeout,
    /// Refused with the given reason, e.g. bad credentials.
    Reject(String),
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    script: VecDeque<ConnectScript>,
    connect_calls: Vec<String>,
    refresh_requests: u32,
    disconnect_calls: u32,
}

type SharedListener = Arc<dyn Fn(MessageType) + Send + Sync>;

/// A simulated device client.
pub struct SimulatedClient {
    serial: String,
    state: Mutex<SimState>,
    listeners: Mutex<Vec<SharedListener>>,
}

impl SimulatedClient {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: Mutex::new(SimState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Queues outcomes for the next `connect` calls; once exhausted, connects succeed.
    pub fn script_connects(&self, outcomes: impl IntoIterator<Item = ConnectScript>) {
        lock(&self.state).script.extend(outcomes);
    }

    /// Addresses passed to `connect`, in call order.
    pub fn connect_calls(&self) -> Vec<String> {
        lock(&self.state).connect_calls.clone()
    }

    pub fn refresh_requests(&self) -> u32 {
        lock(&self.state).refresh_requests
    }

    pub fn disconnect_calls(&self) -> u32 {
        lock(&self.state).disconnect_calls
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Delivers `message` to every listener on the calling thread.
    pub fn emit(&self, message: MessageType) {
        let listeners: Vec<SharedListener> = lock(&self.listeners).clone();
        for listener in listeners {
            listener(message);
        }
    }

    /// Simulates the device dropping off the network.
    pub fn drop_connection(&self) {
        lock(&self.state).connected = false;
        debug!("simulated {} lost its connection", self.serial);
        self.emit(MessageType::State);
    }
}

impl DeviceClient for SimulatedClient {
    fn connect(&self, address: &str) -> Result<(), ClientError> {
        let outcome = {
            let mut state = lock(&self.state);
            state.connect_calls.push(address.to_string());
            let outcome = state.script.pop_front().unwrap_or(ConnectScript::Succeed);
            if outcome == ConnectScript::Succeed {
                state.connected = true;
            }
            outcome
        };

        match outcome {
            ConnectScript::Succeed => {
                debug!("simulated {} connected at {address}", self.serial);
                self.emit(MessageType::State);
                Ok(())
            }
            ConnectScript::Timeout => Err(ClientError::ConnectTimeout {
                address: address.to_string(),
            }),
            ConnectScript::Reject(reason) => Err(ClientError::Rejected {
                address: address.to_string(),
                reason,
            }),
        }
    }

    fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.disconnect_calls += 1;
    }

    fn request_environmental_data(&self) -> Result<(), ClientError> {
        {
            let mut state = lock(&self.state);
            if !state.connected {
                return Err(ClientError::ConnectionGone);
            }
            state.refresh_requests += 1;
        }
        self.emit(MessageType::Environmental);
        Ok(())
    }

    fn add_message_listener(&self, listener: MessageListener) {
        lock(&self.listeners).push(Arc::from(listener));
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Creates one [`SimulatedClient`] per record and keeps them for inspection.
#[derive(Default)]
pub struct SimulatedClientFactory {
    clients: Mutex<HashMap<String, Arc<SimulatedClient>>>,
    unsupported: Mutex<HashSet<ProductType>>,
}

impl SimulatedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create` fail for records of `product_type`.
    pub fn mark_unsupported(&self, product_type: ProductType) {
        lock(&self.unsupported).insert(product_type);
    }

    /// The client created for `serial`, if any.
    pub fn client(&self, serial: &str) -> Option<Arc<SimulatedClient>> {
        lock(&self.clients).get(serial).cloned()
    }
}

impl ClientFactory for SimulatedClientFactory {
    fn create(&self, record: &DeviceRecord) -> Result<Arc<dyn DeviceClient>, ClientError> {
        if lock(&self.unsupported).contains(&record.product_type) {
            return Err(ClientError::UnsupportedProduct {
                product_type: record.product_type.clone(),
            });
        }
        let client = lock(&self.clients)
            .entry(record.serial.clone())
            .or_insert_with(|| Arc::new(SimulatedClient::new(record.serial.clone())))
            .clone();
        Ok(client as Arc<dyn DeviceClient>)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use purelink_core::Credentials;

    fn recording_listener(client: &SimulatedClient) -> Arc<Mutex<Vec<MessageType>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.add_message_listener(Box::new(move |m| sink.lock().unwrap().push(m)));
        seen
    }

    #[test]
    fn test_connect_success_publishes_state() {
        // Arrange
        let client = SimulatedClient::new("AB1-UK-0001A");
        let seen = recording_listener(&client);

        // Act
        client.connect("10.0.0.5").expect("connect");

        // Assert
        assert!(client.is_connected());
        assert_eq!(*seen.lock().unwrap(), vec![MessageType::State]);
        assert_eq!(client.connect_calls(), vec!["10.0.0.5"]);
    }

    #[test]
    fn test_scripted_timeout_then_success() {
        let client = SimulatedClient::new("AB1-UK-0001A");
        client.script_connects([ConnectScript::Timeout]);

        let first = client.connect("10.0.0.5");
        let second = client.connect("10.0.0.5");

        assert!(matches!(first, Err(ref e) if e.is_timeout()));
        assert!(second.is_ok());
        assert!(client.is_connected());
    }

    #[test]
    fn test_scripted_reject_is_not_a_timeout() {
        let client = SimulatedClient::new("AB1-UK-0001A");
        client.script_connects([ConnectScript::Reject("bad credentials".to_string())]);

        let err = client.connect("10.0.0.5").unwrap_err();

        assert!(matches!(err, ClientError::Rejected { .. }));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_refresh_while_disconnected_reports_connection_gone() {
        let client = SimulatedClient::new("AB1-UK-0001A");
        let result = client.request_environmental_data();
        assert!(matches!(result, Err(ClientError::ConnectionGone)));
        assert_eq!(client.refresh_requests(), 0);
    }

    #[test]
    fn test_refresh_while_connected_publishes_environmental() {
        let client = SimulatedClient::new("AB1-UK-0001A");
        client.connect("10.0.0.5").unwrap();
        let seen = recording_listener(&client);

        client.request_environmental_data().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![MessageType::Environmental]);
        assert_eq!(client.refresh_requests(), 1);
    }

    #[test]
    fn test_drop_connection_notifies_listeners_while_disconnected() {
        // Arrange
        let client = Arc::new(SimulatedClient::new("AB1-UK-0001A"));
        client.connect("10.0.0.5").unwrap();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let listening = Arc::clone(&client);
        let sink = Arc::clone(&observed);
        client.add_message_listener(Box::new(move |_| {
            sink.lock().unwrap().push(listening.is_connected());
        }));

        // Act
        client.drop_connection();

        // Assert: the listener could query the client without deadlocking.
        assert_eq!(*observed.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_factory_reuses_one_client_per_serial() {
        let factory = SimulatedClientFactory::new();
        let record = DeviceRecord::new(
            "Living Room",
            "AB1-UK-0001A",
            Credentials::new("x"),
            ProductType::new("438"),
        );

        factory.create(&record).unwrap();
        factory.create(&record).unwrap();

        let client = factory.client("AB1-UK-0001A").expect("created");
        assert_eq!(client.serial(), "AB1-UK-0001A");
        assert_eq!(Arc::strong_count(&client), 2, "factory map + this handle");
    }

    #[test]
    fn test_factory_rejects_unsupported_products() {
        let factory = SimulatedClientFactory::new();
        factory.mark_unsupported(ProductType::new("N223"));
        let record = DeviceRecord::new(
            "Robot",
            "EYE-0001",
            Credentials::new("x"),
            ProductType::new("N223"),
        );

        let result = factory.create(&record);

        assert!(matches!(result, Err(ClientError::UnsupportedProduct { .. })));
    }
}
