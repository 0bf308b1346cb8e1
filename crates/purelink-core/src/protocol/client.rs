//! The device protocol client contract.
//!
//! A [`DeviceClient`] owns the wire connection to one appliance: transport,
//! encryption and message decoding all live behind it.  The agent only needs
//! five operations and a classification of incoming messages.
//!
//! # Threading contract
//!
//! - `connect` performs a non-blocking connect attempt: it returns once the
//!   session is established or has failed, and never waits on ongoing traffic.
//! - Listeners are invoked on a context the client owns (typically its own
//!   connection thread).  Implementations must not hold internal locks while
//!   calling a listener, because a listener may call back into the client.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::device::{DeviceRecord, ProductType};

/// Classification of a message received from a device.
///
/// Produced once by the client adapter so consumers branch on a tag instead of
/// inspecting message payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Operating state changed (power, fan speed, mode, ...).
    State,
    /// Fresh environmental readings (temperature, humidity, particulates, ...).
    Environmental,
}

impl MessageType {
    pub fn is_state(self) -> bool {
        matches!(self, MessageType::State)
    }

    pub fn is_environmental(self) -> bool {
        matches!(self, MessageType::Environmental)
    }
}

/// Errors reported by a device client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The device did not answer in time. Transient; callers retry.
    #[error("timed out connecting to {address}")]
    ConnectTimeout { address: String },
    /// The device answered but refused the session (bad credentials, wrong product).
    #[error("connection to {address} rejected: {reason}")]
    Rejected { address: String, reason: String },
    /// No client implementation exists for this product type.
    #[error("unsupported product type {product_type}")]
    UnsupportedProduct { product_type: ProductType },
    /// The underlying connection object went away, usually because a
    /// disconnect raced with the call.
    #[error("device connection is no longer available")]
    ConnectionGone,
    /// The device sent something the client could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns `true` for the connect-timeout kind, the only retried failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::ConnectTimeout { .. })
    }
}

/// Callback invoked once per message received from the device.
pub type MessageListener = Box<dyn Fn(MessageType) + Send + Sync>;

/// Connection to a single appliance.
pub trait DeviceClient: Send + Sync {
    /// Connects to the device at `address` (IP or hostname).
    fn connect(&self, address: &str) -> Result<(), ClientError>;

    /// Closes the connection. Safe to call when already disconnected.
    fn disconnect(&self);

    /// Asks the device to publish fresh environmental data.
    ///
    /// The reply arrives later as a [`MessageType::Environmental`] message.
    fn request_environmental_data(&self) -> Result<(), ClientError>;

    /// Registers a listener for every subsequent message.
    fn add_message_listener(&self, listener: MessageListener);

    /// Live connection status, read from the session itself.
    fn is_connected(&self) -> bool;
}

/// Builds the protocol client for a device record.
pub trait ClientFactory: Send + Sync {
    fn create(&self, record: &DeviceRecord) -> Result<Arc<dyn DeviceClient>, ClientError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_state_classification() {
        assert!(MessageType::State.is_state());
        assert!(!MessageType::State.is_environmental());
    }

    #[test]
    fn test_message_type_environmental_classification() {
        assert!(MessageType::Environmental.is_environmental());
        assert!(!MessageType::Environmental.is_state());
    }

    #[test]
    fn test_only_connect_timeout_is_a_timeout() {
        // Arrange
        let timeout = ClientError::ConnectTimeout {
            address: "10.0.0.5".to_string(),
        };
        let rejected = ClientError::Rejected {
            address: "10.0.0.5".to_string(),
            reason: "bad credentials".to_string(),
        };
        let io = ClientError::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "socket timed out",
        ));

        // Act / Assert
        assert!(timeout.is_timeout());
        assert!(!rejected.is_timeout());
        assert!(!ClientError::ConnectionGone.is_timeout());
        assert!(!io.is_timeout(), "raw I/O timeouts are not connect timeouts");
    }

    #[test]
    fn test_client_error_messages_name_the_address() {
        let err = ClientError::ConnectTimeout {
            address: "10.0.0.9".to_string(),
        };
        assert_eq!(err.to_string(), "timed out connecting to 10.0.0.9");
    }
}
