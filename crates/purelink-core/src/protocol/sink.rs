//! The update sink contract.

use std::sync::Arc;

use crate::protocol::client::DeviceClient;

/// Consumer of classified per-device update notifications (e.g. a metrics exporter).
///
/// Called on whichever context delivered the message, so implementations
/// must be cheap and thread-safe.
pub trait UpdateSink: Send + Sync {
    /// `client` is the device's protocol client, from which the sink reads the
    /// current state or environmental values.
    fn update(
        &self,
        name: &str,
        client: Arc<dyn DeviceClient>,
        is_state: bool,
        is_environmental: bool,
    );
}
