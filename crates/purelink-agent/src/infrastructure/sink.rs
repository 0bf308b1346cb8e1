//! Update sink that reports every accepted device message as a log event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use purelink_core::{DeviceClient, UpdateSink};
use tracing::info;

/// Emits one `info` event per update on the `purelink::updates` target.
#[derive(Debug, Default)]
pub struct LogSink {
    updates: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of updates received so far.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl UpdateSink for LogSink {
    fn update(
        &self,
        name: &str,
        client: Arc<dyn DeviceClient>,
        is_state: bool,
        is_environmental: bool,
    ) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "purelink::updates",
            device = name,
            state = is_state,
            environmental = is_environmental,
            connected = client.is_connected(),
            "device update"
        );
    }
}
