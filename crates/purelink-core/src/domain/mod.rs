//! Domain entities for purelink.
//!
//! - **`device`** – `DeviceRecord` (what the configuration says about one
//!   appliance) and `HostOverrides` (serial → static address).  Both are
//!   read-only once loaded; the live connection state belongs to the agent.

pub mod device;
