//! Network infrastructure for the agent.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for UDP announcement datagrams from appliances
//!   on the local network and resolves registered serials to addresses.  This
//!   is how devices are found without a `[hosts]` entry.
//!
//! - **`mock`** – A recording [`purelink_core::Discovery`] used by tests to
//!   control exactly when an address is "found".

pub mod discovery;
pub mod mock;
