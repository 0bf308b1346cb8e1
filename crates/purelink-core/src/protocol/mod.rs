//! Contracts of the external collaborators.
//!
//! - **`client`**    – the per-device protocol client and the message taxonomy.
//! - **`discovery`** – dynamic address resolution by serial number.
//! - **`sink`**      – the consumer of classified device updates.

pub mod client;
pub mod discovery;
pub mod sink;
