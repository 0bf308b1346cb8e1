//! # purelink-core
//!
//! Shared library for purelink containing the device domain types and the
//! contracts of every collaborator the connection lifecycle talks to.
//!
//! This crate has zero dependencies on sockets, threads, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! purelink keeps a fleet of LAN appliances (purifiers, fans, heaters)
//! connected and forwards their state and environmental telemetry to a
//! metrics sink.  The agent itself never speaks a device's wire protocol;
//! it drives three collaborators through the traits defined here:
//!
//! - **`DeviceClient`** – one per device.  Connects, disconnects, asks for
//!   fresh environmental data and reports incoming messages.
//!
//! - **`Discovery`** – resolves a device's network address from its serial
//!   number when no static address is configured.
//!
//! - **`UpdateSink`** – receives one notification per accepted message.
//!
//! The **`domain`** module holds the immutable inputs: the configured device
//! records and the serial → address override map.

pub mod domain;
pub mod protocol;

pub use domain::device::{Credentials, DeviceIdentity, DeviceRecord, HostOverrides, ProductType};
pub use protocol::client::{ClientError, ClientFactory, DeviceClient, MessageListener, MessageType};
pub use protocol::discovery::{Discovery, DiscoveryError, OnFound};
pub use protocol::sink::UpdateSink;
