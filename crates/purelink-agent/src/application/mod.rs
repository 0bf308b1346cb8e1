//! Application layer of the agent: the device connection lifecycle.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The application layer orchestrates domain objects and collaborator traits
//! without touching sockets, threads, or files itself.  Everything it needs
//! from the outside world arrives as a trait object, so tests can drive it
//! with deterministic doubles.
//!
//! # Sub-modules
//!
//! - **`scheduler`** – The timer-service contract.  Every delayed action
//!   (telemetry refresh, connect retry) is a task on a [`scheduler::Scheduler`]
//!   with an explicit cancel handle.
//!
//! - **`device_handle`** – One device's connection attempts, fixed-interval
//!   timeout retry, and periodic environmental refresh.
//!
//! - **`connection_manager`** – Owns every handle, decides static address vs.
//!   discovery, routes client messages to the update sink, and restarts
//!   discovery when a device drops off the network.

pub mod connection_manager;
pub mod device_handle;
pub mod scheduler;
