//! Infrastructure layer for the agent.
//!
//! Contains OS-facing adapters and concrete collaborators: timer services,
//! UDP discovery, simulated device clients, the logging update sink, and
//! configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `purelink_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod simulated;
pub mod sink;
pub mod storage;
pub mod timer;
