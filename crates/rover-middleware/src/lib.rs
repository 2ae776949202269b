//! `rover-middleware` – watch multiplexing between robot-core subjects and
//! connected clients.
//!
//! # Modules
//!
//! - [`wait`] – suspends a task until a subscription is signalled.
//! - [`watch`] – one reference-counted subscription plus its drain task.
//! - [`registry`] – per-namespace watches and session interest sets.
//! - [`rooms`] – room membership and bounded per-session outbound queues.
//! - [`sources`] / [`payloads`] – what each watch subscribes to and emits.
//! - [`namespaces`] – the registries served by the gateway.
//! - [`protocol`] – JSON frames exchanged with socket clients.
//! - [`gateway`] – every namespace behind one session hub.

pub mod gateway;
pub mod namespaces;
pub mod payloads;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod sources;
pub mod wait;
pub mod watch;

pub use gateway::Gateway;
pub use namespaces::GracePeriods;
pub use registry::WatchRegistry;
pub use rooms::{RoomHub, Rooms};
pub use watch::{Watch, WatchSource};
