//! `rover-cockpit` – network transports in front of the rover gateway.
//!
//! 1. **Events** – [`EventServer`] accepts WebSocket connections and makes
//!    each one a session of the [`Gateway`]: client frames add and remove
//!    watches, pushes from joined rooms stream back as text frames.
//!
//! 2. **REST** – [`ApiServer`] serves the `/api` resource tree: `GET` returns
//!    the same payloads the watches push, `PUT` applies a typed partial
//!    update and returns the fresh state.
//!
//! Both servers run until their [`CancellationToken`] is cancelled.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rover_hal::Robot;
//! use rover_middleware::{Gateway, GracePeriods};
//! use rover_cockpit::{ApiServer, EventServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rover_types::GatewayError> {
//!     let robot = Robot::simulated(4);
//!     let gateway = Arc::new(Gateway::for_robot(&robot, &GracePeriods::default()));
//!     let shutdown = CancellationToken::new();
//!
//!     let events = EventServer::bind("0.0.0.0:9090".parse().unwrap(), gateway).await?;
//!     let api = ApiServer::bind("0.0.0.0:8080".parse().unwrap(), robot).await?;
//!     tokio::try_join!(events.serve(shutdown.clone()), api.serve(shutdown))?;
//!     Ok(())
//! }
//! ```
//!
//! [`Gateway`]: rover_middleware::Gateway
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod http;
pub mod server;

pub use http::{ApiServer, router};
pub use server::EventServer;
