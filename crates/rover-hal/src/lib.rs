//! `rover-hal` – the robot-core objects the gateway observes.
//!
//! Every object implements [`notify::Subject`]: it keeps its state behind a
//! lock, exposes snapshot accessors and raises reason codes through its
//! [`notify::Notifier`] whenever that state changes.
//!
//! | Module | Subjects |
//! |---|---|
//! | [`motor`] | [`motor::Motor`], [`motor::Servo`] |
//! | [`kinematic`] | [`kinematic::Kinematic`] |
//! | [`led`] | [`led::LedControl`] |
//! | [`rc`] | [`rc::RcReceiver`] |
//! | [`telemetry`] | [`telemetry::Telemetry`] |
//! | [`system`] | [`system::Network`], [`system::Power`] |
//! | [`input`] | [`input::InputControl`], [`input::InputInterface`] |
//!
//! [`robot::Robot`] bundles one of each and [`sim::Simulation`] drives them
//! from a background thread.

pub mod input;
pub mod kinematic;
pub mod led;
pub mod motor;
pub mod notify;
pub mod rc;
pub mod robot;
pub mod sim;
pub mod system;
pub mod telemetry;

pub use notify::{Notifier, Subject, Subscription};
pub use robot::{Robot, RobotBuilder};
