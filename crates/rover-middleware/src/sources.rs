//! [`WatchSource`] implementations for the robot-core subjects.

use std::sync::Arc;

use rover_hal::motor::Motor;
use rover_hal::system::Network;
use rover_hal::{Robot, Subject, Subscription};
use rover_types::{GatewayError, Reason, ReasonSet};
use serde_json::Value;

use crate::payloads::{self, POWER_OFFSET, SERVO_OFFSET};
use crate::watch::WatchSource;

/// One subject, an optional reason filter and a snapshot function.  Every
/// read emits the full snapshot.
pub struct SnapshotSource<S> {
    subject: Arc<S>,
    filter: Option<Vec<Reason>>,
    snapshot: fn(&S) -> Value,
}

impl<S: Subject + 'static> SnapshotSource<S> {
    pub fn new(subject: Arc<S>, snapshot: fn(&S) -> Value) -> Self {
        Self {
            subject,
            filter: None,
            snapshot,
        }
    }

    /// Only wake on `reasons`.
    pub fn filtered(mut self, reasons: &[Reason]) -> Self {
        self.filter = Some(reasons.to_vec());
        self
    }
}

impl<S: Subject + 'static> WatchSource for SnapshotSource<S> {
    fn subscribe(&self) -> Result<Subscription, GatewayError> {
        Ok(self.subject.subscribe(self.filter.as_deref()))
    }

    fn data(&self) -> Value {
        (self.snapshot)(&self.subject)
    }
}

/// Motor with its servo chained at [`SERVO_OFFSET`].
pub struct MotorSource(pub Arc<Motor>);

impl WatchSource for MotorSource {
    fn subscribe(&self) -> Result<Subscription, GatewayError> {
        let subscription = self.0.subscribe(None);
        self.0.servo().attach(&subscription, SERVO_OFFSET, None)?;
        Ok(subscription)
    }

    fn data(&self) -> Value {
        payloads::motor(&self.0)
    }

    fn payload(&self, reasons: &ReasonSet) -> Option<Value> {
        Some(payloads::motor_update(&self.0, reasons))
    }
}

/// Network interfaces; signal-only changes push the reduced view.
pub struct NetworkSource(pub Arc<Network>);

impl WatchSource for NetworkSource {
    fn subscribe(&self) -> Result<Subscription, GatewayError> {
        Ok(self.0.subscribe(None))
    }

    fn data(&self) -> Value {
        payloads::network(&self.0, false)
    }

    fn payload(&self, reasons: &ReasonSet) -> Option<Value> {
        payloads::network_update(&self.0, reasons)
    }
}

/// Network plus power chained at [`POWER_OFFSET`].
pub struct SystemSource(pub Robot);

impl WatchSource for SystemSource {
    fn subscribe(&self) -> Result<Subscription, GatewayError> {
        let subscription = self.0.network().subscribe(None);
        self.0.power().attach(&subscription, POWER_OFFSET, None)?;
        Ok(subscription)
    }

    fn data(&self) -> Value {
        payloads::system(&self.0)
    }

    fn payload(&self, reasons: &ReasonSet) -> Option<Value> {
        payloads::system_update(&self.0, reasons)
    }
}
