//! The full set of robot-core objects.
//!
//! ```
//! use rover_hal::robot::RobotBuilder;
//!
//! let robot = RobotBuilder::new().with_motors(4).with_rc_receiver().build();
//! assert_eq!(robot.motors().len(), 4);
//! assert!(robot.rc().is_some());
//! ```

use std::sync::Arc;

use crate::input::{InputControl, InputInterface};
use crate::kinematic::Kinematic;
use crate::led::LedControl;
use crate::motor::Motor;
use crate::rc::RcReceiver;
use crate::system::{Network, Power};
use crate::telemetry::Telemetry;

/// Shared handles to every subject.  Cloning is cheap.
#[derive(Clone)]
pub struct Robot {
    motors: Vec<Arc<Motor>>,
    kinematic: Arc<Kinematic>,
    leds: Arc<LedControl>,
    rc: Option<Arc<RcReceiver>>,
    telemetry: Arc<Telemetry>,
    network: Arc<Network>,
    power: Arc<Power>,
    input: Arc<InputControl>,
    input_interface: Arc<InputInterface>,
}

impl Robot {
    /// Robot with `motor_count` motors, an RC receiver and simulated
    /// network/power.
    pub fn simulated(motor_count: usize) -> Self {
        RobotBuilder::new()
            .with_motors(motor_count)
            .with_rc_receiver()
            .build()
    }

    pub fn motors(&self) -> &[Arc<Motor>] {
        &self.motors
    }

    pub fn motor(&self, index: usize) -> Option<&Arc<Motor>> {
        self.motors.get(index)
    }

    pub fn kinematic(&self) -> &Arc<Kinematic> {
        &self.kinematic
    }

    pub fn leds(&self) -> &Arc<LedControl> {
        &self.leds
    }

    /// `None` when the hardware has no receiver fitted.
    pub fn rc(&self) -> Option<&Arc<RcReceiver>> {
        self.rc.as_ref()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn power(&self) -> &Arc<Power> {
        &self.power
    }

    pub fn input(&self) -> &Arc<InputControl> {
        &self.input
    }

    pub fn input_interface(&self) -> &Arc<InputInterface> {
        &self.input_interface
    }

    /// Zero every motor odometer and the telemetry trip counter.
    pub fn reset_odometer(&self) {
        for motor in &self.motors {
            motor.reset_odometer();
        }
        self.telemetry.reset_trip();
    }
}

/// Builder for [`Robot`].  Without further calls it yields a robot with no
/// motors and no RC receiver.
pub struct RobotBuilder {
    motor_count: usize,
    rc: bool,
    network: Option<Network>,
    power: Option<Power>,
}

impl Default for RobotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotBuilder {
    pub fn new() -> Self {
        Self {
            motor_count: 0,
            rc: false,
            network: None,
            power: None,
        }
    }

    pub fn with_motors(mut self, count: usize) -> Self {
        self.motor_count = count;
        self
    }

    pub fn with_rc_receiver(mut self) -> Self {
        self.rc = true;
        self
    }

    /// Replace the simulated interfaces.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    /// Replace the simulated battery.
    pub fn with_power(mut self, power: Power) -> Self {
        self.power = Some(power);
        self
    }

    pub fn build(self) -> Robot {
        Robot {
            motors: (0..self.motor_count).map(|i| Arc::new(Motor::new(i))).collect(),
            kinematic: Arc::new(Kinematic::new()),
            leds: Arc::new(LedControl::new()),
            rc: self.rc.then(|| Arc::new(RcReceiver::new())),
            telemetry: Arc::new(Telemetry::new()),
            network: Arc::new(self.network.unwrap_or_else(Network::simulated)),
            power: Arc::new(self.power.unwrap_or_else(Power::simulated)),
            input: Arc::new(InputControl::new()),
            input_interface: Arc::new(InputInterface::new()),
        }
    }
}
