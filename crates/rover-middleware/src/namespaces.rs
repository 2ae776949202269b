//! Watch registries for every namespace served by the gateway.
//!
//! | Namespace | Watches |
//! |---|---|
//! | `/motors` | `update_motor_<i>` |
//! | `/kinematic` | `update` |
//! | `/leds` | `update`, `update_output` |
//! | `/rcreceiver` | `update`, `update_channels` |
//! | `/telemetry` | `update_imu`, `update_odometer` |
//! | `/system` | `power_update`, `network_update`, `update` |
//! | `/input` | `update`, `update_state` |

use std::sync::Arc;
use std::time::Duration;

use rover_hal::Robot;
use rover_hal::led::LedControl;
use rover_hal::rc::RcReceiver;
use rover_hal::telemetry::Telemetry;

use crate::payloads;
use crate::registry::WatchRegistry;
use crate::rooms::Rooms;
use crate::sources::{MotorSource, NetworkSource, SnapshotSource, SystemSource};

pub const MOTORS: &str = "/motors";
pub const KINEMATIC: &str = "/kinematic";
pub const LEDS: &str = "/leds";
pub const RC_RECEIVER: &str = "/rcreceiver";
pub const TELEMETRY: &str = "/telemetry";
pub const SYSTEM: &str = "/system";
pub const INPUT: &str = "/input";

/// Post-emit sleep per watch kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GracePeriods {
    pub motor: Duration,
    pub led_output: Duration,
    pub rc: Duration,
    pub rc_channels: Duration,
    pub telemetry: Duration,
    pub system: Duration,
}

impl Default for GracePeriods {
    fn default() -> Self {
        Self {
            motor: Duration::from_millis(100),
            led_output: Duration::from_millis(100),
            rc: Duration::from_millis(500),
            rc_channels: Duration::from_millis(100),
            telemetry: Duration::from_millis(500),
            system: Duration::from_secs(2),
        }
    }
}

pub fn motor_watch_name(index: usize) -> String {
    format!("update_motor_{index}")
}

pub fn motors(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> WatchRegistry {
    robot
        .motors()
        .iter()
        .fold(WatchRegistry::new(MOTORS, rooms), |registry, motor| {
            registry.with_watch(
                motor_watch_name(motor.index()),
                Arc::new(MotorSource(Arc::clone(motor))),
                grace.motor,
            )
        })
}

pub fn kinematic(robot: &Robot, rooms: Arc<dyn Rooms>) -> WatchRegistry {
    WatchRegistry::new(KINEMATIC, rooms).with_watch(
        "update",
        Arc::new(SnapshotSource::new(
            Arc::clone(robot.kinematic()),
            payloads::kinematic,
        )),
        Duration::ZERO,
    )
}

pub fn leds(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> WatchRegistry {
    let leds = robot.leds();
    WatchRegistry::new(LEDS, rooms)
        .with_watch(
            "update",
            Arc::new(
                SnapshotSource::new(Arc::clone(leds), payloads::leds)
                    .filtered(&[LedControl::NOTIFY_DEFAULT]),
            ),
            Duration::ZERO,
        )
        .with_watch(
            "update_output",
            Arc::new(
                SnapshotSource::new(Arc::clone(leds), payloads::led_output)
                    .filtered(&[LedControl::NOTIFY_UPDATE]),
            ),
            grace.led_output,
        )
}

/// Empty when the robot has no receiver.
pub fn rc_receiver(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> WatchRegistry {
    let registry = WatchRegistry::new(RC_RECEIVER, rooms);
    let Some(rc) = robot.rc() else {
        return registry;
    };
    registry
        .with_watch(
            "update",
            Arc::new(
                SnapshotSource::new(Arc::clone(rc), |rc: &RcReceiver| payloads::rc(Some(rc)))
                    .filtered(&[RcReceiver::NOTIFY_DEFAULT]),
            ),
            grace.rc,
        )
        .with_watch(
            "update_channels",
            Arc::new(
                SnapshotSource::new(Arc::clone(rc), |rc: &RcReceiver| {
                    payloads::rc_channels(Some(rc))
                })
                .filtered(&[RcReceiver::NOTIFY_CHANNELS]),
            ),
            grace.rc_channels,
        )
}

pub fn telemetry(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> WatchRegistry {
    let telemetry = robot.telemetry();
    WatchRegistry::new(TELEMETRY, rooms)
        .with_watch(
            "update_imu",
            Arc::new(
                SnapshotSource::new(Arc::clone(telemetry), payloads::imu)
                    .filtered(&[Telemetry::NOTIFY_IMU]),
            ),
            grace.telemetry,
        )
        .with_watch(
            "update_odometer",
            Arc::new(
                SnapshotSource::new(Arc::clone(telemetry), payloads::odometer)
                    .filtered(&[Telemetry::NOTIFY_ODOMETER]),
            ),
            grace.telemetry,
        )
}

pub fn system(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> WatchRegistry {
    WatchRegistry::new(SYSTEM, rooms)
        .with_watch(
            "power_update",
            Arc::new(SnapshotSource::new(
                Arc::clone(robot.power()),
                payloads::power,
            )),
            Duration::ZERO,
        )
        .with_watch(
            "network_update",
            Arc::new(NetworkSource(Arc::clone(robot.network()))),
            Duration::ZERO,
        )
        .with_watch(
            "update",
            Arc::new(SystemSource(robot.clone())),
            grace.system,
        )
}

pub fn input(robot: &Robot, rooms: Arc<dyn Rooms>) -> WatchRegistry {
    WatchRegistry::new(INPUT, rooms)
        .with_watch(
            "update",
            Arc::new(SnapshotSource::new(
                Arc::clone(robot.input()),
                payloads::input,
            )),
            Duration::ZERO,
        )
        .with_watch(
            "update_state",
            Arc::new(SnapshotSource::new(
                Arc::clone(robot.input_interface()),
                payloads::input_state,
            )),
            Duration::ZERO,
        )
}

/// Registries for every namespace, in table order.
pub fn all(robot: &Robot, rooms: Arc<dyn Rooms>, grace: &GracePeriods) -> Vec<WatchRegistry> {
    vec![
        motors(robot, Arc::clone(&rooms), grace),
        kinematic(robot, Arc::clone(&rooms)),
        leds(robot, Arc::clone(&rooms), grace),
        rc_receiver(robot, Arc::clone(&rooms), grace),
        telemetry(robot, Arc::clone(&rooms), grace),
        system(robot, Arc::clone(&rooms), grace),
        input(robot, rooms),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::tests::ChannelRooms;
    use rover_hal::RobotBuilder;

    #[test]
    fn every_namespace_is_built() {
        let (rooms, _rx) = ChannelRooms::new();
        let robot = Robot::simulated(3);
        let registries = all(&robot, rooms, &GracePeriods::default());
        let names: Vec<_> = registries.iter().map(WatchRegistry::namespace).collect();
        assert_eq!(
            names,
            [MOTORS, KINEMATIC, LEDS, RC_RECEIVER, TELEMETRY, SYSTEM, INPUT]
        );

        let motors: Vec<_> = registries[0].watch_names().collect();
        assert_eq!(motors, ["update_motor_0", "update_motor_1", "update_motor_2"]);
        let system: Vec<_> = registries[5].watch_names().collect();
        assert_eq!(system, ["network_update", "power_update", "update"]);
    }

    #[test]
    fn missing_receiver_yields_empty_namespace() {
        let (rooms, _rx) = ChannelRooms::new();
        let robot = RobotBuilder::new().build();
        let registry = rc_receiver(&robot, rooms, &GracePeriods::default());
        assert_eq!(registry.watch_names().count(), 0);
    }
}
