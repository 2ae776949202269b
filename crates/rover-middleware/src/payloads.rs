//! JSON shapes shared by socket pushes and the HTTP surface.

use rover_hal::Robot;
use rover_hal::input::{InputControl, InputInterface};
use rover_hal::kinematic::Kinematic;
use rover_hal::led::LedControl;
use rover_hal::motor::{Motor, Servo};
use rover_hal::rc::RcReceiver;
use rover_hal::system::{Network, Power};
use rover_hal::telemetry::Telemetry;
use rover_types::{Reason, ReasonSet};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::error;

/// Servo reasons are shifted by this offset in a motor watch.
pub const SERVO_OFFSET: Reason = 1000;
/// Power reasons are shifted by this offset in the system watch.
pub const POWER_OFFSET: Reason = 1000;

/// Serialise `value`, logging and yielding `null` on failure.
pub fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialise payload");
        Value::Null
    })
}

fn insert(object: &mut Map<String, Value>, value: Value) {
    if let Value::Object(fields) = value {
        object.extend(fields);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motors
// ────────────────────────────────────────────────────────────────────────────

pub fn motor_control(robot: &Robot) -> Value {
    json!({ "motor_count": robot.motors().len() })
}

/// Full motor state with the nested servo.
pub fn motor(motor: &Motor) -> Value {
    let mut object = Map::new();
    insert(&mut object, to_json(&motor.snapshot()));
    object.insert("servo".to_string(), to_json(&motor.servo().snapshot()));
    Value::Object(object)
}

/// Payload for one read of a motor watch.
///
/// The motor's default reason yields its full state, otherwise telemetry
/// only.  The servo is included only when one of its reasons fired, in full
/// or telemetry form by the same rule.
pub fn motor_update(motor: &Motor, reasons: &ReasonSet) -> Value {
    let mut object = Map::new();
    object.insert("id".to_string(), json!(motor.index()));

    if reasons.contains(Motor::NOTIFY_DEFAULT) {
        insert(&mut object, to_json(&motor.snapshot()));
    } else if reasons.contains(Motor::NOTIFY_TELEMETRY) {
        insert(&mut object, to_json(&motor.telemetry()));
    }

    if reasons.contains(SERVO_OFFSET + Servo::NOTIFY_DEFAULT) {
        object.insert("servo".to_string(), to_json(&motor.servo().snapshot()));
    } else if reasons.contains(SERVO_OFFSET + Servo::NOTIFY_TELEMETRY) {
        object.insert("servo".to_string(), to_json(&motor.servo().telemetry()));
    }
    Value::Object(object)
}

// ────────────────────────────────────────────────────────────────────────────
// Kinematic, LEDs, RC, telemetry, input
// ────────────────────────────────────────────────────────────────────────────

pub fn kinematic(kinematic: &Kinematic) -> Value {
    to_json(&kinematic.snapshot())
}

pub fn leds(leds: &LedControl) -> Value {
    to_json(&leds.snapshot())
}

pub fn led_output(leds: &LedControl) -> Value {
    to_json(&leds.output())
}

/// RC state; a missing receiver reads as disabled and disconnected.
pub fn rc(rc: Option<&RcReceiver>) -> Value {
    to_json(&rc.map(RcReceiver::snapshot).unwrap_or_default())
}

pub fn rc_channels(rc: Option<&RcReceiver>) -> Value {
    to_json(&rc.map(RcReceiver::channels).unwrap_or_default())
}

pub fn imu(telemetry: &Telemetry) -> Value {
    to_json(&telemetry.imu())
}

pub fn odometer(telemetry: &Telemetry) -> Value {
    to_json(&telemetry.odometer())
}

pub fn input(input: &InputControl) -> Value {
    to_json(&input.snapshot())
}

pub fn input_state(web: &InputInterface) -> Value {
    to_json(&web.snapshot())
}

// ────────────────────────────────────────────────────────────────────────────
// System
// ────────────────────────────────────────────────────────────────────────────

/// Interfaces keyed by name.  `signal_only` restricts each entry to its
/// radio fields.
pub fn network(network: &Network, signal_only: bool) -> Value {
    let object: Map<String, Value> = if signal_only {
        network
            .signals()
            .iter()
            .map(|s| (s.name.clone(), to_json(s)))
            .collect()
    } else {
        network
            .interfaces()
            .iter()
            .map(|i| (i.name.clone(), to_json(i)))
            .collect()
    };
    Value::Object(object)
}

/// Full view on a default reason, signal view on a signal-only change,
/// nothing otherwise.
pub fn network_update(target: &Network, reasons: &ReasonSet) -> Option<Value> {
    if reasons.contains(Network::NOTIFY_DEFAULT) {
        Some(network(target, false))
    } else if reasons.contains(Network::NOTIFY_SIGNAL) {
        Some(network(target, true))
    } else {
        None
    }
}

pub fn power(power: &Power) -> Value {
    to_json(&power.snapshot())
}

pub fn system(robot: &Robot) -> Value {
    json!({
        "network": network(robot.network(), false),
        "power": power(robot.power()),
    })
}

/// Only the parts whose reason range fired, with the network in the same
/// full or signal-only view as [`network_update`].  `None` when neither did.
pub fn system_update(robot: &Robot, reasons: &ReasonSet) -> Option<Value> {
    let mut object = Map::new();
    if let Some(view) = network_update(robot.network(), reasons) {
        object.insert("network".to_string(), view);
    }
    if reasons.any_in(POWER_OFFSET..POWER_OFFSET + 1) {
        object.insert("power".to_string(), power(robot.power()));
    }
    (!object.is_empty()).then_some(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reasons(codes: &[Reason]) -> ReasonSet {
        codes.iter().copied().collect()
    }

    #[test]
    fn full_motor_nests_servo() {
        let m = Motor::new(2);
        let value = motor(&m);
        assert_eq!(value["id"], 2);
        assert_eq!(value["mode"], "DUTY");
        assert!(value["servo"]["limit_max"].is_number());
    }

    #[test]
    fn servo_only_change_sends_servo_only() {
        let m = Motor::new(0);
        let value = motor_update(&m, &reasons(&[SERVO_OFFSET + Servo::NOTIFY_DEFAULT]));
        assert_eq!(value["id"], 0);
        assert!(value.get("duty").is_none());
        assert!(value["servo"]["limit_min"].is_number());
    }

    #[test]
    fn default_reason_suppresses_telemetry_subset() {
        let m = Motor::new(0);
        let value = motor_update(&m, &reasons(&[Motor::NOTIFY_DEFAULT, Motor::NOTIFY_TELEMETRY]));
        assert!(value.get("duty").is_some());
        assert!(value.get("servo").is_none());

        let value = motor_update(&m, &reasons(&[Motor::NOTIFY_TELEMETRY, SERVO_OFFSET + 1]));
        assert!(value.get("duty").is_none());
        assert!(value.get("rpm").is_some());
        assert!(value["servo"].get("limit_min").is_none());
    }

    #[test]
    fn network_views() {
        let net = Network::simulated();
        let full = network(&net, false);
        assert_eq!(full["wlan0"]["ssid"], "rover");
        let signal = network_update(&net, &reasons(&[Network::NOTIFY_SIGNAL])).unwrap();
        assert!(signal["wlan0"].get("ssid").is_none());
        assert!(signal["wlan0"]["signal_dbm"].is_number());
        assert!(network_update(&net, &ReasonSet::new()).is_none());
    }

    #[test]
    fn system_update_includes_fired_ranges_only() {
        let robot = Robot::simulated(0);
        let value = system_update(&robot, &reasons(&[POWER_OFFSET])).unwrap();
        assert!(value.get("network").is_none());
        assert_eq!(value["power"]["system"]["type"], "BATTERY");

        let value = system_update(&robot, &reasons(&[Network::NOTIFY_SIGNAL])).unwrap();
        assert!(value.get("power").is_none());
        assert!(value["network"]["wlan0"]["signal_dbm"].is_number());
        assert!(value["network"]["wlan0"].get("ssid").is_none(), "signal view only");

        let value = system_update(&robot, &reasons(&[Network::NOTIFY_DEFAULT])).unwrap();
        assert_eq!(value["network"]["wlan0"]["ssid"], "rover");
        assert!(value["network"]["lo"].is_object());
        assert!(system_update(&robot, &reasons(&[7])).is_none());
    }

    #[test]
    fn missing_rc_reads_as_disabled() {
        assert_eq!(rc(None), json!({"enabled": false, "connected": false, "rssi": 0}));
        assert_eq!(rc_channels(None), json!([]));
    }
}
