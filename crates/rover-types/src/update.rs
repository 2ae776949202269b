//! Typed partial updates.
//!
//! Each struct lists exactly the settable properties of one resource; every
//! field is optional and unknown JSON keys are ignored during
//! deserialisation.  A bad enum value is a deserialisation error.

use serde::Deserialize;

use crate::state::{DriveMode, InputSource, LedAnimation, LedIndicator, Orientation};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServoUpdate {
    pub enabled: Option<bool>,
    pub angle: Option<f32>,
    pub pulse_us: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MotorUpdate {
    pub enabled: Option<bool>,
    pub duty: Option<f32>,
    pub target_rpm: Option<f32>,
    pub servo: Option<ServoUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KinematicUpdate {
    pub drive_mode: Option<DriveMode>,
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LedUpdate {
    pub brightness: Option<f32>,
    pub background: Option<u32>,
    pub animation: Option<LedAnimation>,
    pub indicators: Option<LedIndicator>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RcUpdate {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputUpdate {
    pub axis_source: Option<InputSource>,
    pub kinematic_source: Option<InputSource>,
    pub led_source: Option<InputSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputInterfaceUpdate {
    pub direction: Option<f32>,
    pub throttle: Option<f32>,
    pub aux_x: Option<f32>,
    pub aux_y: Option<f32>,
}

/// Body of `POST /api/kinematic/actions`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionRequest {
    pub id: String,
}

/// The only action currently understood by the kinematic resource.
pub const RESET_ODOMETER_ACTION: &str = "resetOdometer";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored() {
        let update: MotorUpdate =
            serde_json::from_str(r#"{"duty":0.5,"rpm":9000,"odometer":0}"#).unwrap();
        assert_eq!(update.duty, Some(0.5));
        assert_eq!(update.enabled, None);
    }

    #[test]
    fn nested_servo_update() {
        let update: MotorUpdate =
            serde_json::from_str(r#"{"servo":{"angle":0.25,"limit_max":9}}"#).unwrap();
        assert_eq!(update.servo.unwrap().angle, Some(0.25));
    }

    #[test]
    fn bad_enum_value_is_rejected() {
        let result = serde_json::from_str::<KinematicUpdate>(r#"{"drive_mode":"SIDEWAYS"}"#);
        assert!(result.is_err());
    }
}
