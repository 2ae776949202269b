//! Serialisable snapshots of robot-core objects.
//!
//! These are the shapes pushed to socket rooms and returned by the HTTP
//! surface.  Enum values travel as their upper-case key (`"ALL"`,
//! `"KNIGHT_RIDER"`, …).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Enumerations
// ────────────────────────────────────────────────────────────────────────────

/// One entry of a selectable option list served to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionEntry {
    pub key: String,
    pub disabled: bool,
    pub name: &'static str,
}

macro_rules! option_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident => ($label:expr, $disabled:expr) ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            /// Human readable label shown in option lists.
            pub fn label(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            /// `true` for values shown in option lists but not selectable.
            pub fn is_disabled(self) -> bool {
                match self {
                    $( $name::$variant => $disabled ),+
                }
            }

            /// Option table in declaration order.
            pub fn options() -> Vec<OptionEntry> {
                let mut entries = Vec::with_capacity(Self::ALL.len());
                $(
                    entries.push(OptionEntry {
                        key: enum_key(&$name::$variant),
                        disabled: $name::$variant.is_disabled(),
                        name: $label,
                    });
                )+
                entries
            }
        }
    };
}

fn enum_key<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(key)) => key,
        _ => String::new(),
    }
}

option_enum! {
    /// How a motor is being driven.
    MotorMode {
        Duty => ("Duty cycle", false),
        Rpm => ("Closed-loop RPM", false),
    }
}

option_enum! {
    /// Steering geometry of the kinematic model.
    DriveMode {
        None => ("None", false),
        All => ("All wheel steer", false),
        Front => ("Front wheel steer", false),
        Rear => ("Rear wheel steer", false),
        Skid => ("Skid steer", false),
        Spinning => ("Spinning", false),
        Balancing => ("Balancing", false),
    }
}

option_enum! {
    /// Which side of the chassis counts as "forward".
    Orientation {
        North => ("Default", false),
        South => ("Reverse", false),
        East => ("Left", false),
        West => ("Right", false),
    }
}

option_enum! {
    LedAnimation {
        None => ("None", false),
        Headlights => ("Headlights", false),
        Construction => ("Construction", false),
        Police => ("Police", false),
        Ambulance => ("Ambulance", false),
        RunningLight => ("Running Light", false),
        KnightRider => ("Knight Rider", false),
        Rainbow => ("Rainbow", false),
        RainbowWave => ("Rainbow Wave", false),
    }
}

option_enum! {
    LedIndicator {
        None => ("None", false),
        Left => ("Turn Left", false),
        Right => ("Turn Right", false),
        Hazard => ("Hazard", false),
    }
}

option_enum! {
    /// Origin of drive, kinematic and LED commands.
    InputSource {
        Manual => ("Server", false),
        Rc => ("Remote controller", false),
        Web => ("Browser", false),
        Controller => ("Game controller", true),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterfaceType {
    Ethernet,
    Wireless,
    Loopback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerSourceType {
    Generic,
    Battery,
}

// ────────────────────────────────────────────────────────────────────────────
// Motors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorState {
    pub id: usize,
    pub enabled: bool,
    pub duty: f32,
    pub target_rpm: f32,
    pub mode: MotorMode,
    pub rpm: f32,
    pub encoder: i64,
    pub odometer: i64,
}

/// Fast-changing subset of [`MotorState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorTelemetry {
    pub id: usize,
    pub rpm: f32,
    pub encoder: i64,
    pub odometer: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoState {
    pub enabled: bool,
    pub angle: f32,
    pub pulse_us: u32,
    pub limit_min: f32,
    pub limit_max: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoTelemetry {
    pub enabled: bool,
    pub angle: f32,
    pub pulse_us: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Kinematic, LEDs, RC
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicState {
    pub drive_mode: DriveMode,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedState {
    pub brightness: f32,
    /// Packed `0xRRGGBB` background colour.
    pub background: u32,
    pub animation: LedAnimation,
    pub indicators: LedIndicator,
}

/// Rendered LED colours by segment name (`"front"`, `"back"`).
pub type LedOutput = BTreeMap<String, Vec<u32>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RcState {
    pub enabled: bool,
    pub connected: bool,
    pub rssi: i32,
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuState {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OdometerState {
    /// Metres travelled since power-on.
    pub total: f64,
    /// Metres travelled since the last odometer reset.
    pub trip: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Network & power
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiState {
    pub ssid: String,
    pub frequency: u32,
    pub channel: u32,
    pub channel_width: u32,
    pub signal_dbm: i32,
    pub signal_rssi: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceState {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InterfaceType,
    pub mac: String,
    pub addresses: Vec<String>,
    pub active: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub wifi: Option<WifiState>,
}

/// Signal-only view of an interface, pushed when only the radio changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSignal {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: InterfaceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_dbm: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_rssi: Option<i32>,
}

impl From<&InterfaceState> for InterfaceSignal {
    fn from(iface: &InterfaceState) -> Self {
        Self {
            name: iface.name.clone(),
            kind: iface.kind,
            signal_dbm: iface.wifi.as_ref().map(|w| w.signal_dbm),
            signal_rssi: iface.wifi.as_ref().map(|w| w.signal_rssi),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    pub charging: bool,
    pub on_battery: bool,
    pub jack_voltage: f32,
    pub percent: f32,
    pub voltage: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSourceState {
    #[serde(rename = "type")]
    pub kind: PowerSourceType,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub battery: Option<BatteryState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerState {
    pub system: PowerSourceState,
}

// ────────────────────────────────────────────────────────────────────────────
// Input
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputState {
    pub axis_source: InputSource,
    pub kinematic_source: InputSource,
    pub led_source: InputSource,
}

/// Axis values written by the browser when it is the active input source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputInterfaceState {
    pub direction: f32,
    pub throttle: f32,
    pub aux_x: f32,
    pub aux_y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_keys_are_upper_snake_case() {
        assert_eq!(serde_json::to_string(&DriveMode::All).unwrap(), "\"ALL\"");
        assert_eq!(
            serde_json::to_string(&LedAnimation::KnightRider).unwrap(),
            "\"KNIGHT_RIDER\""
        );
        let back: Orientation = serde_json::from_str("\"WEST\"").unwrap();
        assert_eq!(back, Orientation::West);
    }

    #[test]
    fn option_tables_follow_declaration_order() {
        let modes = DriveMode::options();
        assert_eq!(modes.len(), DriveMode::ALL.len());
        assert_eq!(modes[1].key, "ALL");
        assert_eq!(modes[1].name, "All wheel steer");

        let sources = InputSource::options();
        let controller = sources.iter().find(|o| o.key == "CONTROLLER").unwrap();
        assert!(controller.disabled);
    }

    #[test]
    fn interface_without_wifi_omits_radio_fields() {
        let iface = InterfaceState {
            name: "eth0".to_string(),
            kind: InterfaceType::Ethernet,
            mac: "00:11:22:33:44:55".to_string(),
            addresses: vec!["192.168.1.2/24".to_string()],
            active: true,
            wifi: None,
        };
        let json = serde_json::to_value(&iface).unwrap();
        assert_eq!(json["type"], "ETHERNET");
        assert!(json.get("ssid").is_none());

        let signal = serde_json::to_value(InterfaceSignal::from(&iface)).unwrap();
        assert!(signal.get("signal_dbm").is_none());
    }

    #[test]
    fn battery_fields_flatten_into_power_source() {
        let power = PowerState {
            system: PowerSourceState {
                kind: PowerSourceType::Battery,
                battery: Some(BatteryState {
                    charging: false,
                    on_battery: true,
                    jack_voltage: 0.0,
                    percent: 87.5,
                    voltage: 8.1,
                }),
            },
        };
        let json = serde_json::to_value(&power).unwrap();
        assert_eq!(json["system"]["type"], "BATTERY");
        assert_eq!(json["system"]["on_battery"], true);
    }
}
