//! Network interfaces and power supply.

use parking_lot::Mutex;
use rover_types::state::{
    BatteryState, InterfaceSignal, InterfaceState, InterfaceType, PowerSourceState,
    PowerSourceType, PowerState, WifiState,
};
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

// ────────────────────────────────────────────────────────────────────────────
// Network
// ────────────────────────────────────────────────────────────────────────────

pub struct Network {
    interfaces: Mutex<Vec<InterfaceState>>,
    notifier: Notifier,
}

impl Network {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    /// Only radio signal values changed.
    pub const NOTIFY_SIGNAL: Reason = 1;

    pub fn new(interfaces: Vec<InterfaceState>) -> Self {
        Self {
            interfaces: Mutex::new(interfaces),
            notifier: Notifier::new(),
        }
    }

    /// Loopback, a wired port and one wireless interface.
    pub fn simulated() -> Self {
        Self::new(vec![
            InterfaceState {
                name: "lo".to_string(),
                kind: InterfaceType::Loopback,
                mac: "00:00:00:00:00:00".to_string(),
                addresses: vec!["127.0.0.1/8".to_string()],
                active: true,
                wifi: None,
            },
            InterfaceState {
                name: "eth0".to_string(),
                kind: InterfaceType::Ethernet,
                mac: "02:00:00:00:00:01".to_string(),
                addresses: Vec::new(),
                active: false,
                wifi: None,
            },
            InterfaceState {
                name: "wlan0".to_string(),
                kind: InterfaceType::Wireless,
                mac: "02:00:00:00:00:02".to_string(),
                addresses: vec!["192.168.4.1/24".to_string()],
                active: true,
                wifi: Some(WifiState {
                    ssid: "rover".to_string(),
                    frequency: 2437,
                    channel: 6,
                    channel_width: 20,
                    signal_dbm: -45,
                    signal_rssi: 70,
                }),
            },
        ])
    }

    pub fn interfaces(&self) -> Vec<InterfaceState> {
        self.interfaces.lock().clone()
    }

    pub fn signals(&self) -> Vec<InterfaceSignal> {
        self.interfaces
            .lock()
            .iter()
            .map(InterfaceSignal::from)
            .collect()
    }

    /// Bring an interface up or down.  Returns `false` for an unknown name.
    pub fn set_active(&self, name: &str, active: bool) -> bool {
        let found = {
            let mut interfaces = self.interfaces.lock();
            match interfaces.iter_mut().find(|i| i.name == name) {
                Some(iface) => {
                    iface.active = active;
                    true
                }
                None => false,
            }
        };
        if found {
            self.notifier.notify(Self::NOTIFY_DEFAULT);
        }
        found
    }

    /// Update the signal of a wireless interface.
    pub(crate) fn set_signal(&self, name: &str, signal_dbm: i32) {
        let changed = {
            let mut interfaces = self.interfaces.lock();
            let wifi = interfaces
                .iter_mut()
                .filter(|i| i.name == name)
                .find_map(|i| i.wifi.as_mut());
            match wifi {
                Some(wifi) if wifi.signal_dbm != signal_dbm => {
                    wifi.signal_dbm = signal_dbm;
                    wifi.signal_rssi = (2 * (signal_dbm + 100)).clamp(0, 100);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.notifier.notify(Self::NOTIFY_SIGNAL);
        }
    }
}

impl Subject for Network {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        2
    }
    fn describe(&self) -> String {
        "network".to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Power
// ────────────────────────────────────────────────────────────────────────────

/// Pack voltage at 0 % and 100 % charge.
const CELL_EMPTY_V: f32 = 6.4;
const CELL_FULL_V: f32 = 8.4;

pub struct Power {
    state: Mutex<PowerState>,
    notifier: Notifier,
}

impl Power {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;

    pub fn new(system: PowerSourceState) -> Self {
        Self {
            state: Mutex::new(PowerState { system }),
            notifier: Notifier::new(),
        }
    }

    /// A full two-cell battery, not charging.
    pub fn simulated() -> Self {
        Self::new(PowerSourceState {
            kind: PowerSourceType::Battery,
            battery: Some(BatteryState {
                charging: false,
                on_battery: true,
                jack_voltage: 0.0,
                percent: 100.0,
                voltage: CELL_FULL_V,
            }),
        })
    }

    pub fn snapshot(&self) -> PowerState {
        self.state.lock().clone()
    }

    /// Plug or unplug the charger.
    pub fn set_charging(&self, charging: bool) {
        {
            let mut state = self.state.lock();
            if let Some(battery) = state.system.battery.as_mut() {
                battery.charging = charging;
                battery.on_battery = !charging;
                battery.jack_voltage = if charging { 12.0 } else { 0.0 };
            }
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    /// Drain (or charge) the battery by `delta` percent.
    pub(crate) fn discharge(&self, delta: f32) {
        let changed = {
            let mut state = self.state.lock();
            match state.system.battery.as_mut() {
                Some(battery) => {
                    let before = battery.percent;
                    let delta = if battery.charging { -delta } else { delta };
                    battery.percent = (battery.percent - delta).clamp(0.0, 100.0);
                    battery.voltage =
                        CELL_EMPTY_V + (CELL_FULL_V - CELL_EMPTY_V) * battery.percent / 100.0;
                    before != battery.percent
                }
                None => false,
            }
        };
        if changed {
            self.notifier.notify(Self::NOTIFY_DEFAULT);
        }
    }
}

impl Subject for Power {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        1
    }
    fn describe(&self) -> String {
        "power".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_change_raises_signal_reason_only() {
        let network = Network::simulated();
        let sub = network.subscribe(None);
        network.set_signal("wlan0", -60);
        let reasons = sub.read().unwrap();
        assert!(reasons.contains(Network::NOTIFY_SIGNAL));
        assert!(!reasons.contains(Network::NOTIFY_DEFAULT));

        let wlan = network.signals().into_iter().find(|s| s.name == "wlan0").unwrap();
        assert_eq!(wlan.signal_dbm, Some(-60));
        assert_eq!(wlan.signal_rssi, Some(80));
    }

    #[test]
    fn wired_interface_has_no_signal() {
        let network = Network::simulated();
        let sub = network.subscribe(None);
        network.set_signal("eth0", -60);
        assert!(sub.read().unwrap().is_empty());
        assert!(!network.set_active("wlan9", true));
        assert!(network.set_active("eth0", true));
        assert!(sub.read().unwrap().contains(Network::NOTIFY_DEFAULT));
    }

    #[test]
    fn battery_drains_and_charges() {
        let power = Power::simulated();
        power.discharge(10.0);
        let battery = power.snapshot().system.battery.unwrap();
        assert!((battery.percent - 90.0).abs() < 1e-4);
        assert!(battery.voltage < CELL_FULL_V);

        power.set_charging(true);
        power.discharge(5.0);
        let battery = power.snapshot().system.battery.unwrap();
        assert!((battery.percent - 95.0).abs() < 1e-4);
        assert!(!battery.on_battery);
    }
}
