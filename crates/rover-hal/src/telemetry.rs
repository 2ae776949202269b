//! IMU and odometer readings.

use parking_lot::Mutex;
use rover_types::state::{ImuState, OdometerState};
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

#[derive(Default)]
struct TelemetryInner {
    imu: ImuState,
    odometer: OdometerState,
}

#[derive(Default)]
pub struct Telemetry {
    inner: Mutex<TelemetryInner>,
    notifier: Notifier,
}

impl Telemetry {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    pub const NOTIFY_IMU: Reason = 1;
    pub const NOTIFY_ODOMETER: Reason = 2;

    pub fn new() -> Self {
        let telemetry = Self::default();
        telemetry.inner.lock().imu.temperature = 25.0;
        telemetry
    }

    pub fn imu(&self) -> ImuState {
        self.inner.lock().imu.clone()
    }

    pub fn odometer(&self) -> OdometerState {
        self.inner.lock().odometer.clone()
    }

    /// Zero the trip counter; the total is kept.
    pub fn reset_trip(&self) {
        self.inner.lock().odometer.trip = 0.0;
        self.notifier.notify(Self::NOTIFY_ODOMETER);
    }

    pub(crate) fn record_imu(&self, imu: ImuState) {
        self.inner.lock().imu = imu;
        self.notifier.notify(Self::NOTIFY_IMU);
    }

    /// Add `distance` metres to both counters.
    pub(crate) fn record_distance(&self, distance: f64) {
        if distance <= 0.0 {
            return;
        }
        {
            let mut inner = self.inner.lock();
            inner.odometer.total += distance;
            inner.odometer.trip += distance;
        }
        self.notifier.notify(Self::NOTIFY_ODOMETER);
    }
}

impl Subject for Telemetry {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        3
    }
    fn describe(&self) -> String {
        "telemetry".to_string()
    }
}
