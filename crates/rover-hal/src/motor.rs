//! Drive motors and their steering servos.
//!
//! Every [`Motor`] owns one [`Servo`].  Both are independent [`Subject`]s,
//! so a watch typically subscribes to the motor and chains the servo onto
//! the same subscription at an offset.

use std::f32::consts::FRAC_PI_2;

use parking_lot::Mutex;
use rover_types::state::{MotorMode, MotorState, MotorTelemetry, ServoState, ServoTelemetry};
use rover_types::update::{MotorUpdate, ServoUpdate};
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

/// Free-running speed at full duty.
pub const MAX_RPM: f32 = 300.0;
/// Encoder ticks per output revolution.
pub const TICKS_PER_REV: f64 = 1000.0;
/// Wheel circumference in millimetres.
pub const WHEEL_CIRCUMFERENCE_MM: f64 = 200.0;

// ────────────────────────────────────────────────────────────────────────────
// Servo
// ────────────────────────────────────────────────────────────────────────────

struct ServoInner {
    enabled: bool,
    angle: f32,
    limit_min: f32,
    limit_max: f32,
}

/// Position-controlled steering servo.  Angles are radians from centre.
pub struct Servo {
    index: usize,
    inner: Mutex<ServoInner>,
    notifier: Notifier,
}

impl Servo {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    pub const NOTIFY_TELEMETRY: Reason = 1;

    pub fn new(index: usize) -> Self {
        Self {
            index,
            inner: Mutex::new(ServoInner {
                enabled: false,
                angle: 0.0,
                limit_min: -FRAC_PI_2 / 2.0,
                limit_max: FRAC_PI_2 / 2.0,
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn snapshot(&self) -> ServoState {
        let inner = self.inner.lock();
        ServoState {
            enabled: inner.enabled,
            angle: inner.angle,
            pulse_us: angle_to_pulse(inner.angle),
            limit_min: inner.limit_min,
            limit_max: inner.limit_max,
        }
    }

    pub fn telemetry(&self) -> ServoTelemetry {
        let inner = self.inner.lock();
        ServoTelemetry {
            enabled: inner.enabled,
            angle: inner.angle,
            pulse_us: angle_to_pulse(inner.angle),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    /// Move to `angle`, clamped to the servo limits.
    pub fn set_angle(&self, angle: f32) {
        {
            let mut inner = self.inner.lock();
            inner.angle = angle.clamp(inner.limit_min, inner.limit_max);
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    /// Move to the angle corresponding to `pulse_us`.
    pub fn set_pulse_us(&self, pulse_us: u32) {
        self.set_angle(pulse_to_angle(pulse_us));
    }

    pub fn apply(&self, update: &ServoUpdate) {
        if let Some(enabled) = update.enabled {
            self.set_enabled(enabled);
        }
        if let Some(angle) = update.angle {
            self.set_angle(angle);
        }
        if let Some(pulse_us) = update.pulse_us {
            self.set_pulse_us(pulse_us);
        }
    }
}

impl Subject for Servo {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        2
    }
    fn describe(&self) -> String {
        format!("servo[{}]", self.index)
    }
}

fn angle_to_pulse(angle: f32) -> u32 {
    (1500.0 + angle / FRAC_PI_2 * 1000.0).round().clamp(500.0, 2500.0) as u32
}

fn pulse_to_angle(pulse_us: u32) -> f32 {
    (pulse_us.clamp(500, 2500) as f32 - 1500.0) / 1000.0 * FRAC_PI_2
}

// ────────────────────────────────────────────────────────────────────────────
// Motor
// ────────────────────────────────────────────────────────────────────────────

struct MotorInner {
    enabled: bool,
    duty: f32,
    target_rpm: f32,
    mode: MotorMode,
    rpm: f32,
    encoder: f64,
    odometer: f64,
}

/// A drive motor with encoder feedback.
pub struct Motor {
    index: usize,
    inner: Mutex<MotorInner>,
    servo: Servo,
    notifier: Notifier,
}

impl Motor {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    pub const NOTIFY_TELEMETRY: Reason = 1;

    pub fn new(index: usize) -> Self {
        Self {
            index,
            inner: Mutex::new(MotorInner {
                enabled: false,
                duty: 0.0,
                target_rpm: 0.0,
                mode: MotorMode::Duty,
                rpm: 0.0,
                encoder: 0.0,
                odometer: 0.0,
            }),
            servo: Servo::new(index),
            notifier: Notifier::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn servo(&self) -> &Servo {
        &self.servo
    }

    pub fn snapshot(&self) -> MotorState {
        let inner = self.inner.lock();
        MotorState {
            id: self.index,
            enabled: inner.enabled,
            duty: inner.duty,
            target_rpm: inner.target_rpm,
            mode: inner.mode,
            rpm: inner.rpm,
            encoder: inner.encoder as i64,
            odometer: inner.odometer as i64,
        }
    }

    pub fn telemetry(&self) -> MotorTelemetry {
        let inner = self.inner.lock();
        MotorTelemetry {
            id: self.index,
            rpm: inner.rpm,
            encoder: inner.encoder as i64,
            odometer: inner.odometer as i64,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.lock().enabled = enabled;
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    /// Drive open-loop at `duty` (clamped to `-1.0..=1.0`).
    pub fn set_duty(&self, duty: f32) {
        {
            let mut inner = self.inner.lock();
            inner.duty = duty.clamp(-1.0, 1.0);
            inner.mode = MotorMode::Duty;
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    /// Drive closed-loop towards `rpm`.
    pub fn set_target_rpm(&self, rpm: f32) {
        {
            let mut inner = self.inner.lock();
            inner.target_rpm = rpm.clamp(-MAX_RPM, MAX_RPM);
            inner.mode = MotorMode::Rpm;
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    pub fn reset_odometer(&self) {
        self.inner.lock().odometer = 0.0;
        self.notifier.notify(Self::NOTIFY_TELEMETRY);
    }

    pub fn apply(&self, update: &MotorUpdate) {
        if let Some(enabled) = update.enabled {
            self.set_enabled(enabled);
        }
        if let Some(duty) = update.duty {
            self.set_duty(duty);
        }
        if let Some(rpm) = update.target_rpm {
            self.set_target_rpm(rpm);
        }
        if let Some(servo) = &update.servo {
            self.servo.apply(servo);
        }
    }

    /// Advance the motor model by `dt` seconds.  Returns the distance
    /// travelled in metres.
    pub(crate) fn step(&self, dt: f32) -> f64 {
        let (moved, distance) = {
            let mut inner = self.inner.lock();
            let target = match (inner.enabled, inner.mode) {
                (false, _) => 0.0,
                (true, MotorMode::Duty) => inner.duty * MAX_RPM,
                (true, MotorMode::Rpm) => inner.target_rpm,
            };
            inner.rpm += (target - inner.rpm) * (dt * 5.0).min(1.0);
            if inner.rpm.abs() < 0.01 {
                inner.rpm = 0.0;
            }
            let revolutions = f64::from(inner.rpm) / 60.0 * f64::from(dt);
            inner.encoder += revolutions * TICKS_PER_REV;
            let distance_mm = revolutions.abs() * WHEEL_CIRCUMFERENCE_MM;
            inner.odometer += distance_mm;
            (inner.rpm != 0.0, distance_mm / 1000.0)
        };
        if moved {
            self.notifier.notify(Self::NOTIFY_TELEMETRY);
        }
        distance
    }
}

impl Subject for Motor {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        2
    }
    fn describe(&self) -> String {
        format!("motor[{}]", self.index)
    }
}
