//! Simulation driver for running the gateway without hardware.
//!
//! [`Simulation`] owns a plain OS thread that advances the robot model at a
//! fixed period.  Notifications therefore originate outside the async
//! runtime, exactly like callbacks from a native driver would.
//!
//! | Subject | Per tick | Once per second |
//! |---|---|---|
//! | motors | rpm/encoder/odometer (`NOTIFY_TELEMETRY` while moving) | |
//! | telemetry | IMU (`NOTIFY_IMU`), distance (`NOTIFY_ODOMETER`) | |
//! | leds | render while animated (`NOTIFY_UPDATE`) | |
//! | rc | channels (`NOTIFY_CHANNELS`) | link quality |
//! | network | | wireless signal (`NOTIFY_SIGNAL`) |
//! | power | | battery drain |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use rover_types::GatewayError;
use rover_types::state::ImuState;
use tracing::{debug, info, warn};

use crate::rc::{CHANNEL_CENTRE, CHANNEL_COUNT};
use crate::robot::Robot;

/// Battery percent lost per simulated second.
const DRAIN_PER_SECOND: f32 = 0.01;

/// Handle to the running simulation thread.  Dropping it stops and joins
/// the thread.
pub struct Simulation {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Simulation {
    /// Start ticking `robot` every `period`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for a zero period or when the OS
    /// refuses to spawn the thread.
    pub fn spawn(robot: Robot, period: Duration) -> Result<Self, GatewayError> {
        if period.is_zero() {
            return Err(GatewayError::Config(
                "simulation period must be non-zero".to_string(),
            ));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("rover-sim".to_string())
            .spawn(move || run(&robot, period, &flag))
            .map_err(|e| GatewayError::Config(format!("failed to spawn simulation: {e}")))?;
        info!(period_ms = period.as_millis() as u64, "simulation started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("simulation thread panicked");
        } else {
            info!("simulation stopped");
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(robot: &Robot, period: Duration, stop: &AtomicBool) {
    let dt = period.as_secs_f32();
    let mut tick = 0u64;
    while !stop.load(Ordering::Acquire) {
        step(robot, tick, dt);
        tick += 1;
        std::thread::park_timeout(period);
    }
    debug!(ticks = tick, "simulation loop exited");
}

/// Advance every subject by one tick of `dt` seconds.
pub fn step(robot: &Robot, tick: u64, dt: f32) {
    let time = tick as f64 * f64::from(dt);
    let ticks_per_second = (1.0 / dt).round().max(1.0) as u64;
    let once_per_second = tick % ticks_per_second == 0;

    let motors = robot.motors();
    if !motors.is_empty() {
        let distance: f64 = motors.iter().map(|m| m.step(dt)).sum();
        robot
            .telemetry()
            .record_distance(distance / motors.len() as f64);
    }

    robot.telemetry().record_imu(ImuState {
        roll: (time * 0.7).sin() as f32 * 0.02,
        pitch: (time * 0.5).cos() as f32 * 0.02,
        yaw: yaw_from_motors(robot),
        temperature: 25.0 + (time / 60.0).sin() as f32,
    });

    if robot.leds().is_animated() {
        robot.leds().render(time);
    }

    if let Some(rc) = robot.rc() {
        if once_per_second {
            rc.set_link(true, -40 - ((time * 0.3).sin() * 5.0) as i32);
        }
        let channels: Vec<u16> = (0..CHANNEL_COUNT)
            .map(|i| {
                let wobble = ((time + i as f64) * 0.9).sin() * 10.0;
                (f64::from(CHANNEL_CENTRE) + wobble) as u16
            })
            .collect();
        rc.set_channels(&channels);
    }

    if once_per_second {
        robot
            .network()
            .set_signal("wlan0", -48 - ((time * 0.2).sin() * 6.0) as i32);
        robot.power().discharge(DRAIN_PER_SECOND);
    }
}

/// Heading implied by the distance covered by left and right wheels.
fn yaw_from_motors(robot: &Robot) -> f32 {
    let motors = robot.motors();
    if motors.len() < 2 {
        return 0.0;
    }
    let (left, right): (Vec<_>, Vec<_>) = motors.iter().partition(|m| m.index() % 2 == 0);
    let mean = |side: &[&Arc<crate::motor::Motor>]| {
        side.iter().map(|m| m.snapshot().odometer as f32).sum::<f32>() / side.len() as f32
    };
    ((mean(right.as_slice()) - mean(left.as_slice())) / 1000.0).rem_euclid(std::f32::consts::TAU)
}
