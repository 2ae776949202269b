//! Steering geometry selection.

use parking_lot::Mutex;
use rover_types::state::{DriveMode, KinematicState, Orientation};
use rover_types::update::KinematicUpdate;
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

pub struct Kinematic {
    state: Mutex<KinematicState>,
    notifier: Notifier,
}

impl Default for Kinematic {
    fn default() -> Self {
        Self::new()
    }
}

impl Kinematic {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;

    pub fn new() -> Self {
        Self {
            state: Mutex::new(KinematicState {
                drive_mode: DriveMode::None,
                orientation: Orientation::North,
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn snapshot(&self) -> KinematicState {
        self.state.lock().clone()
    }

    pub fn set_drive_mode(&self, mode: DriveMode) {
        self.state.lock().drive_mode = mode;
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    pub fn set_orientation(&self, orientation: Orientation) {
        self.state.lock().orientation = orientation;
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    pub fn apply(&self, update: &KinematicUpdate) {
        if let Some(mode) = update.drive_mode {
            self.set_drive_mode(mode);
        }
        if let Some(orientation) = update.orientation {
            self.set_orientation(orientation);
        }
    }
}

impl Subject for Kinematic {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        1
    }
    fn describe(&self) -> String {
        "kinematic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_both_fields() {
        let kinematic = Kinematic::new();
        let sub = kinematic.subscribe(None);
        kinematic.apply(&KinematicUpdate {
            drive_mode: Some(DriveMode::Skid),
            orientation: Some(Orientation::West),
        });
        assert_eq!(
            kinematic.snapshot(),
            KinematicState {
                drive_mode: DriveMode::Skid,
                orientation: Orientation::West,
            }
        );
        assert_eq!(sub.read().unwrap().len(), 1);
    }
}
