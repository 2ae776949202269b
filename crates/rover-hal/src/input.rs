//! Input source selection and the browser-driven input interface.

use parking_lot::Mutex;
use rover_types::state::{InputInterfaceState, InputSource, InputState};
use rover_types::update::{InputInterfaceUpdate, InputUpdate};
use rover_types::{GatewayError, NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

/// Routes axis, kinematic and LED commands from one of several sources.
pub struct InputControl {
    state: Mutex<InputState>,
    notifier: Notifier,
}

impl Default for InputControl {
    fn default() -> Self {
        Self::new()
    }
}

impl InputControl {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;

    pub fn new() -> Self {
        Self {
            state: Mutex::new(InputState {
                axis_source: InputSource::Manual,
                kinematic_source: InputSource::Manual,
                led_source: InputSource::Manual,
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn snapshot(&self) -> InputState {
        self.state.lock().clone()
    }

    /// Apply a source selection.  Disabled sources are rejected before any
    /// field changes.
    pub fn apply(&self, update: &InputUpdate) -> Result<(), GatewayError> {
        let requested = [update.axis_source, update.kinematic_source, update.led_source];
        if let Some(source) = requested.into_iter().flatten().find(|s| s.is_disabled()) {
            return Err(GatewayError::BadRequest(format!(
                "input source {} is not available",
                source.label()
            )));
        }
        {
            let mut state = self.state.lock();
            if let Some(source) = update.axis_source {
                state.axis_source = source;
            }
            if let Some(source) = update.kinematic_source {
                state.kinematic_source = source;
            }
            if let Some(source) = update.led_source {
                state.led_source = source;
            }
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
        Ok(())
    }
}

impl Subject for InputControl {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        1
    }
    fn describe(&self) -> String {
        "input".to_string()
    }
}

/// Axis values set by the web UI.  Every axis is clamped to `-1.0..=1.0`.
#[derive(Default)]
pub struct InputInterface {
    state: Mutex<InputInterfaceState>,
    notifier: Notifier,
}

impl InputInterface {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> InputInterfaceState {
        self.state.lock().clone()
    }

    pub fn apply(&self, update: &InputInterfaceUpdate) {
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let axes = [
                (&mut state.direction, update.direction),
                (&mut state.throttle, update.throttle),
                (&mut state.aux_x, update.aux_x),
                (&mut state.aux_y, update.aux_y),
            ];
            for (axis, value) in axes {
                if let Some(value) = value {
                    *axis = value.clamp(-1.0, 1.0);
                }
            }
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }
}

impl Subject for InputInterface {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        1
    }
    fn describe(&self) -> String {
        "input-interface".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_source_is_rejected_atomically() {
        let input = InputControl::new();
        let err = input
            .apply(&InputUpdate {
                axis_source: Some(InputSource::Web),
                led_source: Some(InputSource::Controller),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(input.snapshot().axis_source, InputSource::Manual);
    }

    #[test]
    fn source_selection_applies() {
        let input = InputControl::new();
        input
            .apply(&InputUpdate {
                kinematic_source: Some(InputSource::Rc),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(input.snapshot().kinematic_source, InputSource::Rc);
    }

    #[test]
    fn axes_are_clamped() {
        let web = InputInterface::new();
        web.apply(&InputInterfaceUpdate {
            throttle: Some(3.0),
            aux_y: Some(-0.25),
            ..Default::default()
        });
        let state = web.snapshot();
        assert_eq!(state.throttle, 1.0);
        assert_eq!(state.aux_y, -0.25);
        assert_eq!(state.direction, 0.0);
    }
}
