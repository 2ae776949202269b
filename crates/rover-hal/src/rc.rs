//! Radio-control receiver.

use parking_lot::Mutex;
use rover_types::state::RcState;
use rover_types::update::RcUpdate;
use rover_types::{NOTIFY_DEFAULT, Reason};

use crate::notify::{Notifier, Subject};

/// Number of decoded channels.
pub const CHANNEL_COUNT: usize = 8;
/// Neutral stick position in microseconds.
pub const CHANNEL_CENTRE: u16 = 1500;

struct RcInner {
    state: RcState,
    channels: Vec<u16>,
}

pub struct RcReceiver {
    inner: Mutex<RcInner>,
    notifier: Notifier,
}

impl Default for RcReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl RcReceiver {
    pub const NOTIFY_DEFAULT: Reason = NOTIFY_DEFAULT;
    pub const NOTIFY_CHANNELS: Reason = 1;

    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RcInner {
                state: RcState::default(),
                channels: vec![CHANNEL_CENTRE; CHANNEL_COUNT],
            }),
            notifier: Notifier::new(),
        }
    }

    pub fn snapshot(&self) -> RcState {
        self.inner.lock().state.clone()
    }

    pub fn channels(&self) -> Vec<u16> {
        self.inner.lock().channels.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        {
            let mut inner = self.inner.lock();
            inner.state.enabled = enabled;
            if !enabled {
                inner.state.connected = false;
                inner.state.rssi = 0;
            }
        }
        self.notifier.notify(Self::NOTIFY_DEFAULT);
    }

    pub fn apply(&self, update: &RcUpdate) {
        if let Some(enabled) = update.enabled {
            self.set_enabled(enabled);
        }
    }

    /// Report link quality.  Raises the default reason only when the
    /// connection status or RSSI changed.
    pub(crate) fn set_link(&self, connected: bool, rssi: i32) {
        let changed = {
            let mut inner = self.inner.lock();
            if !inner.state.enabled {
                return;
            }
            let changed = inner.state.connected != connected || inner.state.rssi != rssi;
            inner.state.connected = connected;
            inner.state.rssi = rssi;
            changed
        };
        if changed {
            self.notifier.notify(Self::NOTIFY_DEFAULT);
        }
    }

    /// Store a decoded frame.  Ignored while disabled or disconnected.
    pub(crate) fn set_channels(&self, channels: &[u16]) {
        {
            let mut inner = self.inner.lock();
            if !inner.state.enabled || !inner.state.connected {
                return;
            }
            for (slot, value) in inner.channels.iter_mut().zip(channels) {
                *slot = *value;
            }
        }
        self.notifier.notify(Self::NOTIFY_CHANNELS);
    }
}

impl Subject for RcReceiver {
    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
    fn reason_span(&self) -> Reason {
        2
    }
    fn describe(&self) -> String {
        "rcreceiver".to_string()
    }
}
