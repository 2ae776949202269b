//! Room-based broadcast between watches and connected sessions.
//!
//! A room is identified by `(namespace, room)`; a watch broadcasts to the
//! room named after itself.  [`RoomHub`] is the production implementation:
//! each session owns a bounded outbound queue drained by its transport
//! task.  A full queue drops the frame for that session only, so one slow
//! client never stalls a watch.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rover_types::SessionId;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::ServerFrame;

/// Default per-session outbound queue length.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// What a watch needs from the broadcast layer.
pub trait Rooms: Send + Sync {
    fn join(&self, session: SessionId, namespace: &str, room: &str);
    fn leave(&self, session: SessionId, namespace: &str, room: &str);
    /// Push `event` with `data` to every member of the room.  Returns the
    /// number of sessions the frame was queued for.
    fn emit(&self, namespace: &str, room: &str, event: &str, data: &Value) -> usize;
}

type RoomKey = (String, String);

#[derive(Default)]
struct HubState {
    peers: HashMap<SessionId, mpsc::Sender<String>>,
    rooms: HashMap<RoomKey, HashSet<SessionId>>,
}

/// Session registry plus room membership.
pub struct RoomHub {
    capacity: usize,
    state: Mutex<HubState>,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl RoomHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(HubState::default()),
        }
    }

    /// Register a new session.  The receiver yields every text frame
    /// destined for it.
    pub fn connect(&self) -> (SessionId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let session = Uuid::new_v4();
        self.state.lock().peers.insert(session, tx);
        debug!(%session, "session connected");
        (session, rx)
    }

    /// Forget `session` and every room membership it still holds.
    pub fn disconnect(&self, session: SessionId) {
        let mut state = self.state.lock();
        state.peers.remove(&session);
        state.rooms.retain(|_, members| {
            members.remove(&session);
            !members.is_empty()
        });
        debug!(%session, "session disconnected");
    }

    /// Queue a frame for one session.  Returns `false` when the session is
    /// gone or its queue is full.
    pub fn send(&self, session: SessionId, frame: String) -> bool {
        let sender = self.state.lock().peers.get(&session).cloned();
        match sender {
            Some(sender) => deliver(&sender, session, frame),
            None => false,
        }
    }

    pub fn room_size(&self, namespace: &str, room: &str) -> usize {
        self.state
            .lock()
            .rooms
            .get(&(namespace.to_string(), room.to_string()))
            .map_or(0, HashSet::len)
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().peers.len()
    }
}

fn deliver(sender: &mpsc::Sender<String>, session: SessionId, frame: String) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(%session, "outbound queue full, dropping frame");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

impl Rooms for RoomHub {
    fn join(&self, session: SessionId, namespace: &str, room: &str) {
        let mut state = self.state.lock();
        if !state.peers.contains_key(&session) {
            return;
        }
        state
            .rooms
            .entry((namespace.to_string(), room.to_string()))
            .or_default()
            .insert(session);
    }

    fn leave(&self, session: SessionId, namespace: &str, room: &str) {
        let mut state = self.state.lock();
        let key = (namespace.to_string(), room.to_string());
        if let Some(members) = state.rooms.get_mut(&key) {
            members.remove(&session);
            if members.is_empty() {
                state.rooms.remove(&key);
            }
        }
    }

    fn emit(&self, namespace: &str, room: &str, event: &str, data: &Value) -> usize {
        let targets: Vec<(SessionId, mpsc::Sender<String>)> = {
            let state = self.state.lock();
            let Some(members) = state.rooms.get(&(namespace.to_string(), room.to_string()))
            else {
                return 0;
            };
            members
                .iter()
                .filter_map(|id| state.peers.get(id).map(|tx| (*id, tx.clone())))
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }
        let frame = ServerFrame::Event {
            namespace: namespace.to_string(),
            event: event.to_string(),
            data: data.clone(),
        };
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(namespace, event, error = %e, "failed to encode event");
                return 0;
            }
        };
        targets
            .iter()
            .filter(|(session, sender)| deliver(sender, *session, text.clone()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn emit_reaches_room_members_only() {
        let hub = RoomHub::default();
        let (a, mut rx_a) = hub.connect();
        let (_b, mut rx_b) = hub.connect();
        hub.join(a, "/leds", "update");

        let delivered = hub.emit("/leds", "update", "update", &json!({"brightness": 1.0}));
        assert_eq!(delivered, 1);

        let frame = ServerFrame::parse(&rx_a.recv().await.unwrap()).unwrap();
        assert!(matches!(frame, ServerFrame::Event { ref event, .. } if event == "update"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let hub = RoomHub::new(1);
        let (a, _rx) = hub.connect();
        hub.join(a, "/motors", "update_motor_0");
        assert_eq!(hub.emit("/motors", "update_motor_0", "update_motor_0", &json!(1)), 1);
        assert_eq!(hub.emit("/motors", "update_motor_0", "update_motor_0", &json!(2)), 0);
    }

    #[test]
    fn disconnect_clears_memberships() {
        let hub = RoomHub::default();
        let (a, _rx) = hub.connect();
        hub.join(a, "/system", "update");
        hub.join(a, "/system", "power_update");
        assert_eq!(hub.room_size("/system", "update"), 1);

        hub.disconnect(a);
        assert_eq!(hub.room_size("/system", "update"), 0);
        assert_eq!(hub.session_count(), 0);
        assert!(!hub.send(a, "x".to_string()));
    }

    #[test]
    fn unknown_session_cannot_join() {
        let hub = RoomHub::default();
        hub.join(Uuid::new_v4(), "/leds", "update");
        assert_eq!(hub.room_size("/leds", "update"), 0);
    }
}
