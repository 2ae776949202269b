//! Every namespace of one process behind a single session hub.
//!
//! One transport connection is one session in every namespace: [`Gateway::connect`]
//! starts it everywhere; [`Gateway::disconnect`] releases every interest it
//! still holds.

use std::collections::BTreeMap;
use std::sync::Arc;

use rover_hal::Robot;
use rover_types::SessionId;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::namespaces::{self, GracePeriods};
use crate::protocol::{ClientEvent, ClientFrame, ServerFrame};
use crate::registry::WatchRegistry;
use crate::rooms::RoomHub;

pub struct Gateway {
    hub: Arc<RoomHub>,
    registries: BTreeMap<String, WatchRegistry>,
}

impl Gateway {
    pub fn new(hub: Arc<RoomHub>, registries: Vec<WatchRegistry>) -> Self {
        let registries = registries
            .into_iter()
            .map(|r| (r.namespace().to_string(), r))
            .collect();
        Self { hub, registries }
    }

    /// All namespaces for `robot` on a fresh hub.
    pub fn for_robot(robot: &Robot, grace: &GracePeriods) -> Self {
        let hub = Arc::new(RoomHub::default());
        let registries = namespaces::all(robot, hub.clone(), grace);
        Self::new(hub, registries)
    }

    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    pub fn namespace(&self, name: &str) -> Option<&WatchRegistry> {
        self.registries.get(name)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.registries.keys().map(String::as_str)
    }

    /// Open a session; the receiver yields its outbound text frames.
    pub async fn connect(&self) -> (SessionId, mpsc::Receiver<String>) {
        let (session, rx) = self.hub.connect();
        for registry in self.registries.values() {
            registry.on_session_start(session).await;
        }
        (session, rx)
    }

    pub async fn disconnect(&self, session: SessionId) {
        for registry in self.registries.values() {
            registry.on_session_end(session).await;
        }
        self.hub.disconnect(session);
    }

    /// Apply one client request.  Returns the ack to send back, if the
    /// request asked for one.
    pub async fn dispatch(&self, session: SessionId, frame: ClientFrame) -> Option<ServerFrame> {
        let data = match self.registries.get(&frame.namespace) {
            None => {
                debug!(%session, namespace = %frame.namespace, "unknown namespace");
                Value::Null
            }
            Some(registry) => match frame.event {
                ClientEvent::AddWatch => registry
                    .add_watch(session, &frame.name)
                    .await
                    .unwrap_or(Value::Null),
                ClientEvent::RemoveWatch => {
                    registry.remove_watch(session, &frame.name).await;
                    Value::Null
                }
            },
        };
        frame.ack.map(|ack| ServerFrame::Ack { ack, data })
    }

    /// Parse, dispatch and encode.  Malformed frames are dropped.
    pub async fn handle_text(&self, session: SessionId, text: &str) -> Option<String> {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(%session, error = %e, "ignoring malformed frame");
                return None;
            }
        };
        let ack = self.dispatch(session, frame).await?;
        match ack.to_text() {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(%session, error = %e, "failed to encode ack");
                None
            }
        }
    }

    /// Force every watch of every namespace dormant.
    pub async fn shutdown(&self) {
        for registry in self.registries.values() {
            registry.shutdown().await;
        }
        info!(namespaces = self.registries.len(), "gateway shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::{LEDS, MOTORS};
    use rover_types::update::LedUpdate;
    use serde_json::json;
    use std::time::Duration;

    fn quiet() -> GracePeriods {
        GracePeriods {
            motor: Duration::ZERO,
            led_output: Duration::ZERO,
            rc: Duration::ZERO,
            rc_channels: Duration::ZERO,
            telemetry: Duration::ZERO,
            system: Duration::ZERO,
        }
    }

    fn add(namespace: &str, name: &str, ack: u64) -> String {
        json!({"namespace": namespace, "event": "add-watch", "name": name, "ack": ack}).to_string()
    }

    async fn next_event(rx: &mut mpsc::Receiver<String>) -> Value {
        let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event expected")
            .expect("channel open");
        match ServerFrame::parse(&text).unwrap() {
            ServerFrame::Event { data, .. } => data,
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn motor_burst_yields_one_final_state_emit() {
        let robot = Robot::simulated(1);
        let gateway = Gateway::for_robot(&robot, &quiet());
        let (x, mut rx) = gateway.connect().await;

        let ack = gateway.handle_text(x, &add(MOTORS, "update_motor_0", 1)).await.unwrap();
        let ServerFrame::Ack { ack, data } = ServerFrame::parse(&ack).unwrap() else {
            panic!("ack expected");
        };
        assert_eq!(ack, 1);
        assert_eq!(data["enabled"], false);

        let motor = &robot.motors()[0];
        motor.set_enabled(true);
        motor.set_duty(0.5);

        let data = next_event(&mut rx).await;
        assert_eq!(data["enabled"], true);
        assert_eq!(data["duty"], 0.5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "one coalesced emit only");

        gateway.disconnect(x).await;
        let watch = gateway.namespace(MOTORS).unwrap().watch("update_motor_0").unwrap();
        assert!(!watch.is_running());
        motor.set_duty(0.1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "dormant watch must not emit");
    }

    #[tokio::test]
    async fn shared_led_watch_survives_first_leave() {
        let robot = Robot::simulated(0);
        let gateway = Gateway::for_robot(&robot, &quiet());
        let (a, _rx_a) = gateway.connect().await;
        let (b, mut rx_b) = gateway.connect().await;

        gateway.handle_text(a, &add(LEDS, "update", 1)).await;
        gateway.handle_text(b, &add(LEDS, "update", 2)).await;
        let watch = gateway.namespace(LEDS).unwrap().watch("update").unwrap();
        assert_eq!(watch.interest(), 2);

        let remove = json!({"namespace": LEDS, "event": "remove-watch", "name": "update"});
        assert!(gateway.handle_text(a, &remove.to_string()).await.is_none());
        assert_eq!(watch.interest(), 1);
        assert!(watch.is_running());

        robot.leds().apply(&LedUpdate {
            brightness: Some(0.5),
            ..Default::default()
        });
        assert_eq!(next_event(&mut rx_b).await["brightness"], 0.5);

        gateway.disconnect(b).await;
        assert_eq!(watch.interest(), 0);
        assert!(!watch.is_running());
    }

    #[tokio::test]
    async fn unknown_namespace_acks_null_and_garbage_is_ignored() {
        let gateway = Gateway::for_robot(&Robot::simulated(0), &quiet());
        let (s, _rx) = gateway.connect().await;

        let ack = gateway.handle_text(s, &add("/nowhere", "update", 9)).await.unwrap();
        assert_eq!(
            ServerFrame::parse(&ack).unwrap(),
            ServerFrame::Ack {
                ack: 9,
                data: Value::Null
            }
        );
        assert!(gateway.handle_text(s, "not json").await.is_none());
        assert!(gateway.handle_text(s, r#"{"namespace":"/leds"}"#).await.is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_all_namespaces() {
        let robot = Robot::simulated(2);
        let gateway = Gateway::for_robot(&robot, &quiet());
        let (s, _rx) = gateway.connect().await;
        gateway.handle_text(s, &add(MOTORS, "update_motor_1", 1)).await;
        gateway.handle_text(s, &add("/system", "update", 2)).await;

        gateway.shutdown().await;
        for ns in gateway.namespaces() {
            let registry = gateway.namespace(ns).unwrap();
            for name in registry.watch_names() {
                assert!(!registry.watch(name).unwrap().is_running(), "{ns}{name}");
            }
        }
    }
}
