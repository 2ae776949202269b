//! Per-namespace watch registry and session interest bookkeeping.
//!
//! Every interest change runs under one async mutex, so the 0→1 and 1→0
//! edges of a watch never interleave, including the awaited teardown of a
//! drain task.  A session's interest set is the single source of truth for
//! decrements: removing a name it does not hold is a no-op, which makes
//! explicit `remove-watch` racing a disconnect harmless.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rover_types::SessionId;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::rooms::Rooms;
use crate::watch::{Watch, WatchSource};

#[derive(Default)]
struct Sessions {
    interest: HashMap<SessionId, HashSet<String>>,
    closed: bool,
}

pub struct WatchRegistry {
    namespace: String,
    rooms: Arc<dyn Rooms>,
    watches: BTreeMap<String, Arc<Watch>>,
    sessions: Mutex<Sessions>,
}

impl WatchRegistry {
    pub fn new(namespace: impl Into<String>, rooms: Arc<dyn Rooms>) -> Self {
        Self {
            namespace: namespace.into(),
            rooms,
            watches: BTreeMap::new(),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Register a dormant watch.  A zero `grace` disables the post-emit
    /// sleep.  Re-using a name replaces the earlier watch.
    pub fn with_watch(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn WatchSource>,
        grace: Duration,
    ) -> Self {
        let name = name.into();
        let watch = Watch::new(&self.namespace, &name, source, Arc::clone(&self.rooms))
            .with_grace(grace);
        if self.watches.insert(name.clone(), Arc::new(watch)).is_some() {
            warn!(namespace = %self.namespace, watch = %name, "duplicate watch name replaced");
        }
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn watch(&self, name: &str) -> Option<&Arc<Watch>> {
        self.watches.get(name)
    }

    pub fn watch_names(&self) -> impl Iterator<Item = &str> {
        self.watches.keys().map(String::as_str)
    }

    /// Allocate an empty interest set for `session`.
    pub async fn on_session_start(&self, session: SessionId) {
        let mut sessions = self.sessions.lock().await;
        if sessions.closed {
            return;
        }
        sessions.interest.entry(session).or_default();
        debug!(namespace = %self.namespace, %session, "session started");
    }

    /// Register interest of `session` in `name` and return the current
    /// snapshot.  `None` for an unknown name, an unknown session or a
    /// registry that has been shut down.  A repeat for interest the session
    /// already holds is a no-op and also yields `None`.
    pub async fn add_watch(&self, session: SessionId, name: &str) -> Option<Value> {
        let watch = self.watches.get(name)?;
        let mut sessions = self.sessions.lock().await;
        if sessions.closed {
            return None;
        }
        let Some(held) = sessions.interest.get_mut(&session) else {
            warn!(namespace = %self.namespace, %session, watch = %name, "add-watch from unknown session");
            return None;
        };
        if !held.insert(name.to_string()) {
            debug!(namespace = %self.namespace, %session, watch = %name, "watch already held");
            return None;
        }
        self.rooms.join(session, &self.namespace, name);
        watch.increment();
        debug!(namespace = %self.namespace, %session, watch = %name, interest = watch.interest(), "watch added");
        Some(watch.data())
    }

    /// Drop interest of `session` in `name`.  Silent no-op when the name
    /// is unknown or not held.
    pub async fn remove_watch(&self, session: SessionId, name: &str) {
        let Some(watch) = self.watches.get(name) else {
            return;
        };
        let mut sessions = self.sessions.lock().await;
        let held = sessions
            .interest
            .get_mut(&session)
            .is_some_and(|held| held.remove(name));
        if held {
            self.rooms.leave(session, &self.namespace, name);
            watch.decrement().await;
            debug!(namespace = %self.namespace, %session, watch = %name, interest = watch.interest(), "watch removed");
        }
    }

    /// Release every interest still held by `session`, once each.
    pub async fn on_session_end(&self, session: SessionId) {
        let mut sessions = self.sessions.lock().await;
        let Some(held) = sessions.interest.remove(&session) else {
            return;
        };
        for name in held {
            if let Some(watch) = self.watches.get(&name) {
                self.rooms.leave(session, &self.namespace, &name);
                watch.decrement().await;
            }
        }
        debug!(namespace = %self.namespace, %session, "session ended");
    }

    /// Force every watch dormant and refuse further interest.
    pub async fn shutdown(&self) {
        let mut sessions = self.sessions.lock().await;
        sessions.closed = true;
        sessions.interest.clear();
        for watch in self.watches.values() {
            watch.force_stop().await;
        }
        info!(namespace = %self.namespace, watches = self.watches.len(), "registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::tests::ChannelRooms;
    use rover_hal::Subject;
    use rover_hal::led::LedControl;
    use rover_hal::motor::Motor;
    use rover_hal::Subscription;
    use rover_types::GatewayError;
    use serde_json::json;
    use uuid::Uuid;

    struct Leds(Arc<LedControl>);

    impl WatchSource for Leds {
        fn subscribe(&self) -> Result<Subscription, GatewayError> {
            Ok(self.0.subscribe(Some(&[LedControl::NOTIFY_DEFAULT])))
        }
        fn data(&self) -> Value {
            json!({"brightness": self.0.snapshot().brightness})
        }
    }

    struct Motors(Arc<Motor>);

    impl WatchSource for Motors {
        fn subscribe(&self) -> Result<Subscription, GatewayError> {
            Ok(self.0.subscribe(None))
        }
        fn data(&self) -> Value {
            json!({"enabled": self.0.snapshot().enabled})
        }
    }

    fn registry() -> WatchRegistry {
        let (rooms, _rx) = ChannelRooms::new();
        WatchRegistry::new("/test", rooms)
            .with_watch("a", Arc::new(Leds(Arc::new(LedControl::new()))), Duration::ZERO)
            .with_watch("b", Arc::new(Motors(Arc::new(Motor::new(0)))), Duration::ZERO)
            .with_watch("c", Arc::new(Motors(Arc::new(Motor::new(1)))), Duration::ZERO)
    }

    fn interest(registry: &WatchRegistry, name: &str) -> usize {
        registry.watch(name).unwrap().interest()
    }

    #[tokio::test]
    async fn repeated_add_counts_once() {
        let registry = registry();
        let s = Uuid::new_v4();
        registry.on_session_start(s).await;

        assert!(registry.add_watch(s, "a").await.is_some());
        assert!(registry.add_watch(s, "a").await.is_none(), "repeat yields no snapshot");
        assert_eq!(interest(&registry, "a"), 1);

        registry.remove_watch(s, "a").await;
        registry.remove_watch(s, "a").await;
        assert_eq!(interest(&registry, "a"), 0);
        assert!(!registry.watch("a").unwrap().is_running());
    }

    #[tokio::test]
    async fn unknown_names_and_sessions_are_ignored() {
        let registry = registry();
        let s = Uuid::new_v4();
        assert!(registry.add_watch(s, "a").await.is_none(), "session not started");

        registry.on_session_start(s).await;
        assert!(registry.add_watch(s, "nope").await.is_none());
        registry.remove_watch(s, "nope").await;
        registry.remove_watch(s, "b").await;
        assert_eq!(interest(&registry, "b"), 0);
    }

    #[tokio::test]
    async fn disconnect_decrements_each_held_watch_once() {
        let registry = registry();
        let s = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.on_session_start(s).await;
        registry.on_session_start(other).await;

        for name in ["a", "b", "c"] {
            registry.add_watch(s, name).await;
        }
        registry.add_watch(other, "c").await;
        assert_eq!(interest(&registry, "c"), 2);

        registry.on_session_end(s).await;
        assert_eq!(interest(&registry, "a"), 0);
        assert_eq!(interest(&registry, "b"), 0);
        assert_eq!(interest(&registry, "c"), 1);

        // Late remove-watch after disconnect must not decrement again.
        registry.remove_watch(s, "c").await;
        registry.on_session_end(s).await;
        assert_eq!(interest(&registry, "c"), 1);
        assert!(registry.watch("c").unwrap().is_running());
    }

    #[tokio::test]
    async fn two_clients_share_one_activation() {
        let registry = registry();
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        registry.on_session_start(x).await;
        registry.on_session_start(y).await;

        registry.add_watch(x, "a").await;
        registry.add_watch(y, "a").await;
        assert_eq!(interest(&registry, "a"), 2);

        registry.remove_watch(x, "a").await;
        assert!(registry.watch("a").unwrap().is_running());

        registry.on_session_end(y).await;
        assert!(!registry.watch("a").unwrap().is_running());
        assert_eq!(registry.watch("a").unwrap().stats().activations, 1);
        assert_eq!(registry.watch("a").unwrap().stats().unsubscribes, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_everything_and_closes() {
        let registry = registry();
        let s = Uuid::new_v4();
        registry.on_session_start(s).await;
        registry.add_watch(s, "a").await;
        registry.add_watch(s, "b").await;

        registry.shutdown().await;
        for name in ["a", "b", "c"] {
            assert!(!registry.watch(name).unwrap().is_running());
            assert_eq!(interest(&registry, name), 0);
        }
        assert!(registry.add_watch(s, "a").await.is_none());
        registry.on_session_end(s).await;
        assert_eq!(interest(&registry, "a"), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sessions_leave_watch_dormant() {
        let motor = Arc::new(Motor::new(0));
        let (rooms, _rx) = ChannelRooms::new();
        let source = Arc::new(Motors(Arc::clone(&motor)));
        let registry = Arc::new(WatchRegistry::new("/motors", rooms).with_watch("m", source, Duration::ZERO));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let storm = {
            let motor = Arc::clone(&motor);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut duty = 0.0;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    duty = if duty > 0.9 { 0.0 } else { duty + 0.01 };
                    motor.set_duty(duty);
                    std::thread::yield_now();
                }
            })
        };

        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let s = Uuid::new_v4();
                registry.on_session_start(s).await;
                for _ in 0..50 {
                    registry.add_watch(s, "m").await;
                    registry.add_watch(s, "m").await;
                    registry.remove_watch(s, "m").await;
                    tokio::task::yield_now().await;
                }
                registry.add_watch(s, "m").await;
                if i % 2 == 0 {
                    registry.on_session_end(s).await;
                } else {
                    registry.remove_watch(s, "m").await;
                    registry.on_session_end(s).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        storm.join().unwrap();

        let watch = registry.watch("m").unwrap();
        assert_eq!(watch.interest(), 0);
        assert!(!watch.is_running());
        assert_eq!(motor.notifier().subscriber_count(), 0);
        let stats = watch.stats();
        assert!(stats.activations >= 1);
        assert_eq!(stats.activations, stats.deactivations);
        assert_eq!(stats.activations, stats.unsubscribes);
        assert_eq!(stats.read_faults, 0);
    }
}
