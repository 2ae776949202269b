//! A named, reference-counted stream of snapshots from one or more
//! subjects.
//!
//! A [`Watch`] is either **dormant** (interest 0, no subscription, no task)
//! or **active** (interest ≥ 1, one subscription, one drain task).  Only the
//! 0→1 edge subscribes and spawns; only the 1→0 edge cancels, joins and
//! unsubscribes.
//!
//! The drain task loops on [`wait_for_reasons`], turns each non-empty
//! reason set into a payload built from *current* state and emits it to
//! the room named after the watch.  An optional grace period after each
//! emit bounds the outbound rate; changes arriving meanwhile coalesce into
//! the next read.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rover_hal::Subscription;
use rover_types::{GatewayError, ReasonSet};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::rooms::Rooms;
use crate::wait::wait_for_reasons;

/// Binds a watch to the subjects it observes.
pub trait WatchSource: Send + Sync + 'static {
    /// Open the watch's single subscription, chaining every secondary
    /// subject at its offset.
    fn subscribe(&self) -> Result<Subscription, GatewayError>;

    /// Full snapshot of current state.
    fn data(&self) -> Value;

    /// Payload for one coalesced read.  `None` skips the emit.
    fn payload(&self, _reasons: &ReasonSet) -> Option<Value> {
        Some(self.data())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Statistics
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct WatchStats {
    activations: AtomicU64,
    deactivations: AtomicU64,
    unsubscribes: AtomicU64,
    emits: AtomicU64,
    read_faults: AtomicU64,
}

/// Point-in-time copy of [`WatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub activations: u64,
    pub deactivations: u64,
    pub unsubscribes: u64,
    pub emits: u64,
    pub read_faults: u64,
}

impl WatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            activations: self.activations.load(Ordering::Relaxed),
            deactivations: self.deactivations.load(Ordering::Relaxed),
            unsubscribes: self.unsubscribes.load(Ordering::Relaxed),
            emits: self.emits.load(Ordering::Relaxed),
            read_faults: self.read_faults.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Watch
// ────────────────────────────────────────────────────────────────────────────

struct Activation {
    subscription: Arc<Subscription>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct WatchState {
    interest: usize,
    activation: Option<Activation>,
}

pub struct Watch {
    namespace: String,
    name: String,
    source: Arc<dyn WatchSource>,
    rooms: Arc<dyn Rooms>,
    grace: Option<Duration>,
    state: Mutex<WatchState>,
    stats: Arc<WatchStats>,
}

impl Watch {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        source: Arc<dyn WatchSource>,
        rooms: Arc<dyn Rooms>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            source,
            rooms,
            grace: None,
            state: Mutex::new(WatchState::default()),
            stats: Arc::new(WatchStats::default()),
        }
    }

    /// Sleep for `grace` after every emit.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = (!grace.is_zero()).then_some(grace);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn interest(&self) -> usize {
        self.state.lock().interest
    }

    /// `true` while a drain task is alive.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .activation
            .as_ref()
            .is_some_and(|a| !a.task.is_finished())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Fresh snapshot for initial client sync.
    pub fn data(&self) -> Value {
        self.source.data()
    }

    /// Add one unit of interest; the first one subscribes and spawns the
    /// drain task.  Must be called from within a Tokio runtime.
    pub fn increment(&self) {
        let mut state = self.state.lock();
        state.interest += 1;
        if state.interest > 1 {
            if !state.activation.as_ref().is_some_and(|a| !a.task.is_finished()) {
                warn!(
                    namespace = %self.namespace,
                    watch = %self.name,
                    interest = state.interest,
                    "watch faulted, waiting for interest to drain"
                );
            }
            return;
        }
        info!(namespace = %self.namespace, watch = %self.name, "first watch, activating");
        match self.source.subscribe() {
            Ok(subscription) => {
                let subscription = Arc::new(subscription);
                let cancel = CancellationToken::new();
                let task = tokio::spawn(drain(DrainContext {
                    namespace: self.namespace.clone(),
                    name: self.name.clone(),
                    source: Arc::clone(&self.source),
                    rooms: Arc::clone(&self.rooms),
                    grace: self.grace,
                    subscription: Arc::clone(&subscription),
                    cancel: cancel.clone(),
                    stats: Arc::clone(&self.stats),
                }));
                state.activation = Some(Activation {
                    subscription,
                    cancel,
                    task,
                });
                WatchStats::bump(&self.stats.activations);
            }
            Err(e) => {
                error!(namespace = %self.namespace, watch = %self.name, error = %e, "subscribe failed");
                WatchStats::bump(&self.stats.read_faults);
            }
        }
    }

    /// Remove one unit of interest; the last one cancels the drain task,
    /// waits for it and unsubscribes.  Decrementing a dormant watch is
    /// logged and ignored.
    pub async fn decrement(&self) {
        let activation = {
            let mut state = self.state.lock();
            if state.interest == 0 {
                warn!(namespace = %self.namespace, watch = %self.name, "decrement on dormant watch ignored");
                return;
            }
            state.interest -= 1;
            if state.interest > 0 {
                return;
            }
            state.activation.take()
        };
        info!(namespace = %self.namespace, watch = %self.name, "no more watches, stopping");
        self.deactivate(activation).await;
    }

    /// Stop unconditionally, whatever the recorded interest.
    pub async fn force_stop(&self) {
        let activation = {
            let mut state = self.state.lock();
            state.interest = 0;
            state.activation.take()
        };
        if activation.is_some() {
            debug!(namespace = %self.namespace, watch = %self.name, "force stop");
        }
        self.deactivate(activation).await;
    }

    async fn deactivate(&self, activation: Option<Activation>) {
        let Some(activation) = activation else {
            return;
        };
        activation.cancel.cancel();
        if let Err(e) = activation.task.await {
            error!(namespace = %self.namespace, watch = %self.name, error = %e, "drain task ended abnormally");
        }
        if activation.subscription.unsubscribe() {
            WatchStats::bump(&self.stats.unsubscribes);
        }
        WatchStats::bump(&self.stats.deactivations);
        let stats = self.stats.snapshot();
        info!(
            namespace = %self.namespace,
            watch = %self.name,
            activations = stats.activations,
            emits = stats.emits,
            read_faults = stats.read_faults,
            "watch dormant"
        );
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Watch")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("interest", &state.interest)
            .field("active", &state.activation.is_some())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Drain task
// ────────────────────────────────────────────────────────────────────────────

struct DrainContext {
    namespace: String,
    name: String,
    source: Arc<dyn WatchSource>,
    rooms: Arc<dyn Rooms>,
    grace: Option<Duration>,
    subscription: Arc<Subscription>,
    cancel: CancellationToken,
    stats: Arc<WatchStats>,
}

async fn drain(ctx: DrainContext) {
    loop {
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            result = wait_for_reasons(&ctx.subscription) => result,
        };
        let reasons = match result {
            Ok(reasons) => reasons,
            Err(e) => {
                error!(namespace = %ctx.namespace, watch = %ctx.name, error = %e, "subscription read failed, stopping watch");
                WatchStats::bump(&ctx.stats.read_faults);
                if ctx.subscription.unsubscribe() {
                    WatchStats::bump(&ctx.stats.unsubscribes);
                }
                break;
            }
        };
        if reasons.is_empty() {
            continue;
        }
        trace!(namespace = %ctx.namespace, watch = %ctx.name, %reasons, "reasons");
        if let Some(payload) = ctx.source.payload(&reasons) {
            let delivered = ctx.rooms.emit(&ctx.namespace, &ctx.name, &ctx.name, &payload);
            WatchStats::bump(&ctx.stats.emits);
            trace!(namespace = %ctx.namespace, watch = %ctx.name, delivered, "emitted");
        }
        if let Some(grace) = ctx.grace {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                _ = tokio::time::sleep(grace) => {}
            }
        }
    }
    debug!(namespace = %ctx.namespace, watch = %ctx.name, "drain task exited");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rover_hal::Subject;
    use rover_hal::motor::Motor;
    use rover_types::SessionId;
    use serde_json::json;
    use tokio::sync::mpsc;

    /// Forwards every emit into a channel; membership is ignored.
    pub(crate) struct ChannelRooms {
        tx: mpsc::UnboundedSender<(String, String, Value)>,
    }

    impl ChannelRooms {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, String, Value)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { tx }), rx)
        }
    }

    impl Rooms for ChannelRooms {
        fn join(&self, _: SessionId, _: &str, _: &str) {}
        fn leave(&self, _: SessionId, _: &str, _: &str) {}
        fn emit(&self, namespace: &str, room: &str, _event: &str, data: &Value) -> usize {
            let _ = self
                .tx
                .send((namespace.to_string(), room.to_string(), data.clone()));
            1
        }
    }

    struct MotorProbe(Arc<Motor>);

    impl WatchSource for MotorProbe {
        fn subscribe(&self) -> Result<Subscription, GatewayError> {
            Ok(self.0.subscribe(None))
        }
        fn data(&self) -> Value {
            let state = self.0.snapshot();
            json!({"enabled": state.enabled, "duty": state.duty})
        }
    }

    fn motor_watch(grace: Duration) -> (Arc<Motor>, Watch, mpsc::UnboundedReceiver<(String, String, Value)>) {
        let motor = Arc::new(Motor::new(0));
        let (rooms, rx) = ChannelRooms::new();
        let watch = Watch::new("/motors", "update_motor_0", Arc::new(MotorProbe(Arc::clone(&motor))), rooms)
            .with_grace(grace);
        (motor, watch, rx)
    }

    #[tokio::test]
    async fn interest_edges_drive_activation() {
        let (motor, watch, _rx) = motor_watch(Duration::ZERO);
        assert!(!watch.is_running());

        watch.increment();
        watch.increment();
        assert!(watch.is_running());
        assert_eq!(motor.notifier().subscriber_count(), 1);

        watch.decrement().await;
        assert!(watch.is_running());
        watch.decrement().await;
        assert!(!watch.is_running());
        assert_eq!(motor.notifier().subscriber_count(), 0);

        let stats = watch.stats();
        assert_eq!(stats.activations, 1);
        assert_eq!(stats.deactivations, 1);
        assert_eq!(stats.unsubscribes, 1);
    }

    #[tokio::test]
    async fn underflow_is_clamped() {
        let (_motor, watch, _rx) = motor_watch(Duration::ZERO);
        watch.decrement().await;
        assert_eq!(watch.interest(), 0);

        watch.increment();
        assert!(watch.is_running(), "0→1 edge still detected after underflow");
        watch.decrement().await;
        assert!(!watch.is_running());
    }

    #[tokio::test]
    async fn reactivation_subscribes_again() {
        let (motor, watch, mut rx) = motor_watch(Duration::ZERO);
        for _ in 0..3 {
            watch.increment();
            watch.decrement().await;
        }
        assert_eq!(watch.stats().activations, 3);
        assert_eq!(watch.stats().unsubscribes, 3);

        watch.increment();
        motor.set_enabled(true);
        let (_, room, data) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(room, "update_motor_0");
        assert_eq!(data["enabled"], true);
        watch.force_stop().await;
    }

    #[tokio::test]
    async fn grace_period_coalesces_burst() {
        let (motor, watch, mut rx) = motor_watch(Duration::from_millis(100));
        watch.increment();

        motor.set_duty(0.1);
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!((first.2["duty"].as_f64().unwrap() - 0.1).abs() < 1e-6);

        // Lands inside the grace period of the first emit.
        motor.set_enabled(true);
        motor.set_duty(0.5);
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second.2["enabled"], true);
        assert!((second.2["duty"].as_f64().unwrap() - 0.5).abs() < 1e-6);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err(), "burst must collapse into one emit");
        watch.force_stop().await;
    }

    #[tokio::test]
    async fn cancel_while_waiting_completes() {
        let (motor, watch, _rx) = motor_watch(Duration::ZERO);
        watch.increment();
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(2), watch.decrement())
            .await
            .expect("decrement must not hang");
        assert_eq!(motor.notifier().subscriber_count(), 0);
        assert_eq!(watch.stats().unsubscribes, 1);
    }

    #[tokio::test]
    async fn cancel_during_grace_sleep_completes() {
        let (motor, watch, mut rx) = motor_watch(Duration::from_secs(3600));
        watch.increment();
        motor.set_enabled(true);
        let _ = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), watch.force_stop())
            .await
            .expect("force stop must interrupt the grace sleep");
        assert!(!watch.is_running());
    }

    #[tokio::test]
    async fn read_fault_stops_only_the_activation() {
        let (motor, watch, mut rx) = motor_watch(Duration::ZERO);
        watch.increment();
        motor.notifier().fail_subscribers("handle closed");

        for _ in 0..100 {
            if !watch.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!watch.is_running());
        assert_eq!(watch.interest(), 1);
        assert_eq!(watch.stats().read_faults, 1);
        assert_eq!(motor.notifier().subscriber_count(), 0);

        // The next genuine 0→1 edge starts cleanly.
        watch.decrement().await;
        assert_eq!(watch.stats().unsubscribes, 1, "no second unsubscribe");
        watch.increment();
        motor.set_enabled(true);
        let emitted = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(emitted.is_some());
        watch.force_stop().await;
    }

    #[tokio::test]
    async fn faulted_watch_stays_down_until_interest_drains() {
        let (motor, watch, _rx) = motor_watch(Duration::ZERO);
        watch.increment();
        motor.notifier().fail_subscribers("handle closed");
        for _ in 0..100 {
            if !watch.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!watch.is_running());

        watch.increment();
        assert_eq!(watch.interest(), 2);
        assert!(!watch.is_running(), "no restart while interest is held");
        assert_eq!(watch.stats().activations, 1);
        assert_eq!(motor.notifier().subscriber_count(), 0);

        watch.decrement().await;
        watch.decrement().await;
        assert_eq!(watch.interest(), 0);
        watch.increment();
        assert!(watch.is_running());
        assert_eq!(watch.stats().activations, 2);
        watch.force_stop().await;
    }

    #[tokio::test]
    async fn data_reflects_call_time_state() {
        let (motor, watch, _rx) = motor_watch(Duration::ZERO);
        assert_eq!(watch.data()["enabled"], false);
        motor.set_enabled(true);
        assert_eq!(watch.data()["enabled"], true);
    }
}
