//! Change notification primitives shared by every robot-core object.
//!
//! A [`Notifier`] lives inside each [`Subject`].  Calling
//! [`Notifier::notify`] (from any thread) records the reason in every
//! connected [`Subscription`] and wakes whoever waits on it.  The wake is a
//! bare signal: the waiter re-reads the accumulated set, so a burst of
//! notifications between two reads collapses into one [`ReasonSet`].
//!
//! Subscriptions can observe several subjects at once.  A subject chained
//! onto an existing subscription with an `offset` reports its reasons
//! shifted by that offset, so each subject owns a disjoint integer range of
//! the result set:
//!
//! ```
//! use rover_hal::motor::{Motor, Servo};
//! use rover_hal::notify::Subject;
//!
//! let motor = Motor::new(0);
//! let sub = motor.subscribe(None);
//! motor.servo().attach(&sub, 1000, None).unwrap();
//!
//! motor.servo().set_enabled(true);
//! let reasons = sub.read().unwrap();
//! assert!(reasons.contains(1000 + Servo::NOTIFY_DEFAULT));
//! ```

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rover_types::{GatewayError, Reason, ReasonSet};
use tokio::sync::Notify;
use tracing::{trace, warn};

// ────────────────────────────────────────────────────────────────────────────
// Subject
// ────────────────────────────────────────────────────────────────────────────

/// A stateful robot-core object that can be subscribed to.
pub trait Subject: Send + Sync {
    /// The notifier raising this subject's reasons.
    fn notifier(&self) -> &Notifier;

    /// Number of reason codes this subject raises; its codes are
    /// `0..reason_span()`.
    fn reason_span(&self) -> Reason;

    /// Short label used in logs, e.g. `"motor[2]"`.
    fn describe(&self) -> String;

    /// Open a new subscription on this subject.
    ///
    /// `filter` restricts the recorded reasons; `Some(&[])` yields a
    /// subscription that never fires.
    fn subscribe(&self, filter: Option<&[Reason]>) -> Subscription {
        let sub = Subscription::new(self.describe());
        // A fresh subscription has no occupied range, linking at 0 cannot collide.
        if let Err(e) = sub.link(self.notifier(), 0, self.reason_span(), filter) {
            warn!(subject = %self.describe(), error = %e, "subscribe failed");
        }
        sub
    }

    /// Chain this subject onto `sub`, shifting every reason by `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ReasonRangeCollision`] when
    /// `offset..offset + reason_span()` overlaps a range already attached to
    /// `sub`.
    fn attach(
        &self,
        sub: &Subscription,
        offset: Reason,
        filter: Option<&[Reason]>,
    ) -> Result<(), GatewayError> {
        sub.link(self.notifier(), offset, self.reason_span(), filter)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inbox (shared between the notifier side and the subscription)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Pending {
    reasons: ReasonSet,
    fault: Option<String>,
}

struct Inbox {
    pending: Mutex<Pending>,
    ready: Notify,
}

impl Inbox {
    fn push(&self, reason: Reason) {
        self.pending.lock().reasons.insert(reason);
        self.ready.notify_one();
    }

    fn poison(&self, details: &str) {
        self.pending
            .lock()
            .fault
            .get_or_insert_with(|| details.to_string());
        self.ready.notify_one();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Notifier
// ────────────────────────────────────────────────────────────────────────────

struct Slot {
    inbox: Weak<Inbox>,
    offset: Reason,
    filter: Option<BTreeSet<Reason>>,
}

impl Slot {
    fn accepts(&self, reason: Reason) -> bool {
        self.filter.as_ref().is_none_or(|f| f.contains(&reason))
    }
}

#[derive(Default)]
struct SlotTable {
    next_id: u64,
    slots: Vec<(u64, Slot)>,
}

impl SlotTable {
    fn insert(&mut self, slot: Slot) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push((id, slot));
        id
    }

    fn remove(&mut self, id: u64) {
        self.slots.retain(|(slot_id, _)| *slot_id != id);
    }
}

/// Fan-out point for one subject's reasons.
#[derive(Default)]
pub struct Notifier {
    table: Arc<Mutex<SlotTable>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason` in every connected subscription whose filter accepts
    /// it.  Safe to call from any thread; never blocks on the reader.
    pub fn notify(&self, reason: Reason) {
        let targets: Vec<(Arc<Inbox>, Reason)> = {
            let mut table = self.table.lock();
            table.slots.retain(|(_, slot)| slot.inbox.strong_count() > 0);
            table
                .slots
                .iter()
                .filter(|(_, slot)| slot.accepts(reason))
                .filter_map(|(_, slot)| {
                    slot.inbox
                        .upgrade()
                        .map(|inbox| (inbox, slot.offset.saturating_add(reason)))
                })
                .collect()
        };
        for (inbox, shifted) in targets {
            inbox.push(shifted);
        }
    }

    /// Poison every connected subscription: their next read fails with
    /// [`GatewayError::SubscriptionRead`].  Models a native read failure.
    pub fn fail_subscribers(&self, details: &str) {
        let inboxes: Vec<Arc<Inbox>> = self
            .table
            .lock()
            .slots
            .iter()
            .filter_map(|(_, slot)| slot.inbox.upgrade())
            .collect();
        for inbox in inboxes {
            inbox.poison(details);
        }
    }

    /// Number of live connections to this notifier.
    pub fn subscriber_count(&self) -> usize {
        self.table
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| slot.inbox.strong_count() > 0)
            .count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Subscription
// ────────────────────────────────────────────────────────────────────────────

struct Link {
    table: Weak<Mutex<SlotTable>>,
    slot: u64,
    range: Range<Reason>,
}

/// Accumulates reasons from one or more subjects until read.
///
/// Dropping a subscription disconnects it.
pub struct Subscription {
    label: String,
    inbox: Arc<Inbox>,
    links: Mutex<Vec<Link>>,
}

impl Subscription {
    fn new(label: String) -> Self {
        Self {
            label,
            inbox: Arc::new(Inbox {
                pending: Mutex::new(Pending::default()),
                ready: Notify::new(),
            }),
            links: Mutex::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drain the reasons accumulated since the previous read.  Never blocks;
    /// returns an empty set when nothing happened.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SubscriptionRead`] once the subscription has
    /// been poisoned.  The fault is sticky.
    pub fn read(&self) -> Result<ReasonSet, GatewayError> {
        let mut pending = self.inbox.pending.lock();
        if let Some(details) = &pending.fault {
            return Err(GatewayError::SubscriptionRead {
                subscription: self.label.clone(),
                details: details.clone(),
            });
        }
        let reasons = std::mem::take(&mut pending.reasons);
        trace!(subscription = %self.label, %reasons, "read");
        Ok(reasons)
    }

    /// Wait up to `timeout` for something to read, then read.
    pub async fn read_timeout(&self, timeout: Duration) -> Result<ReasonSet, GatewayError> {
        if !self.has_pending() {
            let _ = tokio::time::timeout(timeout, self.readiness()).await;
        }
        self.read()
    }

    /// Resolves once the subscription has been signalled since the last
    /// time this future completed.  A signal raised while nobody waits is
    /// kept, so no wake-up is lost between a read and the next wait.
    ///
    /// Cancel-safe: dropping the future deregisters the waiter.
    pub async fn readiness(&self) {
        self.inbox.ready.notified().await;
    }

    /// `true` when a read would return reasons or a fault.
    pub fn has_pending(&self) -> bool {
        let pending = self.inbox.pending.lock();
        !pending.reasons.is_empty() || pending.fault.is_some()
    }

    /// `true` while at least one subject is connected.
    pub fn is_subscribed(&self) -> bool {
        !self.links.lock().is_empty()
    }

    /// Disconnect from every subject.  Idempotent; returns `true` when this
    /// call actually disconnected something.
    pub fn unsubscribe(&self) -> bool {
        let links = std::mem::take(&mut *self.links.lock());
        for link in &links {
            if let Some(table) = link.table.upgrade() {
                table.lock().remove(link.slot);
            }
        }
        !links.is_empty()
    }

    fn link(
        &self,
        notifier: &Notifier,
        offset: Reason,
        span: Reason,
        filter: Option<&[Reason]>,
    ) -> Result<(), GatewayError> {
        let range = offset..offset.saturating_add(span);
        let mut links = self.links.lock();
        if let Some(existing) = links
            .iter()
            .find(|l| l.range.start < range.end && range.start < l.range.end)
        {
            return Err(GatewayError::ReasonRangeCollision {
                offset,
                span,
                existing: existing.range.clone(),
            });
        }
        let filter = match filter {
            Some([]) => return Ok(()),
            Some(reasons) => Some(reasons.iter().copied().collect()),
            None => None,
        };
        let slot = notifier.table.lock().insert(Slot {
            inbox: Arc::downgrade(&self.inbox),
            offset,
            filter,
        });
        links.push(Link {
            table: Arc::downgrade(&notifier.table),
            slot,
            range,
        });
        Ok(())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("label", &self.label)
            .field("links", &self.links.lock().len())
            .finish()
    }
}
