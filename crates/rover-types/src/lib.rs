//! `rover-types` – shared vocabulary of the rover gateway.
//!
//! - [`Reason`] / [`ReasonSet`] – change-notification codes delivered by a
//!   subscription.
//! - [`SessionId`] – identity of one connected socket client.
//! - [`GatewayError`] – the single error type used across the workspace.
//! - [`state`] – serialisable snapshots of robot-core objects.
//! - [`update`] – typed partial updates accepted by the HTTP surface.

use std::collections::BTreeSet;
use std::ops::Range;

use thiserror::Error;
use uuid::Uuid;

pub mod state;
pub mod update;

/// A small integer identifying the kind of change that happened on a
/// subject.  Chained subjects report their reasons shifted by an offset.
pub type Reason = u32;

/// Reason raised by every subject on a configuration/state change.
pub const NOTIFY_DEFAULT: Reason = 0;

/// Identity of one connected client; shared by every namespace the
/// connection talks to.
pub type SessionId = Uuid;

/// Set of reasons accumulated by a subscription between two reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasonSet(BTreeSet<Reason>);

impl ReasonSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reason: Reason) -> bool {
        self.0.insert(reason)
    }

    pub fn contains(&self, reason: Reason) -> bool {
        self.0.contains(&reason)
    }

    /// `true` when at least one reason falls inside `range`.
    pub fn any_in(&self, range: Range<Reason>) -> bool {
        self.0.range(range).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Reason> + '_ {
        self.0.iter().copied()
    }

    /// Move every reason of `other` into `self`.
    pub fn merge(&mut self, other: ReasonSet) {
        self.0.extend(other.0);
    }
}

impl FromIterator<Reason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = Reason>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ReasonSet {
    type Item = Reason;
    type IntoIter = std::collections::btree_set::IntoIter<Reason>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for ReasonSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, reason) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{reason}")?;
        }
        write!(f, "}}")
    }
}

/// Global error type spanning subscription faults, configuration mistakes
/// and transport failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Subscription read failed on {subscription}: {details}")]
    SubscriptionRead {
        subscription: String,
        details: String,
    },

    #[error("Reason range {offset}..{} overlaps already attached range {existing:?}", .offset + .span)]
    ReasonRangeCollision {
        offset: Reason,
        span: Reason,
        existing: Range<Reason>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_set_range_queries() {
        let set: ReasonSet = [0, 1001].into_iter().collect();
        assert!(set.any_in(0..1000));
        assert!(set.any_in(1000..2000));
        assert!(!set.any_in(2..1000));
        assert_eq!(set.to_string(), "{0,1001}");
    }

    #[test]
    fn reason_set_merge_deduplicates() {
        let mut a: ReasonSet = [0, 1].into_iter().collect();
        a.merge([1, 2].into_iter().collect());
        assert_eq!(a.len(), 3);
        assert!(a.contains(2));
    }

    #[test]
    fn gateway_error_display() {
        let err = GatewayError::SubscriptionRead {
            subscription: "motor[0]".to_string(),
            details: "eventfd closed".to_string(),
        };
        assert!(err.to_string().contains("motor[0]"));

        let err = GatewayError::ReasonRangeCollision {
            offset: 1000,
            span: 2,
            existing: 1000..1002,
        };
        assert!(err.to_string().contains("1000..1002"));
    }
}
