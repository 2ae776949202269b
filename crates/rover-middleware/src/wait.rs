//! Bridge between a [`Subscription`]'s readiness signal and async tasks.

use rover_hal::Subscription;
use rover_types::{GatewayError, ReasonSet};

/// Suspend until `subscription` is signalled, then drain it.
///
/// The returned set may be empty when the signal was consumed by an
/// earlier read; callers loop on that case.  Dropping the future while
/// suspended performs no read.
///
/// # Errors
///
/// Propagates [`GatewayError::SubscriptionRead`] from the underlying read.
pub async fn wait_for_reasons(subscription: &Subscription) -> Result<ReasonSet, GatewayError> {
    subscription.readiness().await;
    subscription.read()
}
