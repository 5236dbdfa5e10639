//! Control-plane entry points: `ProcessChannels` and `UpdateSubscriptions`.
//!
//! These are thin, named per `SPEC_FULL.md` §6, and do no more than translate
//! declarative input into calls against [`crate::router::HostRouter`] and
//! [`crate::registry::SubscriptionRegistry`] — the components themselves own all
//! locking and ordering guarantees.

use std::collections::HashMap;

use crate::backend::Backend;
use crate::dispatch::Dispatcher;
use crate::error::RouterError;
use crate::model::{ChannelHostBinding, ChannelReference, SubscriberSpec, SubscriptionReference};
use crate::registry::SubscriptionRegistry;
use crate::router::HostRouter;

/// Rebuild the host→channel routing table from the full declarative channel list.
/// See `SPEC_FULL.md` §4.2 for the fail-closed duplicate-hostname policy.
pub fn process_channels(router: &HostRouter, channels: &[ChannelHostBinding]) -> Result<(), RouterError> {
    router.rebuild(channels)
}

/// Reconcile one channel's desired subscriber set against the live registry.
/// Returns a map of `uid -> error message` for subscribers that failed to
/// subscribe; an empty map means full success. See `SPEC_FULL.md` §4.3/§8.
pub async fn update_subscriptions<B: Backend + 'static, D: Dispatcher + 'static>(
    registry: &SubscriptionRegistry<B, D>,
    channel: &ChannelReference,
    desired_subscribers: &[SubscriberSpec],
    is_finalizer: bool,
) -> HashMap<String, String> {
    let desired: Vec<SubscriptionReference> =
        desired_subscribers.iter().map(SubscriptionReference::from_spec).collect();
    let (failures, _fatal) = registry.update_subscriptions(channel, &desired, is_finalizer).await;
    failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_channels_rejects_duplicate_hosts() {
        let router = HostRouter::new();
        let channels = vec![
            ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("default", "c1") },
            ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("default", "c2") },
        ];
        assert!(process_channels(&router, &channels).is_err());
    }
}
