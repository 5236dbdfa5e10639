//! Outbound dispatcher: the per-subscription delivery loop that turns backend
//! messages into HTTP dispatch calls, acking strictly after successful delivery.
//!
//! The panic boundary mirrors how `ethers-providers`' WS backend isolates a single
//! transport task's failure (`ClientError::UnexpectedClose`) from the rest of the
//! process instead of letting it unwind into the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use tracing::{error, warn};

use crate::backend::{BackendMessage, MessageStream};
use crate::dispatch::{DispatchTargets, Dispatcher, OutboundEvent};
use crate::model::SubscriptionReference;
use crate::reporter::{ReportEvent, Reporter};

const CLOUDEVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";

/// Drains `messages`, dispatching each one and acking only on success. Runs until
/// the stream ends (the subscription was torn down) or the owning task is aborted by
/// [`crate::registry::SubscriptionRegistry::update_subscriptions`].
pub async fn run_delivery_loop<D: Dispatcher>(
    mut messages: MessageStream,
    dispatcher: Arc<D>,
    subscription: SubscriptionReference,
    reporter: Arc<dyn Reporter>,
) {
    while let Some(message) = messages.next().await {
        handle_one(&*dispatcher, &subscription, message, &*reporter).await;
    }
}

async fn handle_one<D: Dispatcher>(
    dispatcher: &D,
    subscription: &SubscriptionReference,
    message: BackendMessage,
    reporter: &dyn Reporter,
) {
    let targets = DispatchTargets {
        destination: subscription.subscriber_uri.clone(),
        reply: subscription.reply_uri.clone(),
        dead_letter: subscription.dead_letter_uri.clone(),
    };
    let event = OutboundEvent { payload: message.payload.clone(), content_type: CLOUDEVENTS_CONTENT_TYPE.into() };

    let ack = message.ack.clone();
    let outcome = AssertUnwindSafe(dispatcher.dispatch(event, targets)).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {
            reporter.record(ReportEvent::DispatchSucceeded);
            if let Err(err) = ack().await {
                warn!(uid = %subscription.uid, error = %err, "ack failed after successful dispatch");
            }
        }
        Ok(Err(err)) => {
            reporter.record(ReportEvent::DispatchFailed);
            warn!(uid = %subscription.uid, error = %err, "dispatch failed, message will be redelivered");
        }
        Err(_panic) => {
            // A panicking handler must never ack: the backend redelivers this
            // message once its ack-wait elapses.
            reporter.record(ReportEvent::DispatchFailed);
            error!(uid = %subscription.uid, subject = %message.subject, "delivery callback panicked, not acking");
        }
    }
}
