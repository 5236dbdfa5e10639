//! Per-channel subscription bookkeeping.
//!
//! The registry is guarded by a single `tokio::sync::Mutex` held for the entire
//! duration of a reconcile call, mirroring how `fabriqnetwork-alloy`'s
//! `SubscriptionManager` is only ever touched from inside the single-threaded
//! `PubSubService` event loop — here the equivalent serialization is an explicit
//! lock rather than a single-owner task, since reconciliation calls can arrive from
//! multiple control-plane callers concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::backend::Backend;
use crate::connection::ConnectionManager;
use crate::dispatch::Dispatcher;
use crate::error::RegistryError;
use crate::model::{ChannelReference, SubscriptionReference};
use crate::outbound;
use crate::reporter::{NoopReporter, ReportEvent, Reporter};

struct Handle {
    durable_name: String,
    task: JoinHandle<()>,
}

/// `ChannelReference -> (uid -> live subscription handle)`, per `SPEC_FULL.md` §3.
///
/// Invariant upheld by every mutator below: a channel key is present only while its
/// inner map is non-empty.
pub struct SubscriptionRegistry<B: Backend, D: Dispatcher> {
    backend: Arc<B>,
    connection: Arc<ConnectionManager<B>>,
    dispatcher: Arc<D>,
    ack_wait_minutes: u32,
    max_inflight: u32,
    channels: Mutex<HashMap<ChannelReference, HashMap<String, Handle>>>,
    reporter: Arc<dyn Reporter>,
}

impl<B: Backend + 'static, D: Dispatcher + 'static> SubscriptionRegistry<B, D> {
    pub fn new(
        backend: Arc<B>,
        connection: Arc<ConnectionManager<B>>,
        dispatcher: Arc<D>,
        ack_wait_minutes: u32,
        max_inflight: u32,
    ) -> Self {
        Self {
            backend,
            connection,
            dispatcher,
            ack_wait_minutes,
            max_inflight,
            channels: Mutex::new(HashMap::new()),
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Swap in a metrics sink; see [`crate::connection::ConnectionManager::with_reporter`].
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Number of channels currently tracked. Exposed for tests and diagnostics only.
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    pub async fn subscriber_uids(&self, channel: &ChannelReference) -> Vec<String> {
        self.channels
            .lock()
            .await
            .get(channel)
            .map(|inner| inner.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Establish a new durable, manual-ack subscription and spawn its delivery loop.
    /// Must only be called while holding `self.channels`.
    async fn subscribe_one(
        &self,
        channel: &ChannelReference,
        subscription: &SubscriptionReference,
    ) -> Result<Handle, RegistryError> {
        let conn = self.connection.current_connection().await?;
        let opts = crate::backend::SubscribeOptions {
            subject: channel.subject(),
            durable_name: subscription.to_string(),
            ack_wait_minutes: self.ack_wait_minutes,
            max_inflight: self.max_inflight,
        };
        let backend_sub = match self.backend.subscribe(&conn, opts).await {
            Ok(sub) => sub,
            Err(crate::error::ConnectionError::Lost) => {
                self.connection.signal_reconnect();
                return Err(RegistryError::SubscribeFailed {
                    uid: subscription.uid.clone(),
                    channel: channel.clone(),
                    source: "connection lost".into(),
                });
            }
            Err(err) => {
                return Err(RegistryError::SubscribeFailed {
                    uid: subscription.uid.clone(),
                    channel: channel.clone(),
                    source: err.to_string(),
                })
            }
        };

        let durable_name = backend_sub.durable_name.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let reporter = Arc::clone(&self.reporter);
        let subscription = subscription.clone();
        let task = tokio::spawn(outbound::run_delivery_loop(
            backend_sub.messages,
            dispatcher,
            subscription,
            reporter,
        ));

        self.reporter.record(ReportEvent::SubscriptionCreated);
        Ok(Handle { durable_name, task })
    }

    async fn unsubscribe_one(
        &self,
        channel: &ChannelReference,
        uid: &str,
        handle: Handle,
    ) -> Result<(), RegistryError> {
        handle.task.abort();
        let conn = self.connection.current_connection().await?;
        if let Err(err) = self.backend.unsubscribe(&conn, &channel.subject(), &handle.durable_name).await {
            warn!(%uid, channel = %channel, error = %err, "unsubscribe failed, dropping registry entry anyway");
        }
        self.reporter.record(ReportEvent::SubscriptionRemoved);
        Ok(())
    }

    /// Reconcile one channel's subscriber set to `desired`. Holds the registry lock
    /// for the entire call, including backend I/O, per `SPEC_FULL.md` §4.3/§5.
    ///
    /// `is_finalizer`, or an empty `desired` set, tears the channel down entirely.
    /// Otherwise new subscribers are created, stale ones removed, and subscribers
    /// whose `uid` is unchanged are left untouched — their backend durable position
    /// survives.
    pub async fn update_subscriptions(
        &self,
        channel: &ChannelReference,
        desired: &[SubscriptionReference],
        is_finalizer: bool,
    ) -> (HashMap<String, String>, Option<RegistryError>) {
        let mut channels = self.channels.lock().await;

        if is_finalizer || desired.is_empty() {
            if let Some(inner) = channels.remove(channel) {
                for (uid, handle) in inner {
                    if let Err(err) = self.unsubscribe_one(channel, &uid, handle).await {
                        warn!(%uid, channel = %channel, error = %err, "finalizer unsubscribe failed");
                    }
                }
            }
            return (HashMap::new(), None);
        }

        let inner = channels.entry(channel.clone()).or_default();
        let mut failures = HashMap::new();
        let mut active: Vec<String> = Vec::with_capacity(desired.len());

        for subscription in desired {
            active.push(subscription.uid.clone());
            if inner.contains_key(&subscription.uid) {
                continue;
            }
            match self.subscribe_one(channel, subscription).await {
                Ok(handle) => {
                    inner.insert(subscription.uid.clone(), handle);
                }
                Err(err) => {
                    failures.insert(subscription.uid.clone(), err.to_string());
                }
            }
        }

        let stale: Vec<String> =
            inner.keys().filter(|uid| !active.contains(uid)).cloned().collect();
        for uid in stale {
            if let Some(handle) = inner.remove(&uid) {
                if let Err(err) = self.unsubscribe_one(channel, &uid, handle).await {
                    warn!(%uid, channel = %channel, error = %err, "stale unsubscribe failed");
                }
            }
        }

        if inner.is_empty() {
            channels.remove(channel);
        }

        (failures, None)
    }
}
