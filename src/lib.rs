//! Channel-subscription supervisor fronting a durable streaming backend (NATS
//! Streaming / JetStream-class) and bridging it to a Knative-style eventing
//! topology.
//!
//! [`Supervisor`] is the crate's single entry point: it owns the backend
//! [`connection::ConnectionManager`], the [`router::HostRouter`], and the
//! [`registry::SubscriptionRegistry`], and exposes the three control-plane
//! operations an embedding reconciler drives — [`Supervisor::start`],
//! [`Supervisor::process_channels`], and [`Supervisor::update_subscriptions`] —
//! plus [`Supervisor::publish`] for the HTTP ingress path wired up in
//! [`server::build_router`].
//!
//! Module layout follows `ethers-providers`: one file per seam (`backend`,
//! `dispatch`), a `model` module for the wire-level data types, and a narrow
//! `error` module composing the per-component error enums under one top-level
//! type. See `DESIGN.md` for the grounding of each module against the
//! teacher/retrieval pack.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

pub mod backend;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod inbound;
pub mod model;
pub mod outbound;
pub mod reconcile;
pub mod registry;
pub mod reporter;
pub mod router;
pub mod server;

pub use backend::{mock::MockBackend, nats::NatsBackend, Backend};
pub use config::SupervisorConfig;
pub use dispatch::{mock::MockDispatcher, Dispatcher, HttpDispatcher};
pub use error::SupervisorError;
pub use model::{ChannelHostBinding, ChannelReference, DeadLetterSink, SubscriberSpec};
pub use reporter::{NoopReporter, ReportEvent, Reporter};

/// Install a `tracing_subscriber::fmt` subscriber honoring `RUST_LOG`,
/// defaulting to `info` when unset.
///
/// A convenience for binaries embedding this crate; entirely optional, and a
/// no-op as far as the supervisor's own logic is concerned — every `tracing`
/// call in this crate works whether or not a subscriber is ever installed.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

use connection::ConnectionManager;
use registry::SubscriptionRegistry;
use router::HostRouter;

/// Ties the connection manager, host router, and subscription registry
/// together behind the control-plane API described in `SPEC_FULL.md` §6.
///
/// Generic over the backend and dispatcher seams so embedders can swap in
/// [`MockBackend`]/[`MockDispatcher`] for tests, as the corpus's
/// `ethers-providers::Provider<P>` does over `JsonRpcClient`.
pub struct Supervisor<B: Backend, D: Dispatcher> {
    backend: Arc<B>,
    connection: Arc<ConnectionManager<B>>,
    router: Arc<HostRouter>,
    registry: SubscriptionRegistry<B, D>,
}

impl<B: Backend + 'static, D: Dispatcher + 'static> Supervisor<B, D> {
    /// Construct a supervisor. Does not dial the backend or spawn any tasks;
    /// call [`Supervisor::start`] for that.
    pub fn new(config: SupervisorConfig, backend: Arc<B>, dispatcher: Arc<D>) -> Self {
        Self::with_reporter(config, backend, dispatcher, Arc::new(NoopReporter))
    }

    /// Construct a supervisor with an explicit metrics sink; see
    /// `SPEC_FULL.md` §1.1. `reporter` is invoked at the same points this
    /// crate's `tracing` events fire and is otherwise inert.
    pub fn with_reporter(
        config: SupervisorConfig,
        backend: Arc<B>,
        dispatcher: Arc<D>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let connection =
            Arc::new(ConnectionManager::new(backend.clone(), config.clone()).with_reporter(reporter.clone()));
        let registry = SubscriptionRegistry::new(
            backend.clone(),
            connection.clone(),
            dispatcher,
            config.ack_wait_minutes,
            config.max_inflight,
        )
        .with_reporter(reporter);

        Self { backend, connection, router: Arc::new(HostRouter::new()), registry }
    }

    /// Spawn the connection manager's reconnect worker and enqueue the
    /// initial reconnect signal. Idempotent only in the sense that calling it
    /// twice panics (per [`ConnectionManager::start`]) — callers should call
    /// it exactly once, typically right after construction.
    pub async fn start(&self) {
        self.connection.start().await;
    }

    /// `ProcessChannels`: rebuild the host→channel routing table from the
    /// full declarative channel list. Fails closed on a duplicate hostname,
    /// leaving the previously installed table untouched.
    pub fn process_channels(&self, channels: &[ChannelHostBinding]) -> Result<(), error::RouterError> {
        reconcile::process_channels(&self.router, channels)
    }

    /// `UpdateSubscriptions`: reconcile one channel's desired subscriber set
    /// against the live registry. Returns `uid -> error message` for
    /// subscribers that failed to subscribe; an empty map means full success.
    pub async fn update_subscriptions(
        &self,
        name: &str,
        namespace: &str,
        desired_subscribers: &[SubscriberSpec],
        is_finalizer: bool,
    ) -> HashMap<String, String> {
        let channel = ChannelReference::new(namespace, name);
        reconcile::update_subscriptions(&self.registry, &channel, desired_subscribers, is_finalizer).await
    }

    /// Publish a raw CloudEvent payload to the channel routed to `host`. Used
    /// by the axum handler in [`server`]; exposed directly for embedders that
    /// front this crate with a different HTTP stack.
    pub async fn publish(&self, host: &str, payload: Vec<u8>) -> Result<ChannelReference, SupervisorError> {
        inbound::publish_to_host(&self.router, &self.connection, &self.backend, host, payload).await
    }

    /// Build the axum [`Router`] exposing the inbound publish endpoint over
    /// this supervisor's router and connection.
    pub fn http_router(&self) -> Router {
        server::build_router(self.router.clone(), self.connection.clone(), self.backend.clone())
    }

    /// Serve `http_router()` on `addr` until the process is terminated.
    pub async fn serve(&self, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        server::serve(addr, self.http_router()).await
    }

    /// Number of channels the registry currently tracks. Exposed for
    /// diagnostics and tests.
    pub async fn channel_count(&self) -> usize {
        self.registry.channel_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::mock::MockBackend;
    use dispatch::mock::MockDispatcher;
    use std::time::Duration;

    fn test_config() -> SupervisorConfig {
        SupervisorConfig {
            natss_url: "nats://localhost:4222".into(),
            cluster_id: "test-cluster".into(),
            client_id: "test-client".into(),
            ack_wait_minutes: 30,
            max_inflight: 1000,
        }
    }

    #[tokio::test]
    async fn end_to_end_publish_and_subscribe() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Arc::new(MockDispatcher::new());
        let supervisor = Supervisor::new(test_config(), backend.clone(), dispatcher);
        supervisor.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        supervisor
            .process_channels(&[ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("n1", "c1") }])
            .unwrap();

        let channel = supervisor.publish("h1", b"hello".to_vec()).await.unwrap();
        assert_eq!(channel, ChannelReference::new("n1", "c1"));
        assert_eq!(backend.publishes(), vec![("c1.n1".to_string(), b"hello".to_vec())]);

        let failures = supervisor
            .update_subscriptions("c1", "n1", &[SubscriberSpec {
                uid: "u1".into(),
                subscriber_uri: "http://s1/".into(),
                reply_uri: None,
                dead_letter_sink: None,
            }], false)
            .await;
        assert!(failures.is_empty());
        assert_eq!(supervisor.channel_count().await, 1);

        let failures = supervisor.update_subscriptions("c1", "n1", &[], true).await;
        assert!(failures.is_empty());
        assert_eq!(supervisor.channel_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_hostname_rebuild_is_rejected() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Arc::new(MockDispatcher::new());
        let supervisor = Supervisor::new(test_config(), backend, dispatcher);

        let err = supervisor
            .process_channels(&[
                ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("n1", "c1") },
                ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("n1", "c2") },
            ])
            .unwrap_err();
        assert!(matches!(err, error::RouterError::DuplicateHostname { .. }));
    }
}
