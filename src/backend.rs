use async_trait::async_trait;
use auto_impl::auto_impl;
use futures_core::{future::BoxFuture, Stream};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ConnectionError;

/// A single message delivered by the streaming backend, already bound to the
/// subscription that produced it.
///
/// `ack` is an opaque, backend-specific closure rather than a token, since
/// JetStream-class backends hand back a live ack handle tied to the delivery, not a
/// serializable id. Calling it is the only way to acknowledge the message.
pub struct BackendMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub ack: Arc<dyn Fn() -> BoxFuture<'static, Result<(), ConnectionError>> + Send + Sync>,
}

impl std::fmt::Debug for BackendMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendMessage")
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Parameters for establishing a durable, manual-ack subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub subject: String,
    pub durable_name: String,
    pub ack_wait_minutes: u32,
    pub max_inflight: u32,
}

pub type MessageStream = Pin<Box<dyn Stream<Item = BackendMessage> + Send>>;

/// A live handle on a backend subscription. Dropping it does not unsubscribe;
/// unsubscription is always explicit via [`Backend::unsubscribe`], consistent with
/// `registryMutex`-guarded teardown being the sole release path.
pub struct BackendSubscription {
    pub durable_name: String,
    pub messages: MessageStream,
}

impl std::fmt::Debug for BackendSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSubscription").field("durable_name", &self.durable_name).finish()
    }
}

/// A snapshot of a live backend connection. Readers take this by value under
/// `connectionMutex`, then drop the lock before using it — mirroring how
/// `ethers-providers`' `RequestManager` copies a backend handle rather than holding
/// a lock across I/O.
pub trait BackendConnection: Send + Sync + std::fmt::Debug {}

/// Abstraction over the durable streaming broker (NATS Streaming / JetStream-class).
///
/// Mirrors the seam `ethers-providers::JsonRpcClient` occupies for RPC transports:
/// one trait, one real implementation ([`crate::backend::nats::NatsBackend`]), one
/// test double ([`crate::backend::mock::MockBackend`]).
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait Backend: Send + Sync + std::fmt::Debug {
    type Connection: BackendConnection + Clone + 'static;

    /// Dial the backend. Called only from the connection manager's retry task,
    /// never while `connectionMutex` is held.
    async fn connect(
        &self,
        cluster_id: &str,
        client_id: &str,
        url: &str,
    ) -> Result<Self::Connection, ConnectionError>;

    /// Publish a raw payload to `subject` using the given connection snapshot.
    async fn publish(
        &self,
        conn: &Self::Connection,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<(), ConnectionError>;

    /// Create a durable, manual-ack subscription.
    async fn subscribe(
        &self,
        conn: &Self::Connection,
        opts: SubscribeOptions,
    ) -> Result<BackendSubscription, ConnectionError>;

    /// Tear down a durable subscription, releasing its backend-side state.
    ///
    /// `subject` identifies the channel the subscription lives on, since a
    /// durable name alone doesn't say which stream owns it.
    async fn unsubscribe(
        &self,
        conn: &Self::Connection,
        subject: &str,
        durable_name: &str,
    ) -> Result<(), ConnectionError>;
}

pub mod nats;
pub mod mock;
