//! Inbound publish path: resolve a request to a channel, publish to its backend
//! subject, and signal reconnect on connection loss. Framework-agnostic; the axum
//! wiring lives in [`crate::server`].

use std::sync::Arc;

use tracing::warn;

use crate::backend::Backend;
use crate::connection::ConnectionManager;
use crate::error::{ConnectionError, SupervisorError};
use crate::model::ChannelReference;
use crate::router::HostRouter;

/// Resolve `host` to a channel and publish `payload` to its backend subject.
///
/// A fresh connection snapshot is taken per call rather than cached, so a publish
/// started just before a reconnect never uses a stale handle (`SPEC_FULL.md` §4.4).
pub async fn publish_to_host<B: Backend + 'static>(
    router: &HostRouter,
    connection: &ConnectionManager<B>,
    backend: &B,
    host: &str,
    payload: Vec<u8>,
) -> Result<ChannelReference, SupervisorError> {
    let channel = router.channel_for_host(host)?;
    publish_to_channel(connection, backend, &channel, payload).await?;
    Ok(channel)
}

pub async fn publish_to_channel<B: Backend + 'static>(
    connection: &ConnectionManager<B>,
    backend: &B,
    channel: &ChannelReference,
    payload: Vec<u8>,
) -> Result<(), SupervisorError> {
    let conn = connection.current_connection().await?;
    let subject = channel.subject();
    match backend.publish(&conn, &subject, payload).await {
        Ok(()) => Ok(()),
        Err(ConnectionError::Lost) => {
            warn!(%subject, "publish failed: connection lost, signaling reconnect");
            connection.signal_reconnect();
            Err(SupervisorError::Connection(ConnectionError::Lost))
        }
        Err(err) => Err(SupervisorError::PublishFailed { subject, source: err.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::config::SupervisorConfig;
    use crate::model::ChannelHostBinding;
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
    async fn publish_with_no_connection_is_connection_unavailable() {
        let backend = Arc::new(MockBackend::new());
        let connection = Arc::new(ConnectionManager::new(backend.clone(), test_config()));
        let channel = ChannelReference::new("default", "c1");

        let err = publish_to_channel(&connection, &backend, &channel, b"hi".to_vec()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Connection(ConnectionError::Unavailable)));
    }

    #[tokio::test]
    async fn publish_routes_to_correct_subject() {
        let backend = Arc::new(MockBackend::new());
        let connection = Arc::new(ConnectionManager::new(backend.clone(), test_config()));
        connection.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let router = HostRouter::new();
        router
            .rebuild(&[ChannelHostBinding { host: "h1".into(), channel: ChannelReference::new("default", "c1") }])
            .unwrap();

        publish_to_host(&router, &connection, &backend, "h1", b"hello".to_vec()).await.unwrap();

        let published = backend.publishes();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "c1.default");
        assert_eq!(published[0].1, b"hello".to_vec());
    }

    #[tokio::test]
    async fn publish_unknown_host_returns_host_not_found() {
        let backend = Arc::new(MockBackend::new());
        let connection = Arc::new(ConnectionManager::new(backend.clone(), test_config()));
        let router = HostRouter::new();

        let err = publish_to_host(&router, &connection, &backend, "nope", b"hi".to_vec()).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Router(_)));
    }
}
