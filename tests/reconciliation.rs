//! Multi-module integration scenarios: router + registry + reconnect, driven
//! entirely through the public `Supervisor` API. Mirrors the end-to-end
//! scenarios in `SPEC_FULL.md` §8.

use std::sync::Arc;
use std::time::Duration;

use natss_channel_supervisor::{
    backend::mock::MockBackend, dispatch::mock::MockDispatcher, ChannelHostBinding, ChannelReference,
    SubscriberSpec, Supervisor, SupervisorConfig,
};

fn config() -> SupervisorConfig {
    SupervisorConfig {
        natss_url: "nats://localhost:4222".into(),
        cluster_id: "test-cluster".into(),
        client_id: "test-client".into(),
        ack_wait_minutes: 30,
        max_inflight: 1000,
    }
}

fn subscriber(uid: &str, uri: &str) -> SubscriberSpec {
    SubscriberSpec { uid: uid.into(), subscriber_uri: uri.into(), reply_uri: None, dead_letter_sink: None }
}

#[tokio::test]
async fn replacing_a_subscriber_subscribes_new_and_unsubscribes_old() {
    let backend = Arc::new(MockBackend::new());
    let dispatcher = Arc::new(MockDispatcher::new());
    let supervisor = Supervisor::new(config(), backend.clone(), dispatcher);
    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    supervisor
        .process_channels(&[ChannelHostBinding { host: "c1.svc".into(), channel: ChannelReference::new("n1", "c1") }])
        .unwrap();

    let failures = supervisor.update_subscriptions("c1", "n1", &[subscriber("u1", "http://s1/")], false).await;
    assert!(failures.is_empty());
    assert_eq!(backend.subscribe_count(), 1);

    let failures = supervisor.update_subscriptions("c1", "n1", &[subscriber("u2", "http://s2/")], false).await;
    assert!(failures.is_empty());
    assert_eq!(backend.subscribe_count(), 2, "u2 must be subscribed");
    assert_eq!(backend.durable_names_unsubscribed().len(), 1, "u1 must be unsubscribed exactly once");
    assert_eq!(supervisor.channel_count().await, 1, "channel key survives the swap");
}

#[tokio::test]
async fn duplicate_hostname_leaves_existing_routing_intact() {
    let backend = Arc::new(MockBackend::new());
    let dispatcher = Arc::new(MockDispatcher::new());
    let supervisor = Supervisor::new(config(), backend.clone(), dispatcher);

    supervisor
        .process_channels(&[ChannelHostBinding { host: "shared.svc".into(), channel: ChannelReference::new("n1", "c1") }])
        .unwrap();

    let err = supervisor
        .process_channels(&[
            ChannelHostBinding { host: "shared.svc".into(), channel: ChannelReference::new("n1", "c1") },
            ChannelHostBinding { host: "shared.svc".into(), channel: ChannelReference::new("n1", "c2") },
        ])
        .unwrap_err();
    assert!(err.to_string().contains("shared.svc"));

    // previous routing must be untouched: a publish still resolves to c1, not an error
    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let channel = supervisor.publish("shared.svc", b"hi".to_vec()).await.unwrap();
    assert_eq!(channel, ChannelReference::new("n1", "c1"));
}

#[tokio::test]
async fn connection_loss_on_publish_triggers_reconnect_and_recovers() {
    use natss_channel_supervisor::error::{ConnectionError, SupervisorError};

    let backend = Arc::new(MockBackend::new());
    let dispatcher = Arc::new(MockDispatcher::new());
    let supervisor = Supervisor::new(config(), backend.clone(), dispatcher);
    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    supervisor
        .process_channels(&[ChannelHostBinding { host: "c1.svc".into(), channel: ChannelReference::new("n1", "c1") }])
        .unwrap();

    backend.fail_next(ConnectionError::Lost);
    let err = supervisor.publish("c1.svc", b"hi".to_vec()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Connection(ConnectionError::Lost)));

    // the reconnect signal fired by the failed publish should re-dial
    tokio::time::sleep(Duration::from_millis(1100)).await;
    supervisor.publish("c1.svc", b"hi-again".to_vec()).await.unwrap();
    assert_eq!(backend.publishes().len(), 1, "only the successful publish is recorded");
}

#[tokio::test]
async fn idempotent_reconcile_issues_no_extra_backend_calls() {
    let backend = Arc::new(MockBackend::new());
    let dispatcher = Arc::new(MockDispatcher::new());
    let supervisor = Supervisor::new(config(), backend.clone(), dispatcher);
    supervisor.start().await;
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let desired = [subscriber("u1", "http://s1/")];
    supervisor.update_subscriptions("c1", "n1", &desired, false).await;
    supervisor.update_subscriptions("c1", "n1", &desired, false).await;

    assert_eq!(backend.subscribe_count(), 1);
    assert!(backend.durable_names_unsubscribed().is_empty());
}
