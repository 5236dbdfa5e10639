//! In-memory [`Backend`] test double, the supervisor-side equivalent of
//! `ethers-providers`' `rpc::transports::mock::MockProvider`.

use async_trait::async_trait;
use futures_util::stream;
use std::sync::Mutex;

use crate::backend::{Backend, BackendConnection, BackendMessage, BackendSubscription, SubscribeOptions};
use crate::error::ConnectionError;

#[derive(Debug, Clone)]
pub struct MockConnection {
    id: u64,
}

impl MockConnection {
    /// Identifies which `connect` call produced this handle; lets tests tell a
    /// reconnected connection apart from the one it replaced.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl BackendConnection for MockConnection {}

#[derive(Debug, Default)]
struct State {
    dials: u64,
    publishes: Vec<(String, Vec<u8>)>,
    subscribes: Vec<SubscribeOptions>,
    unsubscribes: Vec<String>,
    /// When set, the next `connect`/`publish`/`subscribe` call fails with this error.
    fail_next: Option<ConnectionError>,
}

/// Deterministic backend double. Every call is recorded so tests can assert on
/// exactly what the reconciler or inbound publisher issued.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, err: ConnectionError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    pub fn dial_count(&self) -> u64 {
        self.state.lock().unwrap().dials
    }

    pub fn publishes(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().unwrap().publishes.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribes.len()
    }

    pub fn durable_names_subscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().subscribes.iter().map(|o| o.durable_name.clone()).collect()
    }

    pub fn durable_names_unsubscribed(&self) -> Vec<String> {
        self.state.lock().unwrap().unsubscribes.clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    type Connection = MockConnection;

    async fn connect(
        &self,
        _cluster_id: &str,
        _client_id: &str,
        _url: &str,
    ) -> Result<Self::Connection, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.dials += 1;
        Ok(MockConnection { id: state.dials })
    }

    async fn publish(
        &self,
        _conn: &Self::Connection,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        state.publishes.push((subject.to_string(), payload));
        Ok(())
    }

    async fn subscribe(
        &self,
        _conn: &Self::Connection,
        opts: SubscribeOptions,
    ) -> Result<BackendSubscription, ConnectionError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        let durable_name = opts.durable_name.clone();
        state.subscribes.push(opts);
        Ok(BackendSubscription { durable_name, messages: Box::pin(stream::empty()) })
    }

    async fn unsubscribe(
        &self,
        _conn: &Self::Connection,
        _subject: &str,
        durable_name: &str,
    ) -> Result<(), ConnectionError> {
        self.state.lock().unwrap().unsubscribes.push(durable_name.to_string());
        Ok(())
    }
}

/// Helper only used in tests: synthesizes a delivered message with an ack closure
/// that records whether it was invoked.
#[cfg(test)]
pub fn test_message(subject: &str, payload: &[u8], ack_count: std::sync::Arc<std::sync::atomic::AtomicU64>) -> BackendMessage {
    use std::sync::atomic::Ordering;
    BackendMessage {
        subject: subject.to_string(),
        payload: payload.to_vec(),
        ack: std::sync::Arc::new(move || {
            let ack_count = ack_count.clone();
            Box::pin(async move {
                ack_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }),
    }
}
