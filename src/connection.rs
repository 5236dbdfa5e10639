//! Backend connection lifecycle: a single shared connection, re-dialed on loss,
//! with coalesced reconnect signaling.
//!
//! Grounded in `ethers-providers`' WS `RequestManager::reconnect` /
//! `RequestManager::spawn` (`rpc/transports/ws/manager.rs`) and the reconnect loop in
//! `fabriqnetwork-alloy`'s `PubSubService::reconnect`: a retry task re-dials on a fixed
//! tick and swaps the live handle in under a lock held only for the swap itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendConnection};
use crate::config::SupervisorConfig;
use crate::error::ConnectionError;
use crate::reporter::{NoopReporter, ReportEvent, Reporter};

const RECONNECT_SIGNAL_CAPACITY: usize = 10;
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

struct Inner<C> {
    connection: Option<C>,
    in_progress: bool,
}

/// Owns the single live backend connection and the at-most-one-in-flight retry task
/// invariant described in `SPEC_FULL.md` §4.1.
///
/// `connectionMutex` here is the `tokio::sync::Mutex` guarding [`Inner`]; it is only
/// ever held across a pointer copy or flag update, never across a dial.
pub struct ConnectionManager<B: Backend> {
    backend: Arc<B>,
    config: SupervisorConfig,
    state: Arc<Mutex<Inner<B::Connection>>>,
    reconnect_tx: mpsc::Sender<()>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<()>>>,
    cancel: CancellationToken,
    reporter: Arc<dyn Reporter>,
}

impl<B: Backend + 'static> ConnectionManager<B> {
    pub fn new(backend: Arc<B>, config: SupervisorConfig) -> Self {
        let (tx, rx) = mpsc::channel(RECONNECT_SIGNAL_CAPACITY);
        Self {
            backend,
            config,
            state: Arc::new(Mutex::new(Inner { connection: None, in_progress: false })),
            reconnect_tx: tx,
            reconnect_rx: Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
            reporter: Arc::new(NoopReporter),
        }
    }

    /// Swap in a metrics sink. Events fire at the same points the `tracing` spans
    /// below do, per `SPEC_FULL.md` §1.1; left no-op unless the embedder supplies one.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Request a reconnect. Non-blocking: if the bounded signal channel is full a
    /// pending reconnect is already implied, so the send is simply dropped.
    pub fn signal_reconnect(&self) {
        match self.reconnect_tx.try_send(()) {
            Ok(()) => debug!("reconnect signaled"),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("reconnect already pending, signal coalesced")
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("reconnect signal channel closed, worker not running")
            }
        }
    }

    /// Snapshot the current connection, if any. Takes the lock only long enough to
    /// clone the handle.
    pub async fn current_connection(&self) -> Result<B::Connection, ConnectionError> {
        let guard = self.state.lock().await;
        guard.connection.clone().ok_or(ConnectionError::Unavailable)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn the long-lived reconnect worker and enqueue the initial reconnect
    /// signal. Consumes the receiver end, so this may only be called once per
    /// manager instance.
    pub async fn start(self: &Arc<Self>) {
        let mut rx = self.reconnect_rx.lock().await.take().expect("start called twice");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.worker_loop(&mut rx).await;
        });
        self.signal_reconnect();
    }

    async fn worker_loop(self: &Arc<Self>, rx: &mut mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("connection manager worker shutting down");
                    return;
                }
                signal = rx.recv() => {
                    match signal {
                        Some(()) => self.handle_signal().await,
                        None => {
                            warn!("reconnect signal channel closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle_signal(self: &Arc<Self>) {
        {
            let mut guard = self.state.lock().await;
            if guard.in_progress {
                debug!("reconnect already in progress, ignoring signal");
                return;
            }
            guard.in_progress = true;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.retry_until_connected().await;
        });
    }

    async fn retry_until_connected(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(RETRY_INTERVAL);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let mut guard = self.state.lock().await;
                    guard.in_progress = false;
                    return;
                }
                _ = ticker.tick() => {
                    self.reporter.record(ReportEvent::ReconnectAttempt);
                    match self.backend.connect(
                        &self.config.cluster_id,
                        &self.config.client_id,
                        &self.config.natss_url,
                    ).await {
                        Ok(conn) => {
                            info!("connected to streaming backend");
                            self.reporter.record(ReportEvent::ReconnectSucceeded);
                            let mut guard = self.state.lock().await;
                            guard.connection = Some(conn);
                            guard.in_progress = false;
                            return;
                        }
                        Err(err) => {
                            error!(error = %err, "failed to connect to streaming backend, will retry");
                        }
                    }
                }
            }
        }
    }
}

impl<B: Backend> Drop for ConnectionManager<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;
    use crate::config::SupervisorConfig;

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
    async fn start_dials_exactly_once_on_success() {
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(ConnectionManager::new(backend.clone(), test_config()));
        manager.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(backend.dial_count(), 1);
        assert!(manager.current_connection().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_signals_coalesce_to_one_retry_task() {
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(ConnectionManager::new(backend.clone(), test_config()));
        manager.start().await;
        for _ in 0..20 {
            manager.signal_reconnect();
        }
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(backend.dial_count(), 1);
    }

    #[tokio::test]
    async fn current_connection_fails_closed_before_first_connect() {
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(ConnectionManager::new(backend, test_config()));
        assert!(matches!(manager.current_connection().await, Err(ConnectionError::Unavailable)));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    async fn successful_dial_is_logged() {
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(ConnectionManager::new(backend, test_config()));
        manager.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(logs_contain("connected to streaming backend"));
    }

    #[tokio::test]
    async fn reconnect_swaps_in_a_connection_with_a_new_identity() {
        let backend = Arc::new(MockBackend::new());
        let manager = Arc::new(ConnectionManager::new(backend, test_config()));
        manager.start().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let first = manager.current_connection().await.unwrap();

        manager.signal_reconnect();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = manager.current_connection().await.unwrap();

        assert_ne!(first.id(), second.id(), "a fresh dial must replace the connection handle");
    }
}
