//! Real backend implementation on top of `async-nats`'s JetStream API.
//!
//! Grounded in the JetStream consumer configuration (`PullConsumerConfig`,
//! `AckPolicy::Explicit`, `DeliverPolicy`) used by the NATS adapters elsewhere in the
//! retrieval pack; the subject/durable-name conventions are this crate's own, per
//! `SPEC_FULL.md` §6.

use async_trait::async_trait;
use async_nats::jetstream::{
    self,
    consumer::{pull::Config as PullConsumerConfig, AckPolicy, DeliverPolicy},
    Context as JetStreamContext,
};
use futures_core::future::BoxFuture;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, BackendConnection, BackendMessage, BackendSubscription, SubscribeOptions};
use crate::error::ConnectionError;

#[derive(Clone)]
pub struct NatsConnection {
    client: async_nats::Client,
    jetstream: JetStreamContext,
}

impl std::fmt::Debug for NatsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsConnection").finish_non_exhaustive()
    }
}

impl BackendConnection for NatsConnection {}

#[derive(Debug, Default)]
pub struct NatsBackend;

#[async_trait]
impl Backend for NatsBackend {
    type Connection = NatsConnection;

    async fn connect(
        &self,
        _cluster_id: &str,
        client_id: &str,
        url: &str,
    ) -> Result<Self::Connection, ConnectionError> {
        // Parse eagerly so a malformed broker address fails with a clear diagnostic
        // rather than whatever error async-nats' own URL parsing happens to surface.
        url::Url::parse(url).map_err(|e| ConnectionError::DialFailed(format!("invalid natss_url: {e}")))?;

        let client = async_nats::ConnectOptions::new()
            .name(client_id)
            .connect(url)
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?;
        let jetstream = jetstream::new(client.clone());
        Ok(NatsConnection { client, jetstream })
    }

    async fn publish(
        &self,
        conn: &Self::Connection,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        conn.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| classify(e.to_string()))
    }

    async fn subscribe(
        &self,
        conn: &Self::Connection,
        opts: SubscribeOptions,
    ) -> Result<BackendSubscription, ConnectionError> {
        let stream = conn
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name_for_subject(&opts.subject),
                subjects: vec![opts.subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?;

        // `opts.durable_name` is `SubscriptionReference::to_string()`: a wire-level
        // identity that routinely contains `/`, `.` and `:` from the subscriber URIs
        // it embeds, none of which JetStream allows in a consumer name. The sanitized
        // name is only ever used to address the consumer on the broker; the literal
        // durable name is preserved in the consumer's description and in the
        // `BackendSubscription` returned below.
        let consumer_name = jetstream_consumer_name(&opts.durable_name);
        let consumer = stream
            .get_or_create_consumer(
                &consumer_name,
                PullConsumerConfig {
                    durable_name: Some(consumer_name.clone()),
                    description: Some(opts.durable_name.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: Duration::from_secs(60 * opts.ack_wait_minutes as u64),
                    max_ack_pending: opts.max_inflight as i64,
                    deliver_policy: DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?;

        let durable_name = opts.durable_name.clone();
        let messages = consumer
            .messages()
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?
            .filter_map(|m| async move {
                let m = m.ok()?;
                let subject = m.subject.to_string();
                let payload = m.payload.to_vec();
                let ack_handle = Arc::new(m);
                let ack: Arc<dyn Fn() -> BoxFuture<'static, Result<(), ConnectionError>> + Send + Sync> =
                    Arc::new(move || {
                        let ack_handle = ack_handle.clone();
                        Box::pin(async move {
                            ack_handle.ack().await.map_err(|e| ConnectionError::DialFailed(e.to_string()))
                        })
                    });
                Some(BackendMessage { subject, payload, ack })
            });

        Ok(BackendSubscription { durable_name, messages: Box::pin(messages) })
    }

    async fn unsubscribe(
        &self,
        conn: &Self::Connection,
        subject: &str,
        durable_name: &str,
    ) -> Result<(), ConnectionError> {
        let mut stream = conn
            .jetstream
            .get_stream(&stream_name_for_subject(subject))
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?;
        stream
            .delete_consumer(&jetstream_consumer_name(durable_name))
            .await
            .map_err(|e| ConnectionError::DialFailed(e.to_string()))?;
        Ok(())
    }
}

/// Maps a channel subject to the name of the stream that carries it. Shared between
/// `subscribe` and `unsubscribe` so both sides always agree on which stream a
/// durable consumer lives on.
fn stream_name_for_subject(subject: &str) -> String {
    subject.replace('.', "_")
}

/// JetStream consumer/durable names may not contain `.`, `*`, `>`, path separators,
/// or whitespace. `durable_name` here is `SubscriptionReference::to_string()`, which
/// embeds subscriber URIs and routinely contains all of those. Every forbidden byte
/// (and the escape marker itself, so the mapping stays collision-free) is replaced by
/// its `_xx` hex form; everything else passes through unchanged.
fn jetstream_consumer_name(durable_name: &str) -> String {
    let mut out = String::with_capacity(durable_name.len());
    for b in durable_name.bytes() {
        let c = b as char;
        let needs_escape = c == '_' || c.is_ascii_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\');
        if needs_escape {
            out.push_str(&format!("_{b:02x}"));
        } else {
            out.push(c);
        }
    }
    out
}

fn classify(message: String) -> ConnectionError {
    if message.contains("closed") || message.contains("disconnected") {
        ConnectionError::Lost
    } else {
        ConnectionError::DialFailed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_strips_forbidden_characters() {
        let durable = "u1:http://s1/::";
        let safe = jetstream_consumer_name(durable);
        assert!(!safe.contains('/'));
        assert!(!safe.contains('.'));
        assert!(!safe.contains('*'));
        assert!(!safe.contains('>'));
        assert!(!safe.chars().any(|c| c.is_ascii_whitespace()));
    }

    #[test]
    fn consumer_name_is_deterministic_and_injective_for_distinct_inputs() {
        let a = "u1:http://s1/::";
        let b = "u2:http://s2/::";
        assert_eq!(jetstream_consumer_name(a), jetstream_consumer_name(a));
        assert_ne!(jetstream_consumer_name(a), jetstream_consumer_name(b));
    }
}
