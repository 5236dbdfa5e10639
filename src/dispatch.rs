//! Outbound HTTP delivery of events to subscriber/reply/dead-letter URIs.
//!
//! The `Dispatcher` trait is this crate's analogue of `ethers-providers`'
//! `JsonRpcClient`: one seam, one real `reqwest`-backed implementation, one mock.

use async_trait::async_trait;
use auto_impl::auto_impl;
use std::time::Duration;

use crate::error::DispatchError;

/// An outbound event ready to be POSTed to a subscriber.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub payload: Vec<u8>,
    pub content_type: String,
}

/// The three possible destinations for one delivered backend message, derived from
/// a `SubscriptionReference` per `SPEC_FULL.md` §4.5.
#[derive(Debug, Clone)]
pub struct DispatchTargets {
    pub destination: String,
    pub reply: Option<String>,
    pub dead_letter: Option<String>,
}

/// Abstraction over "deliver this event to a URI and tell me what happened".
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait Dispatcher: Send + Sync + std::fmt::Debug {
    /// Dispatch `event` to `targets.destination`. On success, optionally forward the
    /// subscriber's response to `targets.reply`. On unrecoverable failure, forward to
    /// `targets.dead_letter` if present. Returns `Ok(())` only when the primary
    /// delivery (and any reply forwarding) succeeded; the outbound loop acks the
    /// backend message on, and only on, `Ok`.
    async fn dispatch(&self, event: OutboundEvent, targets: DispatchTargets) -> Result<(), DispatchError>;
}

/// `reqwest`-backed dispatcher performing binary-mode CloudEvent HTTP delivery.
#[derive(Debug)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and known-valid");
        Self { client }
    }

    async fn post(&self, uri: &str, event: &OutboundEvent) -> Result<reqwest::Response, DispatchError> {
        self.client
            .post(uri)
            .header("content-type", &event.content_type)
            .body(event.payload.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout { uri: uri.to_string() }
                } else {
                    DispatchError::Failed { uri: uri.to_string(), source: e.to_string() }
                }
            })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, event: OutboundEvent, targets: DispatchTargets) -> Result<(), DispatchError> {
        let response = match self.post(&targets.destination, &event).await {
            Ok(response) => response,
            Err(err) => {
                if let Some(dead_letter) = &targets.dead_letter {
                    let _ = self.post(dead_letter, &event).await;
                }
                return Err(err);
            }
        };

        if !response.status().is_success() {
            let err = DispatchError::Failed {
                uri: targets.destination.clone(),
                source: format!("status {}", response.status()),
            };
            if let Some(dead_letter) = &targets.dead_letter {
                let _ = self.post(dead_letter, &event).await;
            }
            return Err(err);
        }

        if let Some(reply_uri) = &targets.reply {
            let body = response.bytes().await.map_err(|e| DispatchError::Failed {
                uri: reply_uri.clone(),
                source: e.to_string(),
            })?;
            if !body.is_empty() {
                let reply_event = OutboundEvent { payload: body.to_vec(), content_type: event.content_type.clone() };
                self.post(reply_uri, &reply_event).await?;
            }
        }

        Ok(())
    }
}

pub mod mock;
