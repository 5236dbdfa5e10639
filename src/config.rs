//! Supervisor construction configuration.
//!
//! Mirrors the shape of `ethers-providers::rpc::transports::ws::types::ConnectionDetails`:
//! a plain data struct the embedder builds however it likes, plus an optional
//! `from_env()` convenience constructor for parity with the env-var driven NATS
//! adapters elsewhere in the retrieval pack. The core itself never reads a config
//! file; that responsibility stays with the embedding control plane per
//! `SPEC_FULL.md` §1.

use std::env;

const DEFAULT_CLUSTER_ID: &str = "knative-nats-streaming";
const DEFAULT_ACK_WAIT_MINUTES: u32 = 30;
const DEFAULT_MAX_INFLIGHT: u32 = 1000;

/// Construction-time configuration for [`crate::Supervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Address of the streaming backend, e.g. `nats://natss.knative-eventing.svc:4222`.
    pub natss_url: String,
    /// Backend cluster identifier.
    pub cluster_id: String,
    /// This supervisor's client identity, usually the pod name.
    pub client_id: String,
    /// Ack-wait applied to every subscription created by this supervisor.
    pub ack_wait_minutes: u32,
    /// Per-subscription max in-flight message count.
    pub max_inflight: u32,
}

/// Error returned by [`SupervisorConfig::from_env`] when a required variable is
/// missing. There is deliberately no default for `NATSS_URL`: silently falling back
/// to a guessed broker address is worse than failing to start.
#[derive(Debug, thiserror::Error)]
#[error("missing required environment variable {0}")]
pub struct MissingEnvVar(pub &'static str);

impl SupervisorConfig {
    /// Build configuration from the well-known environment variables used by the
    /// NATS Streaming eventing adapters: `NATSS_URL` (required), `CLUSTER_ID`,
    /// `POD_NAME` (used as the client id), `ACK_WAIT_MINUTES`, `MAX_INFLIGHT`.
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        let natss_url = env::var("NATSS_URL").map_err(|_| MissingEnvVar("NATSS_URL"))?;
        let cluster_id = env::var("CLUSTER_ID").unwrap_or_else(|_| DEFAULT_CLUSTER_ID.to_string());
        let client_id = env::var("POD_NAME").unwrap_or_else(|_| "natss-channel-supervisor".to_string());
        let ack_wait_minutes = env::var("ACK_WAIT_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ACK_WAIT_MINUTES);
        let max_inflight = env::var("MAX_INFLIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_INFLIGHT);

        Ok(Self { natss_url, cluster_id, client_id, ack_wait_minutes, max_inflight })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_natss_url() {
        env::remove_var("NATSS_URL");
        assert!(SupervisorConfig::from_env().is_err());
    }
}
