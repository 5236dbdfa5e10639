use std::fmt::Debug;

use thiserror::Error;

use crate::model::ChannelReference;

/// Errors surfaced by the [`crate::connection::ConnectionManager`].
///
/// These are the only errors that should ever cross a `connectionMutex` critical
/// section: callers observe them after the lock has already been released.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No live backend connection is currently installed.
    #[error("no connection to the streaming backend is currently available")]
    Unavailable,

    /// The backend reported its connection closed while an operation was in flight.
    ///
    /// Callers that see this variant MUST call [`crate::connection::ConnectionManager::signal_reconnect`].
    #[error("connection to the streaming backend was closed")]
    Lost,

    /// The backend returned an error while dialing.
    #[error("failed to connect to streaming backend: {0}")]
    DialFailed(String),
}

/// Errors returned by [`crate::registry::SubscriptionRegistry`] subscribe/unsubscribe
/// operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("failed to subscribe {uid} on channel {channel}: {source}")]
    SubscribeFailed {
        uid: String,
        channel: ChannelReference,
        source: String,
    },

    #[error("failed to unsubscribe {uid} on channel {channel}: {source}")]
    UnsubscribeFailed {
        uid: String,
        channel: ChannelReference,
        source: String,
    },
}

/// Errors returned by the [`crate::router::HostRouter`].
#[derive(Debug, Error)]
pub enum RouterError {
    /// Two or more channels claimed the same host during a rebuild. The previous
    /// routing table is left installed.
    #[error("duplicate hostname {host:?} claimed by both {first} and {second}")]
    DuplicateHostname {
        host: String,
        first: ChannelReference,
        second: ChannelReference,
    },

    /// No channel is registered for the requested host.
    #[error("no channel is registered for host {0:?}")]
    HostNotFound(String),
}

/// Errors returned by a [`crate::dispatch::Dispatcher`] implementation.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch to {uri} failed: {source}")]
    Failed { uri: String, source: String },

    #[error("dispatch to {uri} timed out")]
    Timeout { uri: String },
}

/// Top-level error type for the supervisor's public API.
///
/// Composed from the narrower per-component errors the way `ethers-providers`
/// layers `RpcError` variants under `ProviderError`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Failure publishing an inbound event to the backend subject.
    #[error("publish to subject {subject} failed: {source}")]
    PublishFailed { subject: String, source: String },
}

/// Behavior common to every error kind produced inside this crate, mirroring the
/// accessor pattern `ethers-providers::errors::RpcError` provides over
/// `JsonRpcError`. Lets callers ask "was this a connection-loss error?" without
/// matching on every variant by hand.
pub trait SupervisorErrorExt: std::error::Error + Debug + Send + Sync {
    /// Returns `true` if this error indicates the backend connection was lost and
    /// a reconnect has (or should have) already been signaled.
    fn is_connection_lost(&self) -> bool;
}

impl SupervisorErrorExt for SupervisorError {
    fn is_connection_lost(&self) -> bool {
        matches!(self, SupervisorError::Connection(ConnectionError::Lost))
    }
}
