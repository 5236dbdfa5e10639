use std::fmt;

use serde::{Deserialize, Serialize};

/// A namespaced channel identity.
///
/// The backend subject for a channel is `name + "." + namespace`; see
/// [`ChannelReference::subject`]. Changing the separator is a wire-format break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelReference {
    pub namespace: String,
    pub name: String,
}

impl ChannelReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    /// The backend subject this channel publishes and subscribes on.
    pub fn subject(&self) -> String {
        format!("{}.{}", self.name, self.namespace)
    }
}

impl fmt::Display for ChannelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A destination to forward failed or terminally-failed deliveries to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterSink {
    pub uri: String,
}

/// Declarative description of a single subscriber, as supplied by the control plane.
///
/// `uid` is the subscriber's stable identity across reconciliation calls; it is also
/// embedded in the backend durable name so the backend can resume the subscriber's
/// delivery position across process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberSpec {
    pub uid: String,
    pub subscriber_uri: String,
    #[serde(default)]
    pub reply_uri: Option<String>,
    #[serde(default)]
    pub dead_letter_sink: Option<DeadLetterSink>,
}

/// Derived, durable identity of a subscription.
///
/// `Display` produces the string that is used verbatim as the backend durable name.
/// That string is part of this crate's persistence contract: changing its format
/// loses delivery position for every subscriber already durably recorded on the
/// backend, so it must only ever change behind a deliberate migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionReference {
    pub uid: String,
    pub subscriber_uri: String,
    pub reply_uri: Option<String>,
    pub dead_letter_uri: Option<String>,
}

impl SubscriptionReference {
    pub fn from_spec(spec: &SubscriberSpec) -> Self {
        Self {
            uid: spec.uid.clone(),
            subscriber_uri: spec.subscriber_uri.clone(),
            reply_uri: spec.reply_uri.clone(),
            dead_letter_uri: spec.dead_letter_sink.as_ref().map(|d| d.uri.clone()),
        }
    }
}

impl fmt::Display for SubscriptionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.uid,
            self.subscriber_uri,
            self.reply_uri.as_deref().unwrap_or(""),
            self.dead_letter_uri.as_deref().unwrap_or("")
        )
    }
}

/// A channel plus the host that routes HTTP ingress to it, as supplied to
/// [`crate::reconcile::process_channels`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHostBinding {
    pub channel: ChannelReference,
    pub host: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_uses_name_dot_namespace() {
        let c = ChannelReference::new("default", "my-channel");
        assert_eq!(c.subject(), "my-channel.default");
    }

    #[test]
    fn subscription_reference_display_is_stable() {
        let spec = SubscriberSpec {
            uid: "u1".into(),
            subscriber_uri: "http://s1/".into(),
            reply_uri: None,
            dead_letter_sink: None,
        };
        let r = SubscriptionReference::from_spec(&spec);
        assert_eq!(r.to_string(), "u1:http://s1/::");
    }
}
