//! Wire types exchanged with the pubsub sidecar and the test harness.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Default name of the pubsub component the subscriptions are attached to.
pub const DEFAULT_PUBSUB_NAME: &str = "messagebus";

/// Topics this application subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// `pubsub-a-topic`
    A,
    /// `pubsub-b-topic`
    B,
    /// `pubsub-c-topic`
    C,
}

impl Topic {
    /// Every topic, in subscription order.
    pub const ALL: [Topic; 3] = [Topic::A, Topic::B, Topic::C];

    /// Topic name as known by the pubsub component.
    pub fn name(&self) -> &'static str {
        match self {
            Topic::A => "pubsub-a-topic",
            Topic::B => "pubsub-b-topic",
            Topic::C => "pubsub-c-topic",
        }
    }

    /// HTTP path messages of this topic are delivered to.
    pub fn route(&self) -> String {
        format!("/{}", self.name())
    }

    /// Resolve the topic a delivery path belongs to, if any.
    pub fn from_route_suffix(path: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|topic| path.ends_with(topic.name()))
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Subscription advertised to the sidecar on `/dapr/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Name of the pubsub component
    #[serde(rename = "pubsubname")]
    pub pubsub_name: String,

    /// Topic name
    pub topic: String,

    /// Route the sidecar must post the messages to
    pub route: String,
}

impl Subscription {
    /// Subscription of the given topic on the given pubsub component.
    pub fn new(pubsub_name: &str, topic: Topic) -> Self {
        Self {
            pubsub_name: pubsub_name.to_owned(),
            topic: topic.name().to_owned(),
            route: topic.name().to_owned(),
        }
    }

    /// One subscription per known topic.
    pub fn all(pubsub_name: &str) -> Vec<Self> {
        Topic::ALL
            .into_iter()
            .map(|topic| Self::new(pubsub_name, topic))
            .collect()
    }
}

/// Status telling the sidecar what to do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    /// Message consumed.
    Success,

    /// Message must be delivered again later.
    Retry,

    /// Message must be discarded without further delivery.
    Drop,
}

/// JSON body returned by the application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppResponse {
    /// What the sidecar must do with the delivered message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,

    /// Human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AppResponse {
    /// Response carrying only a message.
    pub fn with_message<T: Into<String>>(message: T) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
        }
    }

    /// The message was recorded.
    pub fn consumed() -> Self {
        Self::with_status(DeliveryStatus::Success, "consumed")
    }

    /// The sidecar should deliver the message again.
    pub fn retry() -> Self {
        Self::with_status(DeliveryStatus::Retry, "retry later")
    }

    /// The sidecar should discard the message.
    pub fn discard<T: Into<String>>(reason: T) -> Self {
        Self::with_status(DeliveryStatus::Drop, reason)
    }

    fn with_status<T: Into<String>>(status: DeliveryStatus, message: T) -> Self {
        Self {
            status: Some(status),
            message: Some(message.into()),
        }
    }
}

/// Messages received so far, per topic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReceivedMessages {
    #[serde(rename = "pubsub-a-topic")]
    pub received_by_topic_a: Vec<String>,

    #[serde(rename = "pubsub-b-topic")]
    pub received_by_topic_b: Vec<String>,

    #[serde(rename = "pubsub-c-topic")]
    pub received_by_topic_c: Vec<String>,
}
