use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tokio::sync::Mutex;
use tracing::debug;

use crate::entities::{DEFAULT_PUBSUB_NAME, ReceivedMessages, Subscription, Topic};

/// How deliveries are answered. Flags can only be armed, never disarmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseBehavior {
    /// Answer deliveries with an HTTP 500.
    pub respond_with_error: bool,

    /// Answer deliveries with a `RETRY` status.
    pub respond_with_retry: bool,

    /// Answer consumed deliveries with an empty JSON object.
    pub respond_with_empty_json: bool,
}

/// Outcome of recording a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First time this message is seen on its topic.
    Recorded,

    /// The message was already received on its topic.
    Duplicate,
}

/// Messages received per topic and the way deliveries are answered.
pub struct AppState {
    pubsub_name: String,
    received_messages: BTreeMap<Topic, BTreeSet<String>>,
    behavior: ResponseBehavior,
}

/// Wrapper to access the application state in shared execution.
pub type SharedState = Arc<Mutex<AppState>>;

/// Easy way to embed Application state in an Arc for shared execution.
impl From<AppState> for SharedState {
    fn from(value: AppState) -> Self {
        Arc::new(Mutex::new(value))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_PUBSUB_NAME)
    }
}

impl AppState {
    /// Create an empty state subscribing to the given pubsub component.
    pub fn new(pubsub_name: &str) -> Self {
        Self {
            pubsub_name: pubsub_name.to_owned(),
            received_messages: empty_message_sets(),
            behavior: ResponseBehavior::default(),
        }
    }

    /// return the subscriptions to advertise to the sidecar
    pub fn get_subscriptions(&self) -> Vec<Subscription> {
        Subscription::all(&self.pubsub_name)
    }

    /// return how deliveries must currently be answered
    pub fn behavior(&self) -> ResponseBehavior {
        self.behavior
    }

    /// Record a message received on the given topic, duplicates are left untouched.
    pub fn record_message(&mut self, topic: Topic, message: String) -> RecordOutcome {
        let inserted = self
            .received_messages
            .entry(topic)
            .or_default()
            .insert(message);

        if inserted {
            RecordOutcome::Recorded
        } else {
            RecordOutcome::Duplicate
        }
    }

    /// return the messages received per topic, sorted
    pub fn get_received_messages(&self) -> ReceivedMessages {
        ReceivedMessages {
            received_by_topic_a: self.list_messages(Topic::A),
            received_by_topic_b: self.list_messages(Topic::B),
            received_by_topic_c: self.list_messages(Topic::C),
        }
    }

    fn list_messages(&self, topic: Topic) -> Vec<String> {
        self.received_messages
            .get(&topic)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget every received message. Response behavior is kept.
    pub fn initialize(&mut self) {
        debug!("clearing received messages");
        self.received_messages = empty_message_sets();
    }

    /// Answer every following delivery with an HTTP 500.
    pub fn set_respond_with_error(&mut self) {
        self.behavior.respond_with_error = true;
    }

    /// Answer every following delivery with a `RETRY` status.
    pub fn set_respond_with_retry(&mut self) {
        self.behavior.respond_with_retry = true;
    }

    /// Answer every following consumed delivery with `{}`.
    pub fn set_respond_with_empty_json(&mut self) {
        self.behavior.respond_with_empty_json = true;
    }
}

fn empty_message_sets() -> BTreeMap<Topic, BTreeSet<String>> {
    Topic::ALL
        .into_iter()
        .map(|topic| (topic, BTreeSet::new()))
        .collect()
}
