//! Message / MessageSet - the data shipped from producers to collectors.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single log/event record
///
/// Immutable once created: fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Routing key (application name)
    app: String,

    /// Opaque payload (zero-copy)
    payload: Bytes,

    /// Creation time, milliseconds since the Unix epoch
    timestamp_ms: i64,
}

impl Message {
    /// Create a message stamped with the current wall-clock time
    pub fn new(app: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self::with_timestamp(app, payload, chrono::Utc::now().timestamp_millis())
    }

    /// Create a message with an explicit timestamp
    pub fn with_timestamp(app: impl Into<String>, payload: impl Into<Bytes>, timestamp_ms: i64) -> Self {
        Self {
            app: app.into(),
            payload: payload.into(),
            timestamp_ms,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Ordered batch of messages sharing an identifier and an app tag
///
/// Ownership moves from the caller to the client, to one delivery task at a
/// time, and on failure to the restore store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSet {
    id: Uuid,
    app: String,
    messages: Vec<Message>,
}

impl MessageSet {
    /// Create a batch with a freshly assigned identifier
    pub fn new(app: impl Into<String>, messages: Vec<Message>) -> Self {
        Self::with_id(Uuid::new_v4(), app, messages)
    }

    /// Create a batch with a caller-provided identifier
    pub fn with_id(id: Uuid, app: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            id,
            app: app.into(),
            messages,
        }
    }

    /// Start building a batch for `app`
    pub fn builder(app: impl Into<String>) -> MessageSetBuilder {
        MessageSetBuilder::new(app)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Number of messages in the batch
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total payload bytes across all messages
    pub fn payload_bytes(&self) -> usize {
        self.messages.iter().map(Message::len).sum()
    }
}

/// Builder collecting payloads into a `MessageSet`
///
/// Every message added through the builder carries the batch's app tag.
#[derive(Debug, Clone)]
pub struct MessageSetBuilder {
    app: String,
    messages: Vec<Message>,
}

impl MessageSetBuilder {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            messages: Vec::new(),
        }
    }

    /// Append a payload stamped with the current time
    pub fn with_message(mut self, payload: impl Into<Bytes>) -> Self {
        self.push(payload);
        self
    }

    /// Append a payload in place
    pub fn push(&mut self, payload: impl Into<Bytes>) {
        self.messages.push(Message::new(self.app.clone(), payload));
    }

    /// Append an already built message (its own routing key is kept)
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn build(self) -> MessageSet {
        MessageSet::new(self.app, self.messages)
    }
}
