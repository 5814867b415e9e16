//! Queue message types.
//!
//! Producers publish one JSON body per deferred HTTP request. Redelivery
//! metadata and the message id travel separately, as AMQP headers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default name of the queue the worker consumes from.
pub const DEFAULT_QUEUE: &str = "http_requests";

/// Suffix appended to the main queue name to derive the wait queue name.
pub const WAIT_QUEUE_SUFFIX: &str = "_wait";

/// AMQP header holding the producer-assigned message id.
pub const MESSAGE_ID_HEADER: &str = "message_id";

/// AMQP header holding the absolute expiration time (unix seconds).
pub const EXPIRATION_HEADER: &str = "expiration";

/// AMQP header maintained by RabbitMQ with the dead-letter history.
pub const DEATH_HEADER: &str = "x-death";

/// Body of a queued HTTP request.
///
/// Every field may be absent or `null`; validation happens in the parser so
/// that a missing `url` is reported as such rather than as a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Target URL of the POST
    #[serde(default)]
    pub url: Option<String>,
    /// Ordered list of single-entry header maps
    #[serde(default)]
    pub headers: Option<Vec<BTreeMap<String, String>>>,
    /// Raw request body
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestPayload {
    /// Create a payload with the given URL and body and no headers.
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            headers: None,
            body: Some(body.into()),
        }
    }

    /// Append a header entry, keeping the producer's ordering.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entry = BTreeMap::new();
        entry.insert(key.into(), value.into());
        self.headers.get_or_insert_with(Vec::new).push(entry);
        self
    }
}
