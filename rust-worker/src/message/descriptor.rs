//! Typed request descriptor and its dispatch outcome.

use std::collections::HashMap;

use crate::error::DispatchError;

/// Final classification of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The target accepted the request (2xx)
    Accepted,
    /// Permanent failure; redelivering the message cannot help
    Dropped(DispatchError),
    /// Transient failure; the message should go back through the wait queue
    RetryEligible(DispatchError),
}

impl Disposition {
    /// The error attached to a failed attempt, `None` when accepted.
    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Disposition::Accepted => None,
            Disposition::Dropped(err) | Disposition::RetryEligible(err) => Some(err),
        }
    }

    /// Short label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Accepted => "accepted",
            Disposition::Dropped(_) => "dropped",
            Disposition::RetryEligible(_) => "retry_eligible",
        }
    }
}

/// Result of the single HTTP attempt made for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Status line of the response (e.g. "404 Not Found"), or a description
    /// of why no response was received
    pub status_text: String,
    /// Response body as received; informational only
    pub response_body: String,
    pub disposition: Disposition,
}

/// Validated HTTP request built from one queue envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Delivery tag of the originating message
    pub delivery_tag: u64,
    /// Producer-assigned id, or a digest of the body
    pub message_id: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    /// Creation time (unix seconds), 0 if unknown
    pub created_at: i64,
    /// Absolute expiration (unix seconds), 0 if unset or invalid
    pub expires_at: i64,
    /// Number of previous rejections recorded by the broker
    pub retry_count: u32,
    /// Time of the first rejection (unix seconds), 0 if unknown
    pub first_rejected_at: i64,
    outcome: Option<Outcome>,
}

impl RequestDescriptor {
    pub(crate) fn new(message_id: String, url: String) -> Self {
        Self {
            delivery_tag: 0,
            message_id,
            url,
            headers: HashMap::new(),
            body: String::new(),
            created_at: 0,
            expires_at: 0,
            retry_count: 0,
            first_rejected_at: 0,
            outcome: None,
        }
    }

    /// Outcome of the dispatch attempt, once it has happened.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Disposition of the dispatch attempt, once it has happened.
    pub fn disposition(&self) -> Option<&Disposition> {
        self.outcome.as_ref().map(|o| &o.disposition)
    }

    /// Attach the outcome of the one attempt made for this descriptor.
    ///
    /// Consumes the descriptor: an outcome is recorded once, by whoever owns
    /// the descriptor during dispatch.
    pub(crate) fn with_outcome(mut self, outcome: Outcome) -> Self {
        debug_assert!(self.outcome.is_none(), "outcome recorded twice");
        self.outcome = Some(outcome);
        self
    }
}
