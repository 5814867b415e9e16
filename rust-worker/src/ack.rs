//! Translation of dispositions into broker acknowledgements.

use std::time::Duration;

use crate::message::{Disposition, RequestDescriptor};

/// What to do with the delivery behind a completed descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckAction {
    /// Remove the message: delivered, or permanently failed
    Ack,
    /// Reject without requeue so the message dead-letters into the wait queue
    Retry,
    /// Retry was warranted but the message outlived its TTL; remove it
    Expire,
}

impl AckAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckAction::Ack => "ack",
            AckAction::Retry => "retry",
            AckAction::Expire => "expire",
        }
    }
}

/// Decide how to settle a completed descriptor at unix time `now`.
pub fn decide(descriptor: &RequestDescriptor, default_ttl: Duration, now: i64) -> AckAction {
    match descriptor.disposition() {
        Some(Disposition::Accepted) | Some(Disposition::Dropped(_)) => AckAction::Ack,
        Some(Disposition::RetryEligible(_)) | None => match expiry(descriptor, default_ttl) {
            Some(expires_at) if now >= expires_at => AckAction::Expire,
            _ => AckAction::Retry,
        },
    }
}

/// Instant after which the message must not be retried.
///
/// An explicit `expiration` wins. Otherwise the default TTL runs from the
/// creation time, or from the first rejection when the producer did not
/// timestamp the message. With neither known, this is the first attempt.
pub fn expiry(descriptor: &RequestDescriptor, default_ttl: Duration) -> Option<i64> {
    if descriptor.expires_at > 0 {
        return Some(descriptor.expires_at);
    }

    let anchor = [descriptor.created_at, descriptor.first_rejected_at]
        .into_iter()
        .find(|t| *t > 0)?;
    let ttl = i64::try_from(default_ttl.as_secs()).unwrap_or(i64::MAX);
    Some(anchor.saturating_add(ttl))
}
